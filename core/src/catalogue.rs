use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::BenchError;
use crate::operation::Operation;

/// One subject under test for one operation: the literal base snippet every
/// generated workload is appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SutSnippet {
    pub name: String,
    pub path: PathBuf,
    /// Extension of the snippet file, without the dot. Scratch artifacts reuse it.
    pub extension: Option<String>,
    pub source: String,
}

impl SutSnippet {
    /// Directive lines of the snippet (`#include`, `#define`, ...), which make up
    /// the baseline artifact.
    pub fn directives(&self, prefix: &str) -> String {
        let mut out = String::new();
        for line in self.source.lines() {
            if line.trim_start().starts_with(prefix) {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    pub fn file_name(&self, stem: &str) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem.to_string(),
        }
    }
}

/// Operation -> SUT snippets, both sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: BTreeMap<Operation, Vec<SutSnippet>>,
}

impl Catalogue {
    /// Scan `root/<operation>/<sut file>`.
    pub fn discover(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(BenchError::malformed(root, "catalogue root is not a directory").into());
        }

        let mut entries = BTreeMap::new();
        for entry in read_sorted(root)? {
            let name = entry_name(&entry)?;
            if name.starts_with('.') || !entry.is_dir() {
                tracing::debug!(path = %entry.display(), "ignoring non-operation entry");
                continue;
            }
            let operation: Operation = name.parse()?;
            let snippets = discover_operation(&entry)?;
            if snippets.is_empty() {
                tracing::warn!(operation = %operation, "operation directory holds no SUT snippets");
            }
            entries.insert(operation, snippets);
        }

        tracing::debug!(
            root = %root.display(),
            operations = entries.len(),
            "catalogue discovered"
        );
        Ok(Self { entries })
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.entries.keys().copied()
    }

    pub fn snippets(&self, operation: Operation) -> &[SutSnippet] {
        self.entries.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, &[SutSnippet])> {
        self.entries.iter().map(|(op, snippets)| (*op, snippets.as_slice()))
    }

    pub fn contains_sut(&self, name: &str) -> bool {
        self.entries.values().flatten().any(|snippet| snippet.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }
}

fn discover_operation(dir: &Path) -> Result<Vec<SutSnippet>> {
    let mut snippets: Vec<SutSnippet> = Vec::new();
    for path in read_sorted(dir)? {
        let file_name = entry_name(&path)?;
        if file_name.starts_with('.') {
            continue;
        }
        if !path.is_file() {
            return Err(BenchError::malformed(&path, "expected a SUT snippet file").into());
        }

        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        validate_sut_name(&path, &name)?;
        if snippets.iter().any(|existing| existing.name == name) {
            return Err(BenchError::malformed(&path, format!("duplicate SUT name '{}'", name)).into());
        }

        let source = fs::read_to_string(&path).with_context(|| format!("read snippet {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_string());
        snippets.push(SutSnippet {
            name,
            path,
            extension,
            source,
        });
    }
    snippets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snippets)
}

fn validate_sut_name(path: &Path, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BenchError::malformed(path, "SUT name is empty").into());
    }
    if name.contains([',', '"', '\n', '\r']) {
        return Err(BenchError::malformed(path, format!("SUT name '{}' cannot appear in a table header", name)).into());
    }
    Ok(())
}

fn read_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| BenchError::malformed(path, "entry name is not valid UTF-8").into())
}
