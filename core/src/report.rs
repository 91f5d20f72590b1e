use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::aggregate::{Aggregation, ResultMatrix};
use crate::config::{FailurePolicy, RunConfig, Statistic, namespace_for};
use crate::error::BenchError;
use crate::executor::BuildCommand;
use crate::operation::Operation;

pub const RUN_RECORD_FILE: &str = "run.json";

/// Metadata written next to the tables of a label.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub generated_at: String,
    pub label: String,
    pub command: BuildCommand,
    pub sizes: Vec<usize>,
    pub repetitions: usize,
    pub baseline: bool,
    pub statistic: Statistic,
    pub failure_policy: FailurePolicy,
    pub jobs: usize,
    /// Whether every invocation ran alone; timings of parallel runs are not
    /// comparable with isolated ones.
    pub isolated: bool,
    pub operations: Vec<Operation>,
}

impl RunRecord {
    pub fn new(config: &RunConfig, aggregation: &Aggregation) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            label: config.label.clone(),
            command: config.command.clone(),
            sizes: config.sizes.clone(),
            repetitions: config.repetitions,
            baseline: config.baseline,
            statistic: config.statistic,
            failure_policy: config.failure_policy,
            jobs: config.jobs,
            isolated: config.jobs <= 1,
            operations: aggregation.results.keys().copied().collect(),
        }
    }
}

/// Writes aggregated matrices under `<root>/<label>/`.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    root: PathBuf,
}

impl ResultWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn namespace_dir(&self, label: &str) -> Result<PathBuf> {
        Ok(self.root.join(namespace_for(label)?))
    }

    /// Replace the namespace of `label` with the tables of `aggregation`.
    ///
    /// Tables are staged in a sibling temporary directory first; an existing
    /// namespace is only removed once the new one is complete.
    pub fn write(&self, label: &str, aggregation: &Aggregation, record: &RunRecord) -> Result<PathBuf> {
        let dest = self.namespace_dir(label)?;
        fs::create_dir_all(&self.root).map_err(|e| BenchError::io(&self.root, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".ctbench-staging-")
            .tempdir_in(&self.root)
            .map_err(|e| BenchError::io(&self.root, e))?;

        for (operation, matrix) in &aggregation.results {
            write_table(&staging.path().join(table_file_name(*operation, false)), matrix)?;
        }
        if let Some(raw) = &aggregation.raw {
            for (operation, matrix) in raw {
                write_table(&staging.path().join(table_file_name(*operation, true)), matrix)?;
            }
        }
        write_json(&staging.path().join(RUN_RECORD_FILE), record)?;

        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|e| BenchError::io(&dest, e))?;
        }
        fs::rename(staging.path(), &dest).map_err(|e| BenchError::io(&dest, e))?;

        tracing::info!(label, path = %dest.display(), tables = aggregation.results.len(), "results written");
        Ok(dest)
    }

    /// Operations with a stored table under `label`.
    pub fn tables(&self, label: &str) -> Result<BTreeMap<Operation, PathBuf>> {
        list_tables(&self.namespace_dir(label)?)
    }

    /// Read one table of a label back.
    pub fn read(&self, label: &str, operation: Operation, raw: bool) -> Result<ResultMatrix> {
        let path = self.namespace_dir(label)?.join(table_file_name(operation, raw));
        let text = fs::read_to_string(&path).map_err(|e| BenchError::io(&path, e))?;
        parse_table(&text).with_context(|| format!("parse {}", path.display()))
    }
}

pub fn table_file_name(operation: Operation, raw: bool) -> String {
    if raw {
        format!("{}.raw.csv", operation)
    } else {
        format!("{}.csv", operation)
    }
}

/// `N,<SUT...>` header, one row per N; missing cells are empty fields.
pub fn render_table(matrix: &ResultMatrix) -> String {
    let mut out = String::from("N");
    for column in matrix.columns() {
        out.push(',');
        out.push_str(column);
    }
    out.push('\n');
    for (size, row) in matrix.rows() {
        let _ = write!(out, "{}", size);
        for value in row {
            out.push(',');
            if let Some(value) = value {
                let _ = write!(out, "{}", value);
            }
        }
        out.push('\n');
    }
    out
}

pub fn parse_table(text: &str) -> Result<ResultMatrix> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().ok_or_else(|| anyhow!("table is empty"))?;
    let mut fields = header.split(',');
    if fields.next().map(str::trim) != Some("N") {
        return Err(anyhow!("table header must start with 'N'"));
    }
    let columns: Vec<String> = fields.map(|f| f.trim().to_string()).collect();
    let mut matrix = ResultMatrix::new(columns.clone());

    for (line_no, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != columns.len() + 1 {
            return Err(anyhow!(
                "row {} has {} fields, expected {}",
                line_no + 2,
                fields.len(),
                columns.len() + 1
            ));
        }
        let size: usize = fields[0]
            .trim()
            .parse()
            .with_context(|| format!("row {}: N is not an integer", line_no + 2))?;
        matrix.ensure_row(size);
        for (column, field) in columns.iter().zip(&fields[1..]) {
            let field = field.trim();
            let value = if field.is_empty() {
                None
            } else {
                Some(
                    field
                        .parse::<f64>()
                        .with_context(|| format!("row {}: '{}' is not a number", line_no + 2, field))?,
                )
            };
            matrix.set(size, column, value);
        }
    }
    Ok(matrix)
}

fn write_table(path: &Path, matrix: &ResultMatrix) -> Result<()> {
    let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(render_table(matrix).as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| BenchError::io(path, e))?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).with_context(|| format!("write {}", path.display()))?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| BenchError::io(path, e))?;
    Ok(())
}

/// Tables currently stored for a label, keyed by operation.
fn list_tables(dir: &Path) -> Result<BTreeMap<Operation, PathBuf>> {
    let mut tables = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(|e| BenchError::io(dir, e))? {
        let path = entry.map_err(|e| BenchError::io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".csv") else {
            continue;
        };
        if stem.ends_with(".raw") {
            continue;
        }
        if let Ok(operation) = stem.parse::<Operation>() {
            tables.insert(operation, path);
        }
    }
    Ok(tables)
}
