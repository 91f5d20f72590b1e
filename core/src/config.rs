//! Benchmark configuration.
//!
//! A `BenchConfig` is what the user writes (TOML, optionally overridden from
//! the command line). It validates into one immutable `RunConfig` per
//! toolchain, which is the only configuration the runner ever sees.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Mean, Median, Reducer};
use crate::error::BenchError;
use crate::executor::BuildCommand;
use crate::operation::Operation;

pub const DEFAULT_CONFIG_FILE: &str = "ctbench.toml";

/// What to do when a build invocation fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run and surface the captured output.
    #[default]
    Abort,
    /// Record the failed sample, warn, and carry on with the next cell.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    #[default]
    Mean,
    Median,
}

impl Statistic {
    pub fn reducer(self) -> &'static dyn Reducer {
        match self {
            Statistic::Mean => &Mean,
            Statistic::Median => &Median,
        }
    }
}

/// Sizes to sweep: `start`, `start + step`, ... up to but excluding `end`.
///
/// A `[sizes]` table without `end` measures `start` alone; the `0..100`
/// default only applies when the table is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SizeRange {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub step: Option<usize>,
}

impl Default for SizeRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: Some(100),
            step: None,
        }
    }
}

impl SizeRange {
    pub fn sizes(&self) -> Result<Vec<usize>, BenchError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(BenchError::invalid_config("size step must be >= 1"));
        }
        match self.end {
            None => Ok(vec![self.start]),
            Some(end) if end <= self.start => Err(BenchError::invalid_config(format!(
                "size range {}..{} is empty",
                self.start, end
            ))),
            Some(end) => Ok((self.start..end).step_by(step).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Toolchain {
    pub label: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Allow-list for this run; overrides the global one.
    #[serde(default)]
    pub suts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde(default = "default_catalogue")]
    pub catalogue: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub sizes: SizeRange,
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    #[serde(default)]
    pub baseline: bool,
    #[serde(default = "default_directive_prefix")]
    pub directive_prefix: String,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub statistic: Statistic,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub operations: Option<Vec<String>>,
    #[serde(default)]
    pub suts: Option<Vec<String>>,
    #[serde(default)]
    pub keep_scratch: Option<PathBuf>,
    #[serde(default, rename = "toolchain")]
    pub toolchains: Vec<Toolchain>,
}

fn default_catalogue() -> PathBuf {
    PathBuf::from("benchmark")
}

fn default_output() -> PathBuf {
    PathBuf::from("results")
}

fn default_repetitions() -> usize {
    3
}

fn default_directive_prefix() -> String {
    "#".to_string()
}

fn default_jobs() -> usize {
    1
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            catalogue: default_catalogue(),
            output: default_output(),
            sizes: SizeRange::default(),
            repetitions: default_repetitions(),
            baseline: false,
            directive_prefix: default_directive_prefix(),
            failure_policy: FailurePolicy::default(),
            statistic: Statistic::default(),
            timeout_secs: None,
            retries: 0,
            jobs: default_jobs(),
            operations: None,
            suts: None,
            keep_scratch: None,
            toolchains: Vec::new(),
        }
    }
}

/// Immutable settings for one labelled run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub label: String,
    /// Filesystem-safe form of `label`; names the result namespace.
    pub namespace: String,
    pub command: BuildCommand,
    pub sizes: Vec<usize>,
    pub repetitions: usize,
    pub baseline: bool,
    pub directive_prefix: String,
    pub failure_policy: FailurePolicy,
    pub statistic: Statistic,
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub jobs: usize,
    pub operations: Option<Vec<Operation>>,
    pub suts: Option<Vec<String>>,
    pub keep_scratch: Option<PathBuf>,
}

impl RunConfig {
    pub fn selects_operation(&self, operation: Operation) -> bool {
        self.operations.as_ref().is_none_or(|ops| ops.contains(&operation))
    }

    pub fn selects_sut(&self, name: &str) -> bool {
        self.suts.as_ref().is_none_or(|suts| suts.iter().any(|s| s == name))
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(text).map_err(|e| BenchError::invalid_config(e.to_string()))?;
        Ok(config)
    }

    /// Validate and split into one `RunConfig` per toolchain, in file order.
    pub fn run_configs(&self) -> Result<Vec<RunConfig>, BenchError> {
        if self.repetitions == 0 {
            return Err(BenchError::invalid_config("repetitions must be >= 1"));
        }
        if self.jobs == 0 {
            return Err(BenchError::invalid_config("jobs must be >= 1"));
        }
        if self.directive_prefix.is_empty() {
            return Err(BenchError::invalid_config("directive_prefix must not be empty"));
        }
        if self.toolchains.is_empty() {
            return Err(BenchError::invalid_config("no toolchain configured"));
        }
        let sizes = self.sizes.sizes()?;
        let operations = self
            .operations
            .as_ref()
            .map(|names| names.iter().map(|name| name.parse::<Operation>()).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        let timeout = match self.timeout_secs {
            Some(0) => return Err(BenchError::invalid_config("timeout_secs must be >= 1")),
            other => other.map(Duration::from_secs),
        };

        let mut namespaces = HashSet::new();
        let mut runs = Vec::with_capacity(self.toolchains.len());
        for toolchain in &self.toolchains {
            let label = toolchain.label.trim();
            let namespace = namespace_for(label)?;
            if !namespaces.insert(namespace.clone()) {
                return Err(BenchError::invalid_config(format!(
                    "toolchain label '{}' collides with another label",
                    label
                )));
            }
            if toolchain.program.trim().is_empty() {
                return Err(BenchError::invalid_config(format!("toolchain '{}' has no program", label)));
            }
            runs.push(RunConfig {
                label: label.to_string(),
                namespace,
                command: BuildCommand::new(toolchain.program.clone(), toolchain.args.clone()),
                sizes: sizes.clone(),
                repetitions: self.repetitions,
                baseline: self.baseline,
                directive_prefix: self.directive_prefix.clone(),
                failure_policy: self.failure_policy,
                statistic: self.statistic,
                timeout,
                retries: self.retries,
                jobs: self.jobs,
                operations: operations.clone(),
                suts: toolchain.suts.clone().or_else(|| self.suts.clone()),
                keep_scratch: self.keep_scratch.clone(),
            });
        }
        Ok(runs)
    }
}

/// Directory name for a run label.
pub fn namespace_for(label: &str) -> Result<String, BenchError> {
    let sanitized = sanitize_filename::sanitize(label.trim());
    if sanitized.is_empty() || sanitized.starts_with('.') {
        return Err(BenchError::invalid_config(format!(
            "label '{}' is not usable as a result namespace",
            label
        )));
    }
    Ok(sanitized)
}
