//! Drives catalogue x sizes x repetitions through the executor.
//!
//! Cells are visited in a fixed order: operation, SUT, N, then artifact kind
//! and repetition. With `jobs > 1` whole cells are handed to worker threads;
//! samples are keyed by cell, so completion order never changes which samples
//! belong where.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel;
use tempfile::TempDir;

use crate::catalogue::{Catalogue, SutSnippet};
use crate::config::{FailurePolicy, RunConfig};
use crate::error::{ArtifactKind, BenchError};
use crate::executor::{Executor, Invocation};
use crate::operation::{Operation, append_workload};

/// One measured wall-clock duration, or a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Measured(Duration),
    Failed,
}

impl Sample {
    pub fn duration(self) -> Option<Duration> {
        match self {
            Sample::Measured(d) => Some(d),
            Sample::Failed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleKey {
    pub operation: Operation,
    pub sut: String,
    pub size: usize,
    pub kind: ArtifactKind,
}

impl SampleKey {
    pub fn new(operation: Operation, sut: impl Into<String>, size: usize, kind: ArtifactKind) -> Self {
        Self {
            operation,
            sut: sut.into(),
            size,
            kind,
        }
    }
}

/// Every sample of a run plus the SUT columns selected per operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSamples {
    columns: BTreeMap<Operation, Vec<String>>,
    samples: BTreeMap<SampleKey, Vec<Sample>>,
}

impl RawSamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a selected (operation, SUT) pair; column order is insertion order.
    pub fn add_column(&mut self, operation: Operation, sut: &str) {
        let columns = self.columns.entry(operation).or_default();
        if !columns.iter().any(|c| c == sut) {
            columns.push(sut.to_string());
        }
    }

    /// Record a sample. The key's SUT becomes a column if it is not one yet.
    pub fn record(&mut self, key: SampleKey, sample: Sample) {
        self.add_column(key.operation, &key.sut);
        self.samples.entry(key).or_default().push(sample);
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.columns.keys().copied()
    }

    pub fn columns(&self, operation: Operation) -> &[String] {
        self.columns.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn samples(&self, key: &SampleKey) -> &[Sample] {
        self.samples.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sizes attempted for any column of `operation`, ascending.
    pub fn sizes(&self, operation: Operation) -> BTreeSet<usize> {
        self.samples
            .keys()
            .filter(|key| key.operation == operation)
            .map(|key| key.size)
            .collect()
    }

    pub fn durations(&self, key: &SampleKey) -> Vec<Duration> {
        self.samples(key).iter().filter_map(|s| s.duration()).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mark an artifact as failed, discarding samples of earlier repetitions.
    pub fn fail(&mut self, key: SampleKey) {
        self.add_column(key.operation, &key.sut);
        self.samples.insert(key, vec![Sample::Failed]);
    }

    fn merge(&mut self, other: RawSamples) {
        for (key, samples) in other.samples {
            self.samples.entry(key).or_default().extend(samples);
        }
    }
}

/// One (operation, SUT, N) unit of work.
#[derive(Debug, Clone)]
struct Cell<'a> {
    operation: Operation,
    snippet: &'a SutSnippet,
    size: usize,
}

impl Cell<'_> {
    fn key(&self, kind: ArtifactKind) -> SampleKey {
        SampleKey::new(self.operation, &self.snippet.name, self.size, kind)
    }

    fn stem(&self, kind: ArtifactKind) -> String {
        format!("{}_{}_{}_{}", self.operation, self.snippet.name, self.size, kind)
    }
}

enum Scratch {
    Temporary(TempDir),
    Kept(PathBuf),
}

impl Scratch {
    fn create(keep: Option<&Path>) -> Result<Self> {
        match keep {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| BenchError::io(dir, e))?;
                Ok(Scratch::Kept(dir.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("ctbench-")
                    .tempdir()
                    .context("create scratch directory")?;
                Ok(Scratch::Temporary(dir))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            Scratch::Temporary(dir) => dir.path(),
            Scratch::Kept(dir) => dir,
        }
    }

    fn keeps_artifacts(&self) -> bool {
        matches!(self, Scratch::Kept(_))
    }
}

pub struct BenchmarkRunner<'a> {
    config: &'a RunConfig,
    executor: Executor,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            executor: Executor::new(config.timeout),
        }
    }

    /// Measure every selected cell of `catalogue`.
    pub fn run(&self, catalogue: &Catalogue) -> Result<RawSamples> {
        let config = self.config;
        if config.repetitions == 0 {
            return Err(BenchError::invalid_config("repetitions must be >= 1").into());
        }
        if let Some(suts) = &config.suts {
            for name in suts {
                if !catalogue.contains_sut(name) {
                    tracing::warn!(label = %config.label, sut = %name, "selected SUT is not in the catalogue");
                }
            }
        }

        let mut raw = RawSamples::new();
        let mut cells = Vec::new();
        for (operation, snippets) in catalogue.iter() {
            if !config.selects_operation(operation) {
                continue;
            }
            for snippet in snippets.iter().filter(|s| config.selects_sut(&s.name)) {
                raw.add_column(operation, &snippet.name);
                for &size in &config.sizes {
                    cells.push(Cell {
                        operation,
                        snippet,
                        size,
                    });
                }
            }
        }

        let scratch = Scratch::create(config.keep_scratch.as_deref())?;
        tracing::info!(
            label = %config.label,
            cells = cells.len(),
            repetitions = config.repetitions,
            jobs = config.jobs,
            scratch = %scratch.path().display(),
            "starting benchmark run"
        );

        if config.jobs <= 1 || cells.len() <= 1 {
            for cell in &cells {
                raw.merge(self.measure_cell(cell, &scratch)?);
            }
        } else {
            raw.merge(self.run_parallel(&cells, &scratch)?);
        }
        if raw.is_empty() {
            tracing::warn!(label = %config.label, "selection matched no catalogue entry; nothing was measured");
        } else {
            tracing::info!(label = %config.label, samples = raw.len(), "benchmark run finished");
        }
        Ok(raw)
    }

    fn run_parallel(&self, cells: &[Cell<'_>], scratch: &Scratch) -> Result<RawSamples> {
        let (tx, rx) = channel::unbounded();
        for cell in cells {
            let _ = tx.send(cell);
        }
        drop(tx);

        let stop = AtomicBool::new(false);
        let failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
        let collected = Mutex::new(RawSamples::new());

        thread::scope(|scope| {
            for _ in 0..self.config.jobs.min(cells.len()) {
                let rx = rx.clone();
                let (stop, failure, collected) = (&stop, &failure, &collected);
                scope.spawn(move || {
                    while let Ok(cell) = rx.recv() {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        match self.measure_cell(cell, scratch) {
                            Ok(samples) => {
                                if let Ok(mut all) = collected.lock() {
                                    all.merge(samples);
                                }
                            }
                            Err(err) => {
                                stop.store(true, Ordering::SeqCst);
                                if let Ok(mut slot) = failure.lock() {
                                    slot.get_or_insert(err);
                                }
                                break;
                            }
                        }
                    }
                });
            }
        });

        if let Some(err) = failure.into_inner().ok().flatten() {
            return Err(err);
        }
        collected
            .into_inner()
            .map_err(|_| anyhow::anyhow!("sample collection poisoned by a panicked worker"))
    }

    fn measure_cell(&self, cell: &Cell<'_>, scratch: &Scratch) -> Result<RawSamples> {
        let mut raw = RawSamples::new();
        if self.config.baseline {
            let text = cell.snippet.directives(&self.config.directive_prefix);
            self.measure_artifact(cell, ArtifactKind::Baseline, &text, scratch, &mut raw)?;
        }
        let workload = cell.operation.generate(cell.size);
        let text = append_workload(&cell.snippet.source, &workload);
        self.measure_artifact(cell, ArtifactKind::Full, &text, scratch, &mut raw)?;

        let full = raw.durations(&cell.key(ArtifactKind::Full));
        tracing::info!(
            label = %self.config.label,
            operation = %cell.operation,
            sut = %cell.snippet.name,
            n = cell.size,
            measured = full.len(),
            "cell measured"
        );
        Ok(raw)
    }

    fn measure_artifact(
        &self,
        cell: &Cell<'_>,
        kind: ArtifactKind,
        text: &str,
        scratch: &Scratch,
        raw: &mut RawSamples,
    ) -> Result<()> {
        let stem = cell.stem(kind);
        let input = scratch.path().join(cell.snippet.file_name(&stem));
        let output = scratch.path().join(format!("{}.out", stem));
        fs::write(&input, text).map_err(|e| BenchError::io(&input, e))?;

        let key = cell.key(kind);
        let result = self.measure_repetitions(cell, kind, &key, &input, &output, raw);

        if !scratch.keeps_artifacts() {
            let _ = fs::remove_file(&input);
            let _ = fs::remove_file(&output);
        }
        result
    }

    fn measure_repetitions(
        &self,
        cell: &Cell<'_>,
        kind: ArtifactKind,
        key: &SampleKey,
        input: &Path,
        output: &Path,
        raw: &mut RawSamples,
    ) -> Result<()> {
        for _ in 0..self.config.repetitions {
            let invocation = self.invoke(input, output)?;
            match invocation.sample() {
                Some(elapsed) => raw.record(key.clone(), Sample::Measured(elapsed)),
                None => {
                    let err = BenchError::BuildFailed {
                        operation: cell.operation,
                        sut: cell.snippet.name.clone(),
                        size: cell.size,
                        kind,
                        command: self.config.command.display_with(input, output),
                        status: invocation.status.to_string(),
                        stdout: invocation.stdout,
                        stderr: invocation.stderr,
                    };
                    match self.config.failure_policy {
                        FailurePolicy::Abort => return Err(err.into()),
                        FailurePolicy::Skip => {
                            tracing::warn!("{}", err);
                            raw.fail(key.clone());
                            // The artifact is deterministic; repeating a failed build only burns time.
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// One invocation, re-run up to `retries` times while it keeps failing.
    fn invoke(&self, input: &Path, output: &Path) -> Result<Invocation> {
        let mut invocation = self.executor.run(&self.config.command, input, output)?;
        let mut attempt = 0;
        while !invocation.status.success() && attempt < self.config.retries {
            attempt += 1;
            tracing::warn!(
                input = %input.display(),
                status = %invocation.status,
                attempt,
                "retrying failed build"
            );
            invocation = self.executor.run(&self.config.command, input, output)?;
        }
        Ok(invocation)
    }
}
