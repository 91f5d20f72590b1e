use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ArtifactKind;
use crate::operation::Operation;
use crate::runner::{RawSamples, SampleKey};

/// Reduces the samples of one cell to a single value in seconds.
///
/// Returns `None` when there is nothing to reduce; an unmeasured cell must
/// never turn into a zero.
pub trait Reducer: Send + Sync {
    fn name(&self) -> &'static str;
    fn reduce(&self, samples: &[Duration]) -> Option<f64>;
}

/// Arithmetic mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Reducer for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn reduce(&self, samples: &[Duration]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let total: f64 = samples.iter().map(Duration::as_secs_f64).sum();
        Some(total / samples.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Median;

impl Reducer for Median {
    fn name(&self) -> &'static str {
        "median"
    }

    fn reduce(&self, samples: &[Duration]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut secs: Vec<f64> = samples.iter().map(Duration::as_secs_f64).collect();
        secs.sort_by(f64::total_cmp);
        let mid = secs.len() / 2;
        if secs.len() % 2 == 0 {
            Some((secs[mid - 1] + secs[mid]) / 2.0)
        } else {
            Some(secs[mid])
        }
    }
}

/// Net cost of a cell: `full - baseline` floored at zero, plus the unfloored
/// difference. Either side missing makes both missing.
pub fn net(full: Option<f64>, baseline: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (full, baseline) {
        (Some(full), Some(baseline)) => {
            let raw = full - baseline;
            (Some(raw.max(0.0)), Some(raw))
        }
        _ => (None, None),
    }
}

/// Values keyed by N (rows, ascending) and SUT (columns, in recorded order).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultMatrix {
    columns: Vec<String>,
    rows: BTreeMap<usize, Vec<Option<f64>>>,
}

impl ResultMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.keys().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Option<f64>])> {
        self.rows.iter().map(|(size, row)| (*size, row.as_slice()))
    }

    /// Add an all-missing row for `size` if it has none.
    pub fn ensure_row(&mut self, size: usize) -> &mut Vec<Option<f64>> {
        let width = self.columns.len();
        self.rows.entry(size).or_insert_with(|| vec![None; width])
    }

    /// Returns false when `sut` is not a column of this matrix.
    pub fn set(&mut self, size: usize, sut: &str, value: Option<f64>) -> bool {
        let Some(index) = self.column_index(sut) else {
            return false;
        };
        self.ensure_row(size)[index] = value;
        true
    }

    pub fn get(&self, size: usize, sut: &str) -> Option<f64> {
        let index = self.column_index(sut)?;
        self.rows.get(&size).and_then(|row| row[index])
    }

    pub fn column_index(&self, sut: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == sut)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Aggregated results of one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregation {
    /// Statistic per cell; net of baseline and floored at zero when enabled.
    pub results: BTreeMap<Operation, ResultMatrix>,
    /// Unfloored `full - baseline`, present only with baseline subtraction.
    pub raw: Option<BTreeMap<Operation, ResultMatrix>>,
}

/// Reduce raw samples to one matrix per operation.
pub fn reduce(samples: &RawSamples, baseline: bool, reducer: &dyn Reducer) -> Aggregation {
    let mut results = BTreeMap::new();
    let mut raw_results = BTreeMap::new();

    for operation in samples.operations() {
        let columns = samples.columns(operation).to_vec();
        let mut matrix = ResultMatrix::new(columns.clone());
        let mut raw_matrix = ResultMatrix::new(columns.clone());

        for size in samples.sizes(operation) {
            matrix.ensure_row(size);
            raw_matrix.ensure_row(size);
            for sut in &columns {
                let full = reducer.reduce(&samples.durations(&SampleKey::new(
                    operation,
                    sut,
                    size,
                    ArtifactKind::Full,
                )));
                if baseline {
                    let base = reducer.reduce(&samples.durations(&SampleKey::new(
                        operation,
                        sut,
                        size,
                        ArtifactKind::Baseline,
                    )));
                    let (floored, unfloored) = net(full, base);
                    matrix.set(size, sut, floored);
                    raw_matrix.set(size, sut, unfloored);
                } else {
                    matrix.set(size, sut, full);
                }
            }
        }

        results.insert(operation, matrix);
        raw_results.insert(operation, raw_matrix);
    }

    Aggregation {
        results,
        raw: baseline.then_some(raw_results),
    }
}
