pub mod aggregate;
pub mod catalogue;
pub mod config;
pub mod error;
pub mod executor;
pub mod operation;
pub mod report;
pub mod runner;

#[cfg(test)]
mod aggregate_test;
#[cfg(test)]
mod operation_test;

use anyhow::Result;
use std::path::PathBuf;

pub use aggregate::{Aggregation, ResultMatrix};
pub use catalogue::Catalogue;
pub use config::{BenchConfig, RunConfig};
pub use error::BenchError;
pub use operation::Operation;
pub use runner::{BenchmarkRunner, RawSamples};

/// Run one labelled configuration end to end: measure, aggregate, write.
pub fn run_and_write(catalogue: &Catalogue, config: &RunConfig, output: &std::path::Path) -> Result<PathBuf> {
    let samples = BenchmarkRunner::new(config).run(catalogue)?;
    let aggregation = aggregate::reduce(&samples, config.baseline, config.statistic.reducer());
    let record = report::RunRecord::new(config, &aggregation);
    report::ResultWriter::new(output).write(&config.label, &aggregation, &record)
}
