use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ctbench_core::{
    Catalogue, Operation,
    config::{BenchConfig, DEFAULT_CONFIG_FILE, FailurePolicy, SizeRange, Statistic, Toolchain},
    executor::BuildCommand,
    report::{ResultWriter, render_table},
};

#[cfg(test)]
mod main_test;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "ctbench_core=info,ctbench_cli=info";
const DEFAULT_LABEL: &str = "default";

#[derive(Debug, Parser)]
#[command(
    name = "ctbench",
    author,
    version,
    about = "Compile-time benchmarks for template metaprogramming libraries",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate, build and time every selected catalogue entry, then write result tables.
    Run(RunArgs),
    /// Print the workload generated for an operation at size N.
    Generate {
        #[arg(value_parser = parse_operation)]
        operation: Operation,
        #[arg(value_name = "N")]
        size: usize,
    },
    /// List the operations and SUTs found in a catalogue.
    List {
        #[arg(long)]
        catalogue: Option<PathBuf>,
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print a stored result table, or list the tables of a label.
    Show {
        label: String,
        #[arg(value_parser = parse_operation)]
        operation: Option<Operation>,
        /// Show the unfloored net values instead
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatisticCli {
    Mean,
    Median,
}

impl From<StatisticCli> for Statistic {
    fn from(value: StatisticCli) -> Self {
        match value {
            StatisticCli::Mean => Statistic::Mean,
            StatisticCli::Median => Statistic::Median,
        }
    }
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Configuration file (defaults to ./ctbench.toml when present)
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[arg(long)]
    catalogue: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Only run the configured toolchains with these labels
    #[arg(long = "toolchain", value_name = "LABEL")]
    toolchains: Vec<String>,
    /// Label for an ad-hoc build command given after `--`
    #[arg(long)]
    label: Option<String>,
    /// SUT allow-list (repeatable)
    #[arg(long = "sut", value_name = "NAME")]
    suts: Vec<String>,
    /// Operation allow-list (repeatable)
    #[arg(long = "operation", value_name = "OP")]
    operations: Vec<String>,
    #[arg(long, short = 'r')]
    repetitions: Option<usize>,
    #[arg(long)]
    start: Option<usize>,
    #[arg(long)]
    end: Option<usize>,
    #[arg(long)]
    step: Option<usize>,
    /// Measure the directive-only baseline and report net cost
    #[arg(long)]
    baseline: bool,
    /// Record failing builds as missing cells instead of aborting
    #[arg(long)]
    keep_going: bool,
    #[arg(long, value_enum)]
    statistic: Option<StatisticCli>,
    /// Per-invocation timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    retries: Option<u32>,
    /// Cells measured in parallel; anything above 1 gives up isolated timings
    #[arg(long, short = 'j')]
    jobs: Option<usize>,
    /// Keep generated artifacts in this directory
    #[arg(long)]
    keep_scratch: Option<PathBuf>,
    /// Ad-hoc build command, e.g. `-- clang++ -std=c++2c -c {input} -o {output}`
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn parse_operation(raw: &str) -> Result<Operation, String> {
    raw.parse::<Operation>().map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn init_tracing() {
    let raw = std::env::var("CTBENCH_LOG").ok();
    if let Some(raw) = raw.as_deref()
        && !env_toggle_enabled(raw)
    {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = raw
            .as_deref()
            .and_then(filter_expr_from)
            .or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr).with_target(false);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                BenchConfig::load(default)
            } else {
                Ok(BenchConfig::default())
            }
        }
    }
}

/// Fold command-line overrides into the loaded configuration.
fn apply_overrides(config: &mut BenchConfig, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(catalogue) = &args.catalogue {
        config.catalogue = catalogue.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if let Some(repetitions) = args.repetitions {
        config.repetitions = repetitions;
    }
    if args.start.is_some() || args.end.is_some() || args.step.is_some() {
        // `--start` alone measures a single size; `--step` keeps sweeping to the configured end.
        let end = match args.end {
            Some(end) => Some(end),
            None if args.start.is_some() && args.step.is_none() => None,
            None => config.sizes.end,
        };
        if args.step.is_some() && end.is_none() {
            bail!("--step needs an end; pass --end or set `end` in [sizes]");
        }
        config.sizes = SizeRange {
            start: args.start.unwrap_or(config.sizes.start),
            end,
            step: args.step.or(config.sizes.step),
        };
    }
    if args.baseline {
        config.baseline = true;
    }
    if args.keep_going {
        config.failure_policy = FailurePolicy::Skip;
    }
    if let Some(statistic) = args.statistic {
        config.statistic = statistic.into();
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = Some(timeout);
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(dir) = &args.keep_scratch {
        config.keep_scratch = Some(dir.clone());
    }
    if !args.suts.is_empty() {
        config.suts = Some(args.suts.clone());
        for toolchain in &mut config.toolchains {
            toolchain.suts = None;
        }
    }
    if !args.operations.is_empty() {
        config.operations = Some(args.operations.clone());
    }

    if let Some(command) = BuildCommand::from_argv(&args.command) {
        if !args.toolchains.is_empty() {
            bail!("--toolchain selects configured toolchains and cannot be combined with an ad-hoc command");
        }
        config.toolchains = vec![Toolchain {
            label: args.label.clone().unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            program: command.program,
            args: command.args,
            suts: None,
        }];
    } else if args.label.is_some() {
        bail!("--label names an ad-hoc command; pass one after `--`");
    } else if !args.toolchains.is_empty() {
        for wanted in &args.toolchains {
            if !config.toolchains.iter().any(|t| &t.label == wanted) {
                bail!("no toolchain labelled '{}' in the configuration", wanted);
            }
        }
        config.toolchains.retain(|t| args.toolchains.contains(&t.label));
    }
    Ok(())
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;
    let runs = config.run_configs()?;
    let catalogue = Catalogue::discover(&config.catalogue)
        .with_context(|| format!("discover catalogue {}", config.catalogue.display()))?;
    if catalogue.is_empty() {
        bail!("catalogue {} holds no SUT snippets", config.catalogue.display());
    }

    for run in &runs {
        tracing::info!(label = %run.label, command = %run.command, "running toolchain");
        let dest = ctbench_core::run_and_write(&catalogue, run, &config.output)
            .with_context(|| format!("benchmark run '{}'", run.label))?;
        println!("{} -> {}", run.label, dest.display());
    }
    Ok(())
}

fn list(catalogue: Option<PathBuf>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let root = match catalogue {
        Some(root) => root,
        None => load_config(config.as_deref())?.catalogue,
    };
    let catalogue = Catalogue::discover(&root)?;
    for (operation, snippets) in catalogue.iter() {
        let names: Vec<&str> = snippets.iter().map(|s| s.name.as_str()).collect();
        println!("{}: {}", operation, names.join(", "));
    }
    Ok(())
}

fn show(
    label: &str,
    operation: Option<Operation>,
    raw: bool,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let root = match output {
        Some(root) => root,
        None => load_config(config.as_deref())?.output,
    };
    let writer = ResultWriter::new(root);
    match operation {
        Some(operation) => {
            let matrix = writer.read(label, operation, raw)?;
            print!("{}", render_table(&matrix));
        }
        None => {
            for (operation, path) in writer.tables(label)? {
                println!("{}: {}", operation, path.display());
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = CliArgs::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Generate { operation, size } => {
            print!("{}", operation.generate(size).render());
            Ok(())
        }
        Commands::List { catalogue, config } => list(catalogue, config),
        Commands::Show {
            label,
            operation,
            raw,
            output,
            config,
        } => show(&label, operation, raw, output, config),
    }
}
