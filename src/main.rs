//! `sentinel` binary: runs a configured filter chain over call logs and reports the
//! flagged categories, or lists what is available.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

use call_sentinel::config::RunConfig;
use call_sentinel::export::EXPORTERS;
use call_sentinel::filters::registry::read_global;
use call_sentinel::pipeline;
use call_sentinel::telemetry;

#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(author, version, about = "Flag anomalous calls in call-center logs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured filters and exporters
    Run {
        /// TOML run config (default: $SENTINEL_CONFIG_PATH, then config/sentinel.toml)
        #[arg(short = 'c', long)]
        config_file: Option<PathBuf>,
    },

    /// List available components
    List {
        #[command(subcommand)]
        what: ListTarget,
    },
}

#[derive(Subcommand, Debug)]
enum ListTarget {
    /// Registered filters
    Filters {
        /// Show each filter's options and defaults
        #[arg(short, long)]
        verbose: bool,
    },

    /// Available export sinks
    Exporters,
}

fn list_filters(verbose: bool) {
    let registry = read_global();
    for spec in registry.specs() {
        println!("{:<28} {}", spec.name, spec.description);
        if verbose {
            for opt in spec.options {
                println!("    {:<24} default {:<8} {}", opt.name, opt.default, opt.help);
            }
        }
    }
}

fn list_exporters() {
    for (name, description) in EXPORTERS {
        println!("{name:<28} {description}");
    }
}

async fn run(config_file: Option<PathBuf>) -> ExitCode {
    let config = match RunConfig::load(config_file.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(stage = "config", error = %format!("{e:#}"), "run failed");
            eprintln!("config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match pipeline::run(&config).await {
        Ok(report) if report.is_success() => {
            info!(run_id = %report.run_id, rows = report.rows_read, "run finished");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            for f in &report.sink_failures {
                eprintln!("export ({}): {}", f.sink, f.error);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(stage = "pipeline", error = %format!("{e:#}"), "run failed");
            eprintln!("pipeline: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let args = Args::parse();
    match args.command {
        Command::Run { config_file } => {
            let metrics = telemetry::MetricsSnapshot::install_from_env();
            let code = run(config_file).await;
            if let Some(m) = &metrics {
                if let Err(e) = m.write() {
                    warn!(error = %format!("{e:#}"), "metrics snapshot failed");
                }
            }
            code
        }
        Command::List { what } => {
            match what {
                ListTarget::Filters { verbose } => list_filters(verbose),
                ListTarget::Exporters => list_exporters(),
            }
            ExitCode::SUCCESS
        }
    }
}
