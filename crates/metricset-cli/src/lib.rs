//! MetricSet CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};
use metricset_common::telemetry::LogFormat;

/// metricset - compose HPC metric sets into replicated jobs
#[derive(Parser, Debug)]
#[command(name = "metricset")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log line format (text or json)
    #[arg(long, env = "METRICSET_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compose a MetricSet manifest
    Compose(commands::compose::ComposeArgs),
    /// Print the MetricSet CustomResourceDefinition
    Crd,
    /// List registered metrics and addons
    List(commands::list::ListArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Compose(args) => commands::compose::run(args),
            Commands::Crd => commands::crd::run(),
            Commands::List(args) => commands::list::run(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compose_with_global_log_format() {
        let cli = Cli::try_parse_from([
            "metricset",
            "compose",
            "--file",
            "set.yaml",
            "--log-format",
            "json",
            "-o",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Compose(args) => {
                assert_eq!(args.file.to_str(), Some("set.yaml"));
                assert_eq!(args.output, commands::OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_log_format() {
        let err = Cli::try_parse_from(["metricset", "--log-format", "xml", "crd"]).unwrap_err();
        assert!(err.to_string().contains("unknown log format"));
    }
}
