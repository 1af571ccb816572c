//! MetricSet CLI
//!
//! Composes MetricSet manifests into replicated jobs and entrypoint scripts.

use clap::Parser;

use metricset_cli::{Cli, Result};
use metricset_common::telemetry::{init_telemetry, TelemetryConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    cli.run()
}
