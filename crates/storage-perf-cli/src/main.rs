//! storage-perf CLI entry point

use clap::Parser;

use storage_perf::telemetry::init_logging;
use storage_perf_cli::{Cli, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;
    cli.run().await
}
