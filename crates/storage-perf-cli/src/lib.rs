//! storage-perf CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use storage_perf::telemetry::LogFormat;

/// Time volume claim lifecycles on a Kubernetes storage platform
#[derive(Parser, Debug)]
#[command(name = "storage-perf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Harness configuration YAML
    #[arg(long, global = true, env = "STORAGE_PERF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kubeconfig to use instead of the kube defaults
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Time deletion of a single claim
    SingleDeletion(commands::deletion::SingleDeletionArgs),
    /// Time deletion of many claims at once
    BulkDeletion(commands::deletion::BulkDeletionArgs),
    /// Fill a shared-filesystem volume with many files
    ManyFiles(commands::many_files::ManyFilesArgs),
    /// Print the resolved configuration
    ShowConfig,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let global = commands::GlobalArgs {
            config: self.config,
            kubeconfig: self.kubeconfig,
        };
        match self.command {
            Commands::SingleDeletion(args) => commands::deletion::run_single(&global, args).await,
            Commands::BulkDeletion(args) => commands::deletion::run_bulk(&global, args).await,
            Commands::ManyFiles(args) => commands::many_files::run(&global, args).await,
            Commands::ShowConfig => commands::show_config(&global),
        }
    }
}
