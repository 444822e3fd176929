//! Deletion timing commands

use clap::Args;

use storage_perf::scenario::{BulkDeletionScenario, SingleDeletionScenario};
use storage_perf::InterfaceKind;

use super::{finish, kube_client, load_config, scenario_context, GlobalArgs};
use crate::Result;

/// Time deletion of a single claim
#[derive(Args, Debug)]
pub struct SingleDeletionArgs {
    /// Storage interface: block (rbd) or shared-filesystem (cephfs)
    #[arg(long, default_value = "block")]
    pub interface: InterfaceKind,

    /// Claim size; defaults to the configured size
    #[arg(long)]
    pub size: Option<String>,

    /// Run once for each of 1Gi, 10Gi, 100Gi, 1Ti and 2Ti
    #[arg(long, conflicts_with = "size")]
    pub all_sizes: bool,
}

/// Time deletion of many claims at once
#[derive(Args, Debug)]
pub struct BulkDeletionArgs {
    /// Storage interface: block (rbd) or shared-filesystem (cephfs)
    #[arg(long, default_value = "block")]
    pub interface: InterfaceKind,

    /// Claim size; defaults to the configured size
    #[arg(long)]
    pub size: Option<String>,

    /// Number of claims; defaults to the configured count
    #[arg(long)]
    pub count: Option<usize>,

    /// Bind-wait pool width; defaults to the configured width
    #[arg(long)]
    pub concurrency: Option<usize>,
}

pub async fn run_single(global: &GlobalArgs, args: SingleDeletionArgs) -> Result<()> {
    let config = load_config(global)?;
    let sizes: Vec<String> = if args.all_sizes {
        SingleDeletionScenario::SIZES
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        vec![args.size.unwrap_or_else(|| config.default_size.clone())]
    };

    let client = kube_client(global.kubeconfig.as_deref()).await?;
    let ctx = scenario_context(client, config);
    for size in sizes {
        let report = SingleDeletionScenario::new(args.interface, &size)
            .run(&ctx)
            .await;
        finish(&format!("single-deletion {}", size), report)?;
    }
    Ok(())
}

pub async fn run_bulk(global: &GlobalArgs, args: BulkDeletionArgs) -> Result<()> {
    let config = load_config(global)?;
    let scenario = BulkDeletionScenario::new(
        args.interface,
        args.size.unwrap_or_else(|| config.default_size.clone()),
        args.count.unwrap_or(config.bulk_count),
        args.concurrency.unwrap_or(config.pool_width),
    );

    let client = kube_client(global.kubeconfig.as_deref()).await?;
    let ctx = scenario_context(client, config);
    let report = scenario.run(&ctx).await;
    finish("bulk-deletion", report)
}
