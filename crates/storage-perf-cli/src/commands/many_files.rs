//! Many-files scale command

use std::sync::Arc;

use clap::Args;

use storage_perf::populate::{KubectlLoadGenerator, RealCommandRunner};
use storage_perf::scenario::ManyFilesScenario;

use super::{finish, kube_client, load_config, scenario_context, GlobalArgs};
use crate::Result;

/// Fill a shared-filesystem volume with many files
#[derive(Args, Debug)]
pub struct ManyFilesArgs {
    /// Number of files; defaults to the configured count
    #[arg(long)]
    pub files: Option<u64>,

    /// Only report disk usage of an already-populated volume
    #[arg(long)]
    pub skip_populate: bool,

    /// Pin the pod to this node
    #[arg(long)]
    pub node: Option<String>,
}

pub async fn run(global: &GlobalArgs, args: ManyFilesArgs) -> Result<()> {
    let mut config = load_config(global)?;
    if let Some(files) = args.files {
        config.many_files.file_count = files;
    }
    if args.node.is_some() {
        config.many_files.node_name = args.node;
    }

    let runner = match &global.kubeconfig {
        Some(path) => RealCommandRunner::with_kubeconfig(path.display().to_string()),
        None => RealCommandRunner::default(),
    };
    let load = KubectlLoadGenerator::with_runner(runner, config.many_files.batch_size);

    let client = kube_client(global.kubeconfig.as_deref()).await?;
    let ctx = scenario_context(client, config);
    let report = ManyFilesScenario::new(Arc::new(load), !args.skip_populate)
        .run(&ctx)
        .await;
    finish("many-files", report)
}
