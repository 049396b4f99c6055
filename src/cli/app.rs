use super::{Cli, Command, TargetArgs};
use anyhow::{Context, Result};
use gitkeeper::maintenance::LastRunFile;
use gitkeeper::maintenance::steps::{COMMIT_GRAPH_AREA, MULTI_PACK_INDEX_AREA};
use gitkeeper::{
    CommandGitProcessFactory, CommitGraphStep, GitProcessFactory, HostControl,
    MaintenanceConfig, MaintenanceScheduler, MaintenanceTask, MultiPackIndexStep,
    pack_inventory_invoker,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Dispatch a parsed command line. Returns the process exit status.
pub async fn run(cli: Cli) -> Result<i32> {
    gitkeeper::logging::init(cli.log_json)?;

    match cli.command {
        Command::Run {
            target,
            config,
            once,
        } => run_maintenance(&target, config.as_deref(), once).await,
        Command::Stats { target, config } => print_stats(&target, config.as_deref()),
    }
}

fn load_config(target: &TargetArgs, overrides: Option<&Path>) -> Result<MaintenanceConfig> {
    let mut config = MaintenanceConfig::new(&target.repo, &target.object_cache);
    if let Some(path) = overrides {
        config = config
            .with_overrides_file(path)
            .with_context(|| format!("failed to load config overrides {}", path.display()))?;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run_maintenance(target: &TargetArgs, overrides: Option<&Path>, once: bool) -> Result<i32> {
    let config = Arc::new(load_config(target, overrides)?);
    let host = HostControl::new();
    let inventory = Arc::new(pack_inventory_invoker(&config)?);
    let processes: Arc<dyn GitProcessFactory> = Arc::new(CommandGitProcessFactory::new(
        config.git_binary.clone(),
        config.repo_root.clone(),
    ));

    let commit_graph = Arc::new(MaintenanceTask::new(
        CommitGraphStep::new(config.commit_graph_interval),
        Arc::clone(&config),
        Arc::clone(&processes),
        host.clone(),
    ));
    let multi_pack_index = Arc::new(MaintenanceTask::new(
        MultiPackIndexStep::new(config.multi_pack_index_interval, Arc::clone(&inventory)),
        Arc::clone(&config),
        Arc::clone(&processes),
        host.clone(),
    ));

    let scheduler = MaintenanceScheduler::new(host.clone())
        .add(commit_graph, config.schedule_interval)
        .add(multi_pack_index, config.schedule_interval);

    info!(
        repo = %config.repo_root.display(),
        object_cache = %config.object_cache_root.display(),
        once,
        "gitkeeper started"
    );

    let code = if once {
        for (area, outcome) in scheduler.run_once().await? {
            info!(area = %area, ?outcome, "maintenance pass finished");
        }
        host.exit_requested().map(|request| request.code).unwrap_or(0)
    } else {
        let handle = scheduler.start();
        let code = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for interrupt")?;
                info!("interrupt received, stopping maintenance");
                0
            }
            request = host.wait_for_exit() => request.code,
        };
        handle.stop().await?;
        code
    };

    inventory.shutdown();
    info!(exit_code = code, inventory = %inventory.stats(), "gitkeeper stopped");
    Ok(code)
}

fn print_stats(target: &TargetArgs, overrides: Option<&Path>) -> Result<i32> {
    let config = load_config(target, overrides)?;
    let inventory = pack_inventory_invoker(&config)?;

    let packs = inventory
        .try_invoke(|inventory| {
            Ok(json!({
                "pack_dir": inventory.pack_dir().display().to_string(),
                "packs": inventory.pack_count(),
                "unindexed_packs": inventory.unindexed_packs(),
                "total_pack_bytes": inventory.total_pack_bytes(),
                "multi_pack_index": inventory.has_multi_pack_index(),
                "scanned_at": inventory.scanned_at().to_rfc3339(),
            }))
        })?
        .context("pack inventory is shut down")?;

    let mut last_run = serde_json::Map::new();
    for area in [COMMIT_GRAPH_AREA, MULTI_PACK_INDEX_AREA] {
        let file = LastRunFile::new(config.last_run_path(area));
        let value = match file.read() {
            Ok(timestamp) => json!(timestamp),
            Err(err) => json!({ "error": err.to_string() }),
        };
        last_run.insert(area.to_string(), value);
    }

    let report = json!({
        "inventory": packs,
        "last_run": last_run,
        "invoker": inventory.stats().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    inventory.shutdown();
    Ok(0)
}
