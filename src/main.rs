use dispute_watch::config::{self, Config};
use dispute_watch::dispute::{AlloyDisputeContracts, DisputeContracts, DisputeExecutor};
use dispute_watch::feeds::{MonitoredFeed, SourceRegistry};
use dispute_watch::onchain::abi::{
    verify_topic_hashes, NEW_ORACLE_ADDRESS_TOPIC, NEW_PROPOSED_ORACLE_ADDRESS_TOPIC, NEW_REPORT_TOPIC,
};
use dispute_watch::onchain::{BoundUnit, LogPoller, LogSource, PollSettings, PollUnit, RpcLogSource, UnitKind};
use dispute_watch::pipeline::{Clocks, Monitor, MonitorEvent, ProcessorSettings, ReportProcessor, ReportSink};

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "dispute-watch")]
#[command(about = "Watch oracle reports and dispute values outside tolerance", version)]
struct Cli {
    /// Config file; env-only defaults are used when it does not exist.
    #[arg(long, default_value = "dispute-watch.toml")]
    config: PathBuf,

    /// Alert on every new value, not only disputable ones.
    #[arg(short = 'a', long)]
    all_values: bool,

    /// Submit disputes for disputable values on monitored feeds.
    #[arg(short = 'd', long)]
    disputing: bool,

    /// Percentage threshold for feeds without explicit config (alert only).
    #[arg(short = 'c', long)]
    confidence_threshold: Option<f64>,

    /// Seconds between polling cycles.
    #[arg(short = 'w', long)]
    wait: Option<u64>,

    /// Start each chain this many blocks behind the head.
    #[arg(long)]
    initial_block_offset: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Load config
    let config_path = cli.config.clone();
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::from_env()
    };
    apply_cli(&mut config, &cli);

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("dispute-watch v{} starting", env!("CARGO_PKG_VERSION"));
    if !config_path.exists() {
        info!(path = %config_path.display(), "no config file found, using env-only config");
    }

    for (sig, ok) in verify_topic_hashes() {
        if !ok {
            anyhow::bail!("topic hash mismatch for {sig}");
        }
    }

    // --- Trusted sources ---
    let registry = Arc::new(SourceRegistry::new(
        config.rpc_urls(),
        Duration::from_secs(config.monitor.http_timeout_secs),
    )?);

    let mut feeds: Vec<MonitoredFeed> = match config.build_feeds(&registry) {
        Ok(feeds) => feeds,
        Err(e) => {
            error!(error = %e, "invalid feed config, monitoring without configured feeds");
            Vec::new()
        }
    };
    info!(feeds = feeds.len(), "monitored feeds loaded");

    // --- Polling units ---
    let units = build_units(&config);
    if units.is_empty() {
        warn!("no chains configured - nothing to poll");
    }

    // --- Dispute executor ---
    let executor = build_executor(&config);
    if config.dispute.enabled && !executor.is_active() {
        warn!("disputing requested but no dispute account available - alerting only");
    }

    // --- Monitor ---
    let poller = LogPoller::new(PollSettings {
        reorg_margin: config.monitor.reorg_margin,
        initial_block_offset: config.monitor.initial_block_offset,
        max_window_blocks: config.monitor.max_window_blocks,
    });
    let clocks: Arc<dyn Clocks> = registry.clone();
    let processor = ReportProcessor::new(
        registry.clone(),
        clocks,
        config.explorers(),
        ProcessorSettings {
            confidence_threshold: config.monitor.confidence_threshold,
            see_all_values: config.monitor.see_all_values,
        },
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<MonitorEvent>();
    let mut monitor = Monitor::new(
        poller,
        units,
        config.monitor.rpc_timeout(),
        config.monitor.dedup_capacity,
        processor,
        executor,
        events_tx,
    );

    let wait = Duration::from_secs(config.monitor.wait_secs.max(1));
    let reload_path = config_path.exists().then(|| config_path.clone());
    let monitor_registry = registry.clone();
    let monitor_task = tokio::spawn(async move {
        loop {
            if let Some(path) = &reload_path {
                reload(path, &monitor_registry, &mut feeds);
            }
            monitor.run_cycle(&feeds).await;
            tokio::time::sleep(wait).await;
        }
    });

    let sink = ReportSink::new(config.output.rows_path.as_ref().map(PathBuf::from));

    // --- Main Event Loop ---
    info!(wait_secs = wait.as_secs(), "entering main event loop - press Ctrl+C to stop");

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                sink.handle(&event).await;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down...");
                monitor_task.abort();
                break;
            }
        }
    }

    Ok(())
}

fn apply_cli(config: &mut Config, cli: &Cli) {
    if cli.all_values {
        config.monitor.see_all_values = true;
    }
    if cli.disputing {
        config.dispute.enabled = true;
    }
    if let Some(t) = cli.confidence_threshold {
        config.monitor.confidence_threshold = t;
    }
    if let Some(w) = cli.wait {
        config.monitor.wait_secs = w;
    }
    if let Some(offset) = cli.initial_block_offset {
        config.monitor.initial_block_offset = offset;
    }
}

/// Keep the last good feed list when the file no longer parses.
fn reload(path: &Path, registry: &SourceRegistry, feeds: &mut Vec<MonitoredFeed>) {
    match config::reload_feeds(path, registry) {
        Ok(fresh) => {
            if fresh.len() != feeds.len() {
                info!(feeds = fresh.len(), "monitored feeds reloaded");
            }
            *feeds = fresh;
        }
        Err(e) => error!(error = %e, kept = feeds.len(), "feed reload failed, keeping previous feeds"),
    }
}

fn build_units(config: &Config) -> Vec<BoundUnit> {
    let mut units = Vec::new();
    for chain in &config.chains {
        let source: Arc<dyn LogSource> = match RpcLogSource::connect(chain.chain_id, &chain.rpc_url) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                warn!(chain_id = chain.chain_id, name = %chain.name, error = %e, "skipping chain");
                continue;
            }
        };

        if let Some(oracle) = chain.oracle_address {
            units.push(BoundUnit {
                unit: PollUnit {
                    chain_id: chain.chain_id,
                    rpc_url: chain.rpc_url.clone(),
                    address: oracle,
                    topics: vec![NEW_REPORT_TOPIC],
                    kind: UnitKind::Reports,
                },
                source: source.clone(),
            });
        }
        if let Some(token) = chain.token_address {
            units.push(BoundUnit {
                unit: PollUnit {
                    chain_id: chain.chain_id,
                    rpc_url: chain.rpc_url.clone(),
                    address: token,
                    topics: vec![NEW_ORACLE_ADDRESS_TOPIC, NEW_PROPOSED_ORACLE_ADDRESS_TOPIC],
                    kind: UnitKind::OracleAddress,
                },
                source,
            });
        }
        info!(chain_id = chain.chain_id, name = %chain.name, "chain configured");
    }
    units
}

fn build_executor(config: &Config) -> DisputeExecutor {
    let dispute = &config.dispute;
    if !dispute.enabled {
        return DisputeExecutor::disabled();
    }
    if !config.has_dispute_key() {
        warn!("DISPUTER_PRIVATE_KEY not set");
        return DisputeExecutor::disabled();
    }
    let Some(chain) = config.chain(dispute.chain_id) else {
        warn!(chain_id = dispute.chain_id, "dispute chain is not configured");
        return DisputeExecutor::disabled();
    };
    let (Some(oracle), Some(token), Some(governance)) =
        (chain.oracle_address, chain.token_address, chain.governance_address)
    else {
        warn!(chain_id = chain.chain_id, "dispute chain needs oracle, token and governance addresses");
        return DisputeExecutor::disabled();
    };

    match AlloyDisputeContracts::connect(&chain.rpc_url, &dispute.private_key, oracle, token, governance) {
        Ok(contracts) => {
            let contracts: Arc<dyn DisputeContracts> = Arc::new(contracts);
            DisputeExecutor::new(
                true,
                chain.chain_id,
                Some(contracts),
                dispute.approve_multiplier,
                chain.explorer.clone(),
            )
        }
        Err(e) => {
            error!(error = %e, "failed to set up dispute account");
            DisputeExecutor::disabled()
        }
    }
}
