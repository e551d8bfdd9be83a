//! CyxCloud Placement Planner
//!
//! Loads a cluster snapshot (or the built-in demo layout), plans one
//! add/remove replica move and prints the result.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cyxcloud_placement::{
    ClusterStateSource, DemoCluster, JsonSnapshot, LogFormat, PlacementModel, Planner,
    PlannerConfig,
};
use cyxcloud_solver::BranchAndBound;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cyxcloud-placement")]
#[command(about = "CyxCloud replica placement planner")]
struct Cli {
    /// JSON cluster snapshot; the demo layout is used when omitted
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, default_value = "false")]
    json: bool,

    /// Branching decisions allowed per solve call
    #[arg(long)]
    max_branches: Option<u64>,

    /// Time limit per solve call in milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PlannerConfig::from_env()?;
    if let Some(max_branches) = cli.max_branches {
        config.max_branches = max_branches;
    }
    if let Some(time_limit_ms) = cli.time_limit_ms {
        config.time_limit_ms = Some(time_limit_ms);
    }
    if let Some(log_format) = cli.log_format {
        config.log_format = log_format;
    }

    init_tracing(config.log_format);

    info!(
        snapshot = ?cli.snapshot,
        max_branches = config.max_branches,
        time_limit_ms = ?config.time_limit_ms,
        "Starting CyxCloud placement planner"
    );

    let source: Box<dyn ClusterStateSource> = match &cli.snapshot {
        Some(path) => Box::new(JsonSnapshot::new(path)),
        None => Box::new(DemoCluster),
    };
    let nodes = source.nodes().context("Failed to load cluster state")?;
    let model = PlacementModel::new(nodes)?;

    let planner = Planner::new(BranchAndBound::new(config.search_limits()));
    let report = planner.plan(&model).context("Planning failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    Ok(())
}
