//! Relay route optimizer CLI
//!
//! Builds the route matrix from a relay registry and relay ping dumps.
//!
//! Usage:
//!   route-optimizer --relays data/relays.json \
//!                   --stats data/relay_stats.json \
//!                   --output data/route_matrix.bin
//!
//! With `--watch SECS` the inputs are re-read and the outputs rewritten on
//! every interval until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use route_optimizer::{
    run_once, watch, ControlPlane, OptimizerConfig, OutputPaths, DEFAULT_MAX_JITTER, DEFAULT_MAX_PACKET_LOSS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "route-optimizer", about = "Build relay route matrices from relay ping stats")]
struct Args {
    /// Relay registry JSON file
    #[arg(short, long, default_value = "data/relays.json")]
    relays: PathBuf,

    /// Relay stats updates JSON file
    #[arg(short, long, default_value = "data/relay_stats.json")]
    stats: PathBuf,

    /// Route matrix output (binary)
    #[arg(short, long, default_value = "data/route_matrix.bin")]
    output: PathBuf,

    /// Also write the cost matrix (binary)
    #[arg(long)]
    cost_output: Option<PathBuf>,

    /// Write a JSON summary of each pass
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Minimum improvement in ms for an indirect route
    #[arg(long, default_value_t = route_matrix::DEFAULT_THRESHOLD_RTT)]
    threshold_rtt: i32,

    /// Jitter ceiling in ms
    #[arg(long, default_value_t = DEFAULT_MAX_JITTER)]
    max_jitter: f32,

    /// Packet loss ceiling in percent
    #[arg(long, default_value_t = DEFAULT_MAX_PACKET_LOSS)]
    max_packet_loss: f32,

    /// Row segments for the parallel optimizer
    #[arg(long)]
    segments: Option<usize>,

    /// Rebuild every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "route_optimizer=debug,route_matrix=debug,relay_stats=debug"
    } else {
        "route_optimizer=info,route_matrix=info,relay_stats=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(fmt::layer())
        .init();

    let config = OptimizerConfig {
        threshold_rtt: args.threshold_rtt,
        max_jitter: args.max_jitter,
        max_packet_loss: args.max_packet_loss,
        segments: args.segments,
    };
    let paths = OutputPaths {
        relays: args.relays,
        stats: args.stats,
        output: args.output,
        cost_output: args.cost_output,
        summary: args.summary,
    };
    let plane = Arc::new(ControlPlane::new(config));

    match args.watch {
        Some(secs) => {
            info!("Rebuilding every {}s", secs);
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
            };
            let passes = watch(plane, paths, Duration::from_secs(secs.max(1)), shutdown).await;
            info!("Completed {} passes", passes);
        }
        None => {
            let summary = run_once(&plane, &paths).context("optimization pass failed")?;
            info!(
                "Built {} routes across {} relays ({} reachable pairs) in {}ms",
                summary.routes, summary.relays, summary.reachable_pairs, summary.elapsed_ms
            );
        }
    }

    Ok(())
}
