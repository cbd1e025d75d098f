//! # Volley CLI
//!
//! Runs a registered operation against a target with a fixed number of
//! concurrent lanes and writes one statistics record per report interval.
//!
//! ## Usage
//!
//! ```bash
//! # 10 000 GET requests over 32 lanes
//! volley --name http --config target.json -n 10000 -c 32
//!
//! # Run for a minute, each lane limited to 20 requests per second
//! volley --name http --config target.json -c 16 -q 20 -z 60
//!
//! # Settings from a profile, JSON lines output
//! volley --profile smoke.toml --format jsonl --output results/
//! ```

mod cli;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use volley_core::{Registry, RunReport, Worker};

use crate::cli::Cli;
use crate::settings::{Profile, Settings};

fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true).with_thread_ids(false)))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let threads = cli.threads.unwrap_or_else(num_cpus::get).max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let registry = Registry::with_builtins();
    volley_http::register(&registry)?;

    if cli.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let profile = match &cli.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };
    let settings = Settings::resolve(&cli, profile)?;
    let sink = settings.sink();

    let worker = Worker::build(settings.worker, &registry, sink)
        .await
        .context("invalid run configuration")?;

    let stop = worker.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                stop.stop().await;
            }
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
    });

    let result = worker.run().await;
    if let Some(report) = worker.report() {
        print_report(&report);
    }
    result.context("run did not complete cleanly")?;
    Ok(())
}

fn print_report(report: &RunReport) {
    let success_rate = if report.ops > 0 {
        report.success as f64 / (report.success + report.errors).max(1) as f64 * 100.0
    } else {
        0.0
    };

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                        VOLLEY RESULTS                        ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║ Duration:        {:>12.2} seconds", report.elapsed.as_secs_f64());
    println!("║ Operations:      {:>12}", report.ops);
    println!("║ Successful:      {:>12}", report.success);
    println!("║ Failed:          {:>12}", report.errors);
    println!("║ Success Rate:    {:>12.2}%", success_rate);
    println!("║ Throughput:      {:>12.2} ops/s", report.throughput());
    println!(
        "║ Avg Latency:     {:>12.3} ms",
        report.avg_latency().as_secs_f64() * 1000.0
    );
    println!("║ Bytes:           {:>12}", report.bytes);
    println!("║ Intervals:       {:>12}", report.intervals);
    println!("╚══════════════════════════════════════════════════════════════╝\n");
}
