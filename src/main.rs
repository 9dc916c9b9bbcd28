use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use arbx_rs::config::Settings;
use arbx_rs::engine::detector::ArbitrageDetector;
use arbx_rs::engine::sink::{self, ChannelSink, LogSink};
use arbx_rs::engine::skew::ClockSkewEstimator;
use arbx_rs::engine::stats::{Statistics, StatisticsReporter};
use arbx_rs::market_data::adapters;
use arbx_rs::market_data::market_state::MarketStateStore;
use arbx_rs::market_data::router::{spawn_connectors, ArbitragePipeline};
use arbx_rs::telemetry;

/// Streams best bid/ask from several venues and logs cross-venue arbitrage.
#[derive(Debug, Parser)]
#[command(name = "arbx", version)]
struct Args {
    /// Settings file (toml, json or yaml). ARBX_* env vars override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// tracing filter, e.g. "info,arbx_rs::market_data=debug". RUST_LOG wins.
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    let settings = settings.validate().context("invalid settings")?;

    telemetry::init_tracing(args.log_filter.as_deref().unwrap_or(&settings.log_filter));
    telemetry::init_metrics(settings.metrics_addr)?;
    info!(
        instrument = %settings.instrument,
        threshold_percent = %settings.detector.threshold_percent,
        venues = settings.venues.len(),
        "starting"
    );

    let stats = Arc::new(Statistics::new());
    let store = Arc::new(MarketStateStore::new(Arc::new(ClockSkewEstimator::new(settings.skew.clone()))));
    let detector = ArbitrageDetector::new(settings.detector.clone(), stats.clone());

    // opportunities leave the ingest path through a bounded queue
    let (queue, rx) = ChannelSink::new(settings.opportunity_queue_capacity);
    let queue = Arc::new(queue);
    let consumer = tokio::spawn(sink::drain(rx, Arc::new(LogSink)));
    let pipeline = Arc::new(ArbitragePipeline::new(store, detector, queue.clone()));

    let venue_adapters = settings
        .venues
        .iter()
        .map(|(venue, url)| adapters::build(venue, url.clone(), &settings.instrument))
        .collect();

    let cancel = CancellationToken::new();
    let (connectors, board) =
        spawn_connectors(venue_adapters, &settings.connector, pipeline.clone(), stats.clone(), &cancel);

    let status = board.clone();
    let reporter = tokio::spawn(
        StatisticsReporter::new(stats.clone(), settings.statistics_interval, Arc::new(move || status.status()))
            .run(cancel.clone()),
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();

    for (venue, handle) in board.venues().zip(connectors) {
        if let Err(e) = handle.await {
            error!(%venue, error = %e, "connector supervisor failed");
        }
    }
    let summary = reporter.await.context("statistics reporter")?;

    let dropped = queue.dropped();
    drop(pipeline);
    drop(queue);
    let delivered = consumer.await.context("opportunity consumer")?;

    info!(
        checks = summary.checks,
        opportunities = summary.opportunities,
        delivered,
        dropped,
        "stopped"
    );
    Ok(())
}
