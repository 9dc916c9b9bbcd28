// Router wires connectors -> market state -> detector -> sink
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::engine::detector::ArbitrageDetector;
use crate::engine::sink::OpportunitySink;
use crate::engine::stats::Statistics;
use crate::market_data::adapters::VenueAdapter;
use crate::market_data::connector::{
    ConnectionLifecycle, ConnectionState, ConnectorSettings, ExchangeConnector, PriceUpdateHandler,
};
use crate::market_data::market_state::MarketStateStore;
use crate::market_data::types::{Quote, VenueId};

/// Store the quote, then run one detection pass against the fresh snapshot.
pub struct ArbitragePipeline {
    store: Arc<MarketStateStore>,
    detector: ArbitrageDetector,
    sink: Arc<dyn OpportunitySink>,
}

impl ArbitragePipeline {
    pub fn new(store: Arc<MarketStateStore>, detector: ArbitrageDetector, sink: Arc<dyn OpportunitySink>) -> Self {
        Self { store, detector, sink }
    }

    pub fn store(&self) -> &MarketStateStore {
        &self.store
    }
}

impl PriceUpdateHandler for ArbitragePipeline {
    fn on_quote(&self, quote: Quote) {
        trace!(venue = %quote.venue, bid = %quote.bid, ask = %quote.ask, "quote");
        self.store.put(quote);
        let snapshot = self.store.snapshot();
        let found = self.detector.check(&snapshot, self.store.dynamic_bound(), Instant::now());
        for opportunity in &found {
            self.sink.publish(opportunity);
        }
    }
}

/// Live view over every connector's lifecycle, for status reporting.
#[derive(Clone, Default)]
pub struct ConnectionBoard {
    entries: Vec<(VenueId, Arc<ConnectionLifecycle>)>,
}

impl ConnectionBoard {
    pub fn register(&mut self, venue: VenueId, lifecycle: Arc<ConnectionLifecycle>) {
        self.entries.push((venue, lifecycle));
    }

    pub fn connected(&self) -> usize {
        self.entries.iter().filter(|(_, lc)| lc.is_connected()).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// "n/m connected"
    pub fn status(&self) -> String {
        format!("{}/{} connected", self.connected(), self.total())
    }

    pub fn venues(&self) -> impl Iterator<Item = &VenueId> {
        self.entries.iter().map(|(v, _)| v)
    }
}

/// Spawns one supervised connector task per adapter, all feeding `handler`.
pub fn spawn_connectors(
    adapters: Vec<Arc<dyn VenueAdapter>>,
    settings: &ConnectorSettings,
    handler: Arc<dyn PriceUpdateHandler>,
    stats: Arc<Statistics>,
    cancel: &CancellationToken,
) -> (Vec<JoinHandle<()>>, ConnectionBoard) {
    let mut board = ConnectionBoard::default();
    let handles = adapters
        .into_iter()
        .map(|adapter| {
            let lifecycle = Arc::new(ConnectionLifecycle::new());
            board.register(adapter.venue().clone(), lifecycle.clone());
            tokio::spawn(supervise(
                adapter,
                settings.clone(),
                handler.clone(),
                stats.clone(),
                lifecycle,
                cancel.child_token(),
            ))
        })
        .collect();
    (handles, board)
}

// Restarts the connector when its task dies (a panicking handler, say).
// Returns once `cancel` fires.
async fn supervise(
    adapter: Arc<dyn VenueAdapter>,
    settings: ConnectorSettings,
    handler: Arc<dyn PriceUpdateHandler>,
    stats: Arc<Statistics>,
    lifecycle: Arc<ConnectionLifecycle>,
    cancel: CancellationToken,
) {
    let venue = adapter.venue().clone();
    loop {
        let connector = ExchangeConnector::with_lifecycle(
            adapter.clone(),
            settings.clone(),
            handler.clone(),
            stats.clone(),
            lifecycle.clone(),
        );
        let failure = match tokio::spawn(connector.run(cancel.clone())).await {
            Ok(()) => return,
            Err(e) if e.is_cancelled() => return,
            Err(e) => e,
        };
        stats.record_connector_failure();
        lifecycle.transition(ConnectionState::Disconnected);
        error!(%venue, error = %failure, "connector task died, restarting");
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(settings.reconnect_delay) => {}
        }
    }
}
