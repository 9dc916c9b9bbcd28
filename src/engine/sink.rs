use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use crate::engine::types::ArbitrageOpportunity;

/// Downstream consumer of detected opportunities.
///
/// `publish` is called on the ingest path, so implementations must not block.
pub trait OpportunitySink: Send + Sync {
    fn publish(&self, opportunity: &ArbitrageOpportunity);
}

/// Writes each opportunity to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl OpportunitySink for LogSink {
    fn publish(&self, o: &ArbitrageOpportunity) {
        info!(
            instrument = %o.instrument,
            buy_venue = %o.buy_venue,
            buy_price = %o.buy_price,
            sell_venue = %o.sell_venue,
            sell_price = %o.sell_price,
            difference = %o.price_difference(),
            margin_percent = %o.margin_percent.round_dp(4),
            "arbitrage opportunity"
        );
    }
}

/// Hands opportunities to an async consumer over a bounded queue.
/// A full queue drops the newest opportunity and counts it.
pub struct ChannelSink {
    tx: mpsc::Sender<ArbitrageOpportunity>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ArbitrageOpportunity>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: AtomicU64::new(0) }, rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl OpportunitySink for ChannelSink {
    fn publish(&self, opportunity: &ArbitrageOpportunity) {
        match self.tx.try_send(opportunity.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(o)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("arbx_opportunities_dropped_total").increment(1);
                warn!(buy = %o.buy_venue, sell = %o.sell_venue, dropped, "opportunity queue full, dropping");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("opportunity consumer is gone");
            }
        }
    }
}

/// Forwards to every inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OpportunitySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn OpportunitySink>>) -> Self {
        Self { sinks }
    }
}

impl OpportunitySink for FanoutSink {
    fn publish(&self, opportunity: &ArbitrageOpportunity) {
        for sink in &self.sinks {
            sink.publish(opportunity);
        }
    }
}

/// Drains a `ChannelSink` queue into `sink` until every sender is dropped.
pub async fn drain(mut rx: mpsc::Receiver<ArbitrageOpportunity>, sink: Arc<dyn OpportunitySink>) -> u64 {
    let mut delivered = 0;
    while let Some(opportunity) = rx.recv().await {
        sink.publish(&opportunity);
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::market_data::types::VenueId;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    /// Collects everything published, for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub seen: Mutex<Vec<ArbitrageOpportunity>>,
    }

    impl OpportunitySink for RecordingSink {
        fn publish(&self, opportunity: &ArbitrageOpportunity) {
            self.seen.lock().push(opportunity.clone());
        }
    }

    fn opportunity(buy: &str, sell: &str) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            instrument: "ethusdt".into(),
            buy_venue: VenueId::new(buy),
            sell_venue: VenueId::new(sell),
            buy_price: dec!(1800.00),
            sell_price: dec!(1801.50),
            margin_percent: dec!(0.0833),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone(), Arc::new(LogSink)]);
        fanout.publish(&opportunity("b", "a"));
        assert_eq!(a.seen.lock().len(), 1);
        assert_eq!(b.seen.lock()[0].buy_venue.as_str(), "b");
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.publish(&opportunity("a", "b"));
        sink.publish(&opportunity("b", "a"));
        assert_eq!(sink.dropped(), 1);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.buy_venue.as_str(), "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drain_delivers_until_senders_drop() {
        let (sink, rx) = ChannelSink::new(8);
        let recorder = Arc::new(RecordingSink::default());
        let consumer = tokio::spawn(drain(rx, recorder.clone()));

        sink.publish(&opportunity("a", "b"));
        sink.publish(&opportunity("b", "a"));
        drop(sink);

        assert_eq!(consumer.await.unwrap(), 2);
        assert_eq!(recorder.seen.lock().len(), 2);
        assert_eq!(opportunity("b", "a").price_difference(), dec!(1.50));
    }
}
