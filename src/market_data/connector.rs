//! One long-lived websocket session per venue.
//!
//! The connector owns all I/O: connect, subscribe, read, keepalive replies,
//! idle detection and reconnection. Decoding is delegated to the venue's
//! [`VenueAdapter`]; accepted quotes go to a [`PriceUpdateHandler`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::engine::stats::Statistics;
use crate::error::ConnectionError;
use crate::market_data::adapters::{VenueAdapter, VenueMessage, WireFrame};
use crate::market_data::heartbeat::IdleWatchdog;
use crate::market_data::types::{Quote, VenueId};

/// Receives every quote a connector accepts. Called on the connector's task.
pub trait PriceUpdateHandler: Send + Sync {
    fn on_quote(&self, quote: Quote);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Subscribed,
    Closing,
    Reconnecting,
}

#[derive(Debug)]
struct Lifecycle {
    state: ConnectionState,
    reconnect_pending: bool,
    shut_down: bool,
}

/// Connection state plus the reconnect latch.
///
/// Several failure signals can fire for the same dead socket (read error,
/// close frame, idle timeout); only the first one schedules a reconnect.
/// After `shutdown` nothing is ever scheduled again.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    inner: Mutex<Lifecycle>,
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Lifecycle {
                state: ConnectionState::Disconnected,
                reconnect_pending: false,
                shut_down: false,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Open | ConnectionState::Subscribed)
    }

    /// Starts a connection attempt. Clears any pending reconnect.
    /// Returns false once shut down.
    pub fn begin_connect(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return false;
        }
        inner.reconnect_pending = false;
        inner.state = ConnectionState::Connecting;
        true
    }

    pub fn transition(&self, to: ConnectionState) {
        let mut inner = self.inner.lock();
        if inner.shut_down && to != ConnectionState::Disconnected {
            return;
        }
        inner.state = to;
    }

    /// Returns true only for the first call per failed connection.
    pub fn schedule_reconnect(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.shut_down || inner.reconnect_pending {
            return false;
        }
        inner.reconnect_pending = true;
        inner.state = ConnectionState::Reconnecting;
        true
    }

    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shut_down = true;
        inner.reconnect_pending = false;
        inner.state = ConnectionState::Closing;
    }

    fn finish(&self) {
        self.inner.lock().state = ConnectionState::Disconnected;
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    /// Fixed delay between a failure and the next connect attempt.
    pub reconnect_delay: Duration,
    /// Maximum inbound silence before the session is dropped.
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(5_000),
            idle_timeout: Duration::from_millis(60_000),
            connect_timeout: Duration::from_millis(10_000),
        }
    }
}

pub struct ExchangeConnector {
    adapter: Arc<dyn VenueAdapter>,
    settings: ConnectorSettings,
    handler: Arc<dyn PriceUpdateHandler>,
    stats: Arc<Statistics>,
    lifecycle: Arc<ConnectionLifecycle>,
}

impl ExchangeConnector {
    pub fn new(
        adapter: Arc<dyn VenueAdapter>,
        settings: ConnectorSettings,
        handler: Arc<dyn PriceUpdateHandler>,
        stats: Arc<Statistics>,
    ) -> Self {
        Self::with_lifecycle(adapter, settings, handler, stats, Arc::new(ConnectionLifecycle::new()))
    }

    /// Reports into an existing lifecycle, so a restarted connector keeps
    /// the handle its observers already hold.
    pub fn with_lifecycle(
        adapter: Arc<dyn VenueAdapter>,
        settings: ConnectorSettings,
        handler: Arc<dyn PriceUpdateHandler>,
        stats: Arc<Statistics>,
        lifecycle: Arc<ConnectionLifecycle>,
    ) -> Self {
        Self { adapter, settings, handler, stats, lifecycle }
    }

    pub fn venue(&self) -> &VenueId {
        self.adapter.venue()
    }

    /// Shared handle on this connector's state, usable after `run` takes `self`.
    pub fn lifecycle(&self) -> Arc<ConnectionLifecycle> {
        self.lifecycle.clone()
    }

    /// Connect-read-reconnect loop. Returns only after `cancel` fires.
    #[instrument(name = "connector", skip_all, fields(venue = %self.adapter.venue()))]
    pub async fn run(self, cancel: CancellationToken) {
        while !cancel.is_cancelled() && self.lifecycle.begin_connect() {
            match self.session(&cancel).await {
                Ok(()) => break,
                Err(e) => warn!(error = %e, "connection lost"),
            }
            if cancel.is_cancelled() || !self.lifecycle.schedule_reconnect() {
                break;
            }
            self.stats.record_reconnect();
            info!(delay_ms = self.settings.reconnect_delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }
        self.lifecycle.shutdown();
        self.lifecycle.finish();
        info!("connector stopped");
    }

    // Ok(()) means a clean, requested shutdown; every failure is an Err.
    async fn session(&self, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        let endpoint = self.adapter.endpoint().as_str();
        debug!(%endpoint, "connecting");
        let connect = tokio::time::timeout(self.settings.connect_timeout, connect_async(endpoint));
        let (ws, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            res = connect => res.map_err(|_| ConnectionError::ConnectTimeout(self.settings.connect_timeout))??,
        };
        self.lifecycle.transition(ConnectionState::Open);
        info!(%endpoint, "connected");

        let (mut write, mut read) = ws.split();
        for frame in self.adapter.subscribe_frames() {
            debug!(%frame, "subscribing");
            write.send(Message::Text(frame)).await?;
        }
        self.lifecycle.transition(ConnectionState::Subscribed);

        let mut watchdog = IdleWatchdog::new(self.settings.idle_timeout, Instant::now());
        loop {
            let remaining = watchdog.remaining(Instant::now());
            let next = tokio::select! {
                () = cancel.cancelled() => {
                    self.lifecycle.shutdown();
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not sent");
                    }
                    return Ok(());
                }
                next = tokio::time::timeout(remaining, read.next()) => next,
            };

            let msg = match next {
                Err(_) => return Err(ConnectionError::HeartbeatTimeout(watchdog.idle_timeout())),
                Ok(None) => return Err(ConnectionError::StreamEnded),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(msg))) => msg,
            };
            let now = Instant::now();
            watchdog.touch(now);

            match msg {
                Message::Text(text) => self.dispatch(WireFrame::Text(&text), now, &mut write).await?,
                Message::Binary(bytes) => self.dispatch(WireFrame::Binary(&bytes), now, &mut write).await?,
                // tungstenite queues the pong itself
                Message::Ping(_) => trace!("transport ping"),
                Message::Pong(_) => trace!("transport pong"),
                Message::Close(frame) => {
                    let reason = frame.map(|f| f.reason.into_owned()).unwrap_or_default();
                    return Err(ConnectionError::ClosedByRemote { reason });
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn dispatch<W>(&self, frame: WireFrame<'_>, now: Instant, write: &mut W) -> Result<(), ConnectionError>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match self.adapter.decode(frame, now) {
            Ok(VenueMessage::Quote(quote)) => {
                self.stats.record_quote();
                self.handler.on_quote(quote);
            }
            Ok(VenueMessage::Heartbeat { reply }) => {
                trace!(%reply, "keepalive");
                write.send(Message::Text(reply)).await?;
            }
            Ok(VenueMessage::Control { detail }) => debug!(%detail, "control frame"),
            Err(e) => {
                self.stats.record_decode_error();
                warn!(error = %e, "dropping undecodable frame");
            }
        }
        Ok(())
    }
}
