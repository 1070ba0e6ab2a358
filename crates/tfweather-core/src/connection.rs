// ── Bus connection lifecycle ──
//
// Wraps a `Bus` with the station's retry policy: connection and discovery
// requests are retried forever with a fixed backoff until they succeed or
// the station is cancelled. State is published on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::error::CoreError;
use crate::model::{BusEvent, ConnectionState};

/// Owns the bus link for the lifetime of the process.
pub struct BusConnection<B: Bus> {
    bus: Arc<B>,
    host: String,
    port: u16,
    retry_backoff: Duration,
    state: watch::Sender<ConnectionState>,
}

impl<B: Bus> BusConnection<B> {
    pub fn new(bus: Arc<B>, host: impl Into<String>, port: u16, retry_backoff: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            bus,
            host: host.into(),
            port,
            retry_backoff,
            state,
        }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, retrying until it works.
    ///
    /// Only cancellation ends the loop early, with [`CoreError::Cancelled`].
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        let mut attempt: u32 = 0;
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            match self.bus.connect(&self.host, self.port).await {
                Ok(()) => {
                    self.state.send_replace(ConnectionState::Connected);
                    info!(host = %self.host, port = self.port, "connected to bus");
                    return Ok(());
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, attempt, host = %self.host, port = self.port, "bus connection failed, retrying");
                }
            }

            if !self.backoff(cancel).await {
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(CoreError::Cancelled);
            }
        }
    }

    /// Ask all devices to announce themselves, retrying until it works.
    ///
    /// Requests are only issued while connected; otherwise this waits for
    /// the link to come back.
    pub async fn request_discovery(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        let mut state = self.state.subscribe();
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
                result = state.wait_for(|s| *s == ConnectionState::Connected) => {
                    if result.is_err() {
                        return Err(CoreError::Internal("connection state channel closed".into()));
                    }
                }
            }

            match self.bus.request_discovery().await {
                Ok(()) => {
                    debug!("discovery requested");
                    return Ok(());
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, attempt, "discovery request failed, retrying");
                }
            }

            if !self.backoff(cancel).await {
                return Err(CoreError::Cancelled);
            }
        }
    }

    /// Track link changes reported by the bus.
    pub fn observe(&self, event: &BusEvent) {
        match event {
            BusEvent::Connected(_) => {
                self.state.send_replace(ConnectionState::Connected);
            }
            BusEvent::ConnectionLost => {
                self.state.send_replace(ConnectionState::Connecting);
            }
            BusEvent::Discovered(_) | BusEvent::Illuminance { .. } => {}
        }
    }

    /// Close the link. Only called on shutdown.
    pub async fn disconnect(&self) {
        self.bus.disconnect().await;
        self.state.send_replace(ConnectionState::Disconnected);
        debug!("bus disconnected");
    }

    /// Sleep for the retry backoff. Returns `false` if cancelled first.
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.retry_backoff) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockBus;

    const BACKOFF: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn connect_retries_until_bus_accepts() {
        let bus = Arc::new(MockBus::new());
        bus.fail_connects(3);
        let conn = BusConnection::new(Arc::clone(&bus), "localhost", 4223, BACKOFF);
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        conn.connect(&cancel).await.unwrap();

        assert_eq!(bus.connect_attempts(), 4);
        assert_eq!(started.elapsed(), BACKOFF * 3);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_stops_on_cancel() {
        let bus = Arc::new(MockBus::new());
        bus.fail_connects(u32::MAX);
        let conn = BusConnection::new(Arc::clone(&bus), "localhost", 4223, BACKOFF);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let result = conn.connect(&cancel).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(bus.connect_attempts(), 3);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_retries_on_failure() {
        let bus = Arc::new(MockBus::new());
        bus.fail_discoveries(2);
        let conn = BusConnection::new(Arc::clone(&bus), "localhost", 4223, BACKOFF);
        let cancel = CancellationToken::new();

        conn.connect(&cancel).await.unwrap();
        conn.request_discovery(&cancel).await.unwrap();

        assert_eq!(bus.discovery_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_waits_for_connection() {
        let bus = Arc::new(MockBus::new());
        let conn = Arc::new(BusConnection::new(Arc::clone(&bus), "localhost", 4223, BACKOFF));
        let cancel = CancellationToken::new();

        let waiter = {
            let conn = Arc::clone(&conn);
            let cancel = cancel.clone();
            tokio::spawn(async move { conn.request_discovery(&cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(bus.discovery_attempts(), 0, "no discovery while disconnected");

        conn.observe(&BusEvent::Connected(crate::model::ConnectReason::AutoReconnect));
        waiter.await.unwrap().unwrap();
        assert_eq!(bus.discovery_attempts(), 1);
    }

    #[tokio::test]
    async fn connection_lost_moves_back_to_connecting() {
        let bus = Arc::new(MockBus::new());
        let conn = BusConnection::new(Arc::clone(&bus), "localhost", 4223, BACKOFF);
        let mut state = conn.watch_state();
        conn.connect(&CancellationToken::new()).await.unwrap();
        assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);

        conn.observe(&BusEvent::ConnectionLost);
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow_and_update(), ConnectionState::Connecting);

        conn.disconnect().await;
        assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
        assert!(bus.disconnected());
    }
}
