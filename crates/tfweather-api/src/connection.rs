//! brickd TCP connection with auto-reconnect.
//!
//! Owns the socket to brickd, matches responses to outstanding requests,
//! and publishes callbacks through a [`tokio::sync::broadcast`] channel.
//! When the socket drops, a background loop reconnects with exponential
//! backoff and announces [`ConnectReason::AutoReconnect`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tfweather_api::{ConnectionConfig, Event, IpConnection};
//!
//! let conn = IpConnection::new(ConnectionConfig::default());
//! let mut events = conn.subscribe();
//! conn.connect("localhost", 4223).await?;
//! conn.enumerate().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let Event::Enumerate(device) = event {
//!         println!("{} ({})", device.uid, device.device_identifier);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::{Buf, Bytes};
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bricklet::{ambient_light, device_identifier};
use crate::error::Error;
use crate::event::{ConnectReason, DisconnectReason, Event};
use crate::packet::{
    BROADCAST_UID, CALLBACK_ENUMERATE, EnumerateCallback, FUNCTION_ENUMERATE, HEADER_LEN, Header,
    encode_packet,
};
use crate::uid::Uid;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 500ms.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 10s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a request waits for its response. Default: 2.5s.
    pub request_timeout: Duration,
    /// Reconnect automatically when the socket drops.
    pub auto_reconnect: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2500),
            auto_reconnect: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── IpConnection ─────────────────────────────────────────────────────

/// Responses are matched on (uid, function id, sequence number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ResponseKey {
    uid: u32,
    function_id: u8,
    sequence: u8,
}

impl From<&Header> for ResponseKey {
    fn from(header: &Header) -> Self {
        Self {
            uid: header.uid,
            function_id: header.function_id,
            sequence: header.sequence,
        }
    }
}

/// A device handle registered for callback decoding.
#[derive(Debug, Clone)]
struct RegisteredDevice {
    uid: Uid,
    identifier: u16,
}

type PendingResponse = oneshot::Sender<Result<(Header, Bytes), Error>>;

/// Handle to a brickd connection.
///
/// Cheaply cloneable via `Arc<Inner>`; device handles keep a clone.
#[derive(Clone)]
pub struct IpConnection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: DashMap<ResponseKey, PendingResponse>,
    devices: DashMap<u32, RegisteredDevice>,
    sequence: AtomicU8,
    events: broadcast::Sender<Event>,
    /// Child token for the current connection, replaced on connect.
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IpConnection {
    /// Create a connection handle. Does NOT connect -- call
    /// [`connect()`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                writer: Mutex::new(None),
                pending: DashMap::new(),
                devices: DashMap::new(),
                sequence: AtomicU8::new(0),
                events,
                cancel: Mutex::new(CancellationToken::new()),
                task: Mutex::new(None),
            }),
        }
    }

    /// Get a new receiver for connection events.
    ///
    /// Subscribe before [`connect()`](Self::connect) to observe the
    /// initial [`ConnectReason::Request`].
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.writer.lock().await.is_some()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open the socket and spawn the reader/reconnect loop.
    ///
    /// A single attempt: callers own the retry policy for the initial
    /// connection. Once up, drops are handled in the background.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), Error> {
        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(Error::AlreadyConnected);
        }

        let addr = format!("{host}:{port}");
        tracing::info!(addr = %addr, "connecting to brickd");
        let (read, write) = open_stream(&addr).await?.into_split();
        *self.inner.writer.lock().await = Some(write);

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().await = cancel.clone();

        // Announced before the loop exists so a drop is always reported after it.
        let _ = self.inner.events.send(Event::Connected(ConnectReason::Request));
        tracing::info!("connected to brickd");

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(connection_loop(inner, addr, read, cancel)));
        Ok(())
    }

    /// Close the socket and stop the background loop.
    pub async fn disconnect(&self) {
        self.inner.cancel.lock().await.cancel();
        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        fail_pending(&self.inner);
        let _ = self.inner.events.send(Event::Disconnected(DisconnectReason::Request));
        tracing::debug!("disconnected from brickd");
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Ask every device on the bus to announce itself.
    ///
    /// Answers arrive asynchronously as [`Event::Enumerate`].
    pub async fn enumerate(&self) -> Result<(), Error> {
        let header = Header::request(BROADCAST_UID, FUNCTION_ENUMERATE, self.next_sequence(), false, 0)?;
        self.send(&header, &[]).await
    }

    /// Send a request to a device and wait for its response payload.
    pub(crate) async fn request(&self, uid: &Uid, function_id: u8, payload: &[u8]) -> Result<Bytes, Error> {
        let header = Header::request(uid.wire(), function_id, self.next_sequence(), true, payload.len())?;
        let key = ResponseKey::from(&header);

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(key, tx);

        if let Err(e) = self.send(&header, payload).await {
            self.inner.pending.remove(&key);
            return Err(e);
        }

        let timeout = self.inner.config.request_timeout;
        let (response, body) = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result?,
            // Sender dropped: the link went down while we were waiting.
            Ok(Err(_)) => return Err(Error::NotConnected),
            Err(_) => {
                self.inner.pending.remove(&key);
                return Err(Error::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        match response.error_code {
            0 => Ok(body),
            1 => Err(Error::InvalidParameter {
                uid: uid.to_string(),
                function_id,
            }),
            2 => Err(Error::FunctionNotSupported {
                uid: uid.to_string(),
                function_id,
            }),
            code => Err(Error::DeviceError {
                uid: uid.to_string(),
                code,
            }),
        }
    }

    /// Remember a device so its callbacks can be decoded.
    pub(crate) fn register_device(&self, uid: &Uid, identifier: u16) {
        self.inner.devices.insert(
            uid.wire(),
            RegisteredDevice {
                uid: uid.clone(),
                identifier,
            },
        );
    }

    async fn send(&self, header: &Header, payload: &[u8]) -> Result<(), Error> {
        let packet = encode_packet(header, payload);
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        writer.write_all(&packet).await?;
        Ok(())
    }

    /// Sequence numbers cycle through 1..=15; 0 is reserved for callbacks.
    fn next_sequence(&self) -> u8 {
        let previous = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        previous % 15 + 1
    }
}

async fn open_stream(addr: &str) -> Result<TcpStream, Error> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Resolve every outstanding request with [`Error::NotConnected`].
fn fail_pending(inner: &Inner) {
    let keys: Vec<ResponseKey> = inner.pending.iter().map(|entry| *entry.key()).collect();
    for key in keys {
        if let Some((_, tx)) = inner.pending.remove(&key) {
            let _ = tx.send(Err(Error::NotConnected));
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: read → on drop, backoff → reconnect → read.
async fn connection_loop(inner: Arc<Inner>, addr: String, mut read: OwnedReadHalf, cancel: CancellationToken) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = read_packets(&inner, &mut read) => result,
        };

        inner.writer.lock().await.take();
        fail_pending(&inner);

        let reason = match result {
            Ok(()) => {
                tracing::info!("brickd closed the connection");
                DisconnectReason::Shutdown
            }
            Err(e) => {
                tracing::warn!(error = %e, "brickd connection lost");
                DisconnectReason::Error
            }
        };
        let _ = inner.events.send(Event::Disconnected(reason));

        if !inner.config.auto_reconnect {
            break;
        }

        match reconnect(&inner, &addr, &cancel).await {
            Some(new_read) => {
                read = new_read;
                tracing::info!("reconnected to brickd");
                let _ = inner.events.send(Event::Connected(ConnectReason::AutoReconnect));
            }
            None => break,
        }
    }

    tracing::debug!("brickd connection loop exiting");
}

/// Retry with backoff until a socket opens or the connection is
/// cancelled. There is no attempt limit.
async fn reconnect(inner: &Inner, addr: &str, cancel: &CancellationToken) -> Option<OwnedReadHalf> {
    let reconnect = &inner.config.reconnect;
    let mut attempt: u32 = 0;

    loop {
        let delay = calculate_backoff(attempt, reconnect);
        tracing::debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        match open_stream(addr).await {
            Ok(stream) => {
                let (read, write) = stream.into_split();
                *inner.writer.lock().await = Some(write);
                return Some(read);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "reconnect attempt failed");
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

// ── Reading and dispatch ─────────────────────────────────────────────

/// Read packets until the peer closes (`Ok`) or the stream breaks (`Err`).
async fn read_packets(inner: &Inner, read: &mut OwnedReadHalf) -> Result<(), Error> {
    let mut raw_header = [0u8; HEADER_LEN];
    loop {
        match read.read_exact(&mut raw_header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(Error::Io(e)),
        }
        let header = Header::decode(&raw_header)?;

        let mut payload = vec![0u8; header.payload_len()];
        read.read_exact(&mut payload).await?;

        dispatch(inner, &header, Bytes::from(payload));
    }
}

fn dispatch(inner: &Inner, header: &Header, payload: Bytes) {
    if header.is_callback() {
        dispatch_callback(inner, header, &payload);
        return;
    }

    let key = ResponseKey::from(header);
    match inner.pending.remove(&key) {
        Some((_, tx)) => {
            let _ = tx.send(Ok((*header, payload)));
        }
        None => {
            tracing::trace!(uid = header.uid, function_id = header.function_id, "unmatched response");
        }
    }
}

fn dispatch_callback(inner: &Inner, header: &Header, payload: &[u8]) {
    if header.function_id == CALLBACK_ENUMERATE {
        match EnumerateCallback::decode(payload) {
            // Ignore send errors -- just means no active subscribers right now
            Ok(device) => {
                let _ = inner.events.send(Event::Enumerate(device));
            }
            Err(e) => tracing::debug!(error = %e, "failed to decode enumerate callback"),
        }
        return;
    }

    let Some(device) = inner.devices.get(&header.uid) else {
        tracing::trace!(uid = header.uid, function_id = header.function_id, "callback from unknown device");
        return;
    };

    match (device.identifier, header.function_id) {
        (device_identifier::AMBIENT_LIGHT, ambient_light::CALLBACK_ILLUMINANCE) if payload.len() >= 2 => {
            let illuminance = (&payload[..2]).get_u16_le();
            let _ = inner.events.send(Event::Illuminance {
                uid: device.uid.to_string(),
                illuminance,
            });
        }
        (identifier, function_id) => {
            tracing::trace!(uid = %device.uid, identifier, function_id, "ignoring callback");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25%, seeded from the attempt number.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
