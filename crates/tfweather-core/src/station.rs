// ── Weather station ──
//
// Ties the pieces together: the bus connection, the device registry, the
// light monitor and the refresh loop. Cheaply cloneable; the event pump
// task holds a clone and handles bus events one at a time.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ambient::AmbientLightMonitor;
use crate::bus::Bus;
use crate::config::StationConfig;
use crate::connection::BusConnection;
use crate::error::CoreError;
use crate::model::{BusEvent, ConnectReason};
use crate::registry::DeviceRegistry;
use crate::scheduler::RefreshScheduler;

/// The running appliance.
pub struct WeatherStation<B: Bus> {
    inner: Arc<StationInner<B>>,
}

impl<B: Bus> Clone for WeatherStation<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StationInner<B: Bus> {
    config: StationConfig,
    connection: BusConnection<B>,
    registry: Arc<DeviceRegistry<B>>,
    monitor: AmbientLightMonitor,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: Bus> WeatherStation<B> {
    /// Build the station. Does NOT connect -- call [`run()`](Self::run) or
    /// [`start()`](Self::start). Cancelling `cancel` stops everything.
    pub fn new(bus: B, config: StationConfig, cancel: CancellationToken) -> Self {
        let bus = Arc::new(bus);
        let connection = BusConnection::new(Arc::clone(&bus), config.host.clone(), config.port, config.retry_backoff);
        let registry = Arc::new(DeviceRegistry::new(bus, config.illuminance_period));
        let monitor = AmbientLightMonitor::new(config.backlight_threshold_lux);

        Self {
            inner: Arc::new(StationInner {
                config,
                connection,
                registry,
                monitor,
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> &BusConnection<B> {
        &self.inner.connection
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry<B>> {
        &self.inner.registry
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// A refresh loop over this station's registry.
    pub fn scheduler(&self) -> RefreshScheduler<B> {
        let config = &self.inner.config;
        RefreshScheduler::new(
            Arc::clone(&self.inner.registry),
            config.layout,
            config.tick_interval,
            config.slow_refresh_ticks,
        )
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the event pump, connect (retrying) and request discovery
    /// (retrying). Returns once discovery has been requested.
    pub async fn start(&self) -> Result<(), CoreError> {
        let events = self.inner.connection.bus().subscribe();
        {
            let station = self.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(event_pump(station, events)));
        }

        let cancel = &self.inner.cancel;
        self.inner.connection.connect(cancel).await?;
        self.inner.connection.request_discovery(cancel).await?;
        Ok(())
    }

    /// Start, then refresh the display until cancelled, then shut down.
    pub async fn run(&self) -> Result<(), CoreError> {
        info!(host = %self.inner.config.host, port = self.inner.config.port, "weather station starting");

        match self.start().await {
            Ok(()) => {
                let mut scheduler = self.scheduler();
                scheduler.run(&self.inner.cancel).await;
            }
            Err(CoreError::Cancelled) => info!("cancelled during startup"),
            Err(e) => {
                self.shutdown().await;
                return Err(e);
            }
        }

        self.shutdown().await;
        info!("weather station stopped");
        Ok(())
    }

    /// Cancel background work, join it, and close the bus.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handles = std::mem::take(&mut *self.inner.task_handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.connection.disconnect().await;
    }

    // ── Event handling ───────────────────────────────────────────────

    /// React to one bus event. Errors are logged, never returned.
    pub async fn handle_event(&self, event: BusEvent) {
        self.inner.connection.observe(&event);

        match event {
            BusEvent::Discovered(device) => match self.inner.registry.on_discovery(&device).await {
                Ok(Some(role)) => debug!(uid = %device.uid, %role, "role bound"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, uid = %device.uid, "device binding failed"),
            },
            BusEvent::Connected(ConnectReason::AutoReconnect) => {
                info!("bus reconnected, requesting discovery");
                self.spawn_rediscovery().await;
            }
            BusEvent::Connected(ConnectReason::Request) => {}
            BusEvent::ConnectionLost => warn!("bus connection lost, waiting for reconnect"),
            BusEvent::Illuminance { uid, raw } => self.on_illuminance(&uid, raw).await,
        }
    }

    /// Retry discovery off the pump so bus events keep flowing meanwhile.
    async fn spawn_rediscovery(&self) {
        let station = self.clone();
        let handle = tokio::spawn(async move {
            let inner = &station.inner;
            if let Err(e) = inner.connection.request_discovery(&inner.cancel).await {
                debug!(error = %e, "discovery after reconnect abandoned");
            }
        });

        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    async fn on_illuminance(&self, uid: &str, raw: u16) {
        let registry = &self.inner.registry;
        if registry.light_sensor_uid().as_deref() != Some(uid) {
            trace!(uid, "illuminance from unbound sensor");
            return;
        }
        let Some(lcd) = registry.display() else {
            return;
        };
        if let Err(e) = self.inner.monitor.on_illuminance(&lcd, raw).await {
            warn!(error = %e, uid = lcd.uid(), "backlight switch failed");
        }
    }
}

async fn event_pump<B: Bus>(station: WeatherStation<B>, mut events: broadcast::Receiver<BusEvent>) {
    let cancel = station.inner.cancel.clone();
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => station.handle_event(event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event pump lagged, some bus events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("event pump exiting");
}
