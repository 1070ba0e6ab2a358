// ── Refresh scheduler ──
//
// The foreground loop. Every tick writes date and time when a display is
// bound; every `slow_refresh_ticks` ticks it also reads the barometer and
// humidity sensor. Each field fails on its own: errors are logged and the
// loop keeps going until cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{BarometerDevice, Bus, HumidityDevice};
use crate::config::DisplayLayout;
use crate::display::DisplayController;
use crate::error::CoreError;
use crate::format;
use crate::model::{Field, SchedulerState};
use crate::registry::DeviceRegistry;

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub written: Vec<Field>,
    pub failed: Vec<Field>,
    /// The tick reached the slow-refresh threshold and reset the counter.
    pub slow_refresh: bool,
}

pub struct RefreshScheduler<B: Bus> {
    registry: Arc<DeviceRegistry<B>>,
    layout: DisplayLayout,
    tick_interval: Duration,
    slow_refresh_ticks: u32,
    counter: u32,
    state: watch::Sender<SchedulerState>,
}

impl<B: Bus> RefreshScheduler<B> {
    pub fn new(
        registry: Arc<DeviceRegistry<B>>,
        layout: DisplayLayout,
        tick_interval: Duration,
        slow_refresh_ticks: u32,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::AwaitingDisplay);
        Self {
            registry,
            layout,
            tick_interval,
            slow_refresh_ticks: slow_refresh_ticks.max(1),
            counter: 0,
            state,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Ticks since the last slow refresh.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Tick at the configured interval until cancelled. A late tick is
    /// not made up for.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick(Local::now().naive_local()).await;
                }
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        debug!("refresh loop stopped");
    }

    /// Refresh the display once for wall-clock time `now`.
    pub async fn tick(&mut self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        let Some(display) = self.registry.display() else {
            self.state.send_if_modified(|state| replace(state, SchedulerState::AwaitingDisplay));
            return report;
        };
        self.state.send_if_modified(|state| replace(state, SchedulerState::Running));

        let date = format::date_line(now.date());
        record(&mut report, Field::Date, display.write_line(self.layout.date_row, 0, &date).await);
        let time = format::time_line(now.time());
        record(&mut report, Field::Time, display.write_line(self.layout.time_row, 0, &time).await);

        self.counter += 1;
        if self.counter >= self.slow_refresh_ticks {
            self.refresh_slow_fields(&display, &mut report).await;
            self.counter = 0;
            report.slow_refresh = true;
        }

        report
    }

    async fn refresh_slow_fields(&self, display: &DisplayController<B::Display>, report: &mut TickReport) {
        if let Some(barometer) = self.registry.barometer() {
            let result = async {
                let raw = barometer.device.chip_temperature().await?;
                display
                    .write_line(self.layout.temperature_row, 0, &format::temperature_line(raw))
                    .await
            }
            .await;
            record(report, Field::Temperature, result);
        }

        if let Some(humidity) = self.registry.humidity_sensor() {
            let result = async {
                let raw = humidity.device.humidity().await?;
                display
                    .write_line(self.layout.humidity_row, 0, &format::humidity_line(raw))
                    .await
            }
            .await;
            record(report, Field::Humidity, result);
        }
    }
}

fn record(report: &mut TickReport, field: Field, result: Result<(), CoreError>) {
    match result {
        Ok(()) => report.written.push(field),
        Err(e) => {
            warn!(error = %e, %field, "could not refresh field");
            report.failed.push(field);
        }
    }
}

/// Store `next`, reporting whether it differed.
fn replace(state: &mut SchedulerState, next: SchedulerState) -> bool {
    if *state == next {
        return false;
    }
    *state = next;
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::{Call, MockBus};

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    async fn setup(bind: &[&str]) -> (Arc<MockBus>, RefreshScheduler<MockBus>) {
        let bus = Arc::new(MockBus::new());
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&bus), Duration::from_secs(1)));
        for role in bind {
            match *role {
                "display" => registry.bind_display("oRX").await.unwrap(),
                "barometer" => registry.bind_barometer("bAr").unwrap(),
                "humidity" => registry.bind_humidity_sensor("hUm").unwrap(),
                other => panic!("unknown role {other}"),
            }
        }
        bus.clear_calls();
        let scheduler = RefreshScheduler::new(registry, DisplayLayout::default(), Duration::from_secs(1), 10);
        (bus, scheduler)
    }

    fn slow_reads(bus: &MockBus) -> usize {
        bus.count(|call| matches!(call, Call::ChipTemperature { .. } | Call::Humidity { .. }))
    }

    // ── Tick behaviour ───────────────────────────────────────────────

    #[tokio::test]
    async fn no_display_means_no_op_tick() {
        let (bus, mut scheduler) = setup(&["barometer", "humidity"]).await;

        for _ in 0..20 {
            let report = scheduler.tick(noon()).await;
            assert_eq!(report, TickReport::default());
        }

        assert!(bus.calls().is_empty());
        assert_eq!(scheduler.counter(), 0);
        assert_eq!(scheduler.state(), SchedulerState::AwaitingDisplay);
    }

    #[tokio::test]
    async fn fast_fields_every_tick() {
        let (bus, mut scheduler) = setup(&["display"]).await;

        let report = scheduler.tick(noon()).await;

        assert_eq!(report.written, vec![Field::Date, Field::Time]);
        assert_eq!(
            bus.lines_written(),
            vec![
                (0, "Date:     07.03.2024".to_owned()),
                (1, "Time:       12:00:00".to_owned()),
            ]
        );
        assert_eq!(scheduler.state(), SchedulerState::Running);
    }

    #[tokio::test]
    async fn slow_fields_after_exactly_ten_ticks() {
        let (bus, mut scheduler) = setup(&["display", "barometer", "humidity"]).await;

        for _ in 0..9 {
            scheduler.tick(noon()).await;
        }
        assert_eq!(slow_reads(&bus), 0);

        let report = scheduler.tick(noon()).await;
        assert!(report.slow_refresh);
        assert_eq!(slow_reads(&bus), 2);
        assert_eq!(scheduler.counter(), 0);

        let lines = bus.lines_written();
        assert!(lines.contains(&(2, "Temp:       21.50 °C".to_owned())));
        assert!(lines.contains(&(3, "Humidity:    45.50 %".to_owned())));
    }

    #[tokio::test]
    async fn slow_refresh_repeats_every_ten_ticks() {
        let (bus, mut scheduler) = setup(&["display", "humidity"]).await;

        for _ in 0..30 {
            scheduler.tick(noon()).await;
        }

        assert_eq!(bus.count(|call| matches!(call, Call::Humidity { .. })), 3);
    }

    #[tokio::test]
    async fn failing_barometer_does_not_stop_other_fields() {
        let (bus, mut scheduler) = setup(&["display", "barometer", "humidity"]).await;
        bus.fail_device("bAr");

        let mut reports = Vec::new();
        for _ in 0..10 {
            reports.push(scheduler.tick(noon()).await);
        }

        let last = reports.last().unwrap();
        assert_eq!(last.failed, vec![Field::Temperature]);
        assert_eq!(last.written, vec![Field::Date, Field::Time, Field::Humidity]);
        assert_eq!(bus.count(|call| matches!(call, Call::WriteLine { line: 1, .. })), 10);
        assert_eq!(bus.count(|call| matches!(call, Call::WriteLine { line: 3, .. })), 1);
        assert_eq!(bus.count(|call| matches!(call, Call::WriteLine { line: 2, .. })), 0);
    }

    #[tokio::test]
    async fn absent_sensors_are_skipped() {
        let (bus, mut scheduler) = setup(&["display"]).await;

        for _ in 0..10 {
            scheduler.tick(noon()).await;
        }

        assert_eq!(slow_reads(&bus), 0);
        assert_eq!(bus.lines_written().len(), 20);
    }

    #[tokio::test]
    async fn failing_display_write_is_reported_not_fatal() {
        let (bus, mut scheduler) = setup(&["display"]).await;
        bus.fail_device("oRX");

        let report = scheduler.tick(noon()).await;

        assert_eq!(report.failed, vec![Field::Date, Field::Time]);
        assert_eq!(scheduler.counter(), 1);
    }

    #[tokio::test]
    async fn slow_fields_render_current_readings() {
        let (bus, mut scheduler) = setup(&["display", "barometer", "humidity"]).await;
        bus.set_readings(1000, -512);

        for _ in 0..10 {
            scheduler.tick(noon()).await;
        }

        let lines = bus.lines_written();
        assert!(lines.contains(&(2, "Temp:       -5.12 °C".to_owned())));
        assert!(lines.contains(&(3, "Humidity:   100.00 %".to_owned())));
    }

    // ── Run loop ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_cancelled() {
        let (bus, mut scheduler) = setup(&["display"]).await;
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        scheduler.run(&cancel).await;

        // Ticks at 0s, 1s and 2s.
        assert_eq!(bus.count(|call| matches!(call, Call::WriteLine { line: 1, .. })), 3);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_published_to_watchers() {
        let bus = Arc::new(MockBus::new());
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&bus), Duration::from_secs(1)));
        let mut scheduler =
            RefreshScheduler::new(Arc::clone(&registry), DisplayLayout::default(), Duration::from_secs(1), 10);
        let mut state = scheduler.watch_state();
        assert_eq!(*state.borrow_and_update(), SchedulerState::AwaitingDisplay);

        scheduler.tick(noon()).await;
        assert!(!state.has_changed().unwrap());

        registry.bind_display("oRX").await.unwrap();
        scheduler.tick(noon()).await;
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow_and_update(), SchedulerState::Running);

        let cancel = CancellationToken::new();
        cancel.cancel();
        scheduler.run(&cancel).await;
        assert_eq!(*state.borrow_and_update(), SchedulerState::Stopped);
    }
}
