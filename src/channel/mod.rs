//! One sensor pipeline: edge waiter -> debouncer -> counter -> publisher.

pub mod monitor;

pub use monitor::{ChannelMonitor, ChannelSnapshot, ChannelState, PublishFailure};

use crate::config::{AppConfig, SensorConfig};
use crate::gauge::FlowGauge;
use crate::publish::{Publisher, Reading};
use crate::pulse::{
    Baseline, CancelToken, DebounceEvent, EdgeWaiter, PulseCounter, PulseDebouncer, PulseResult,
    TimeoutConfig,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

const CHANNEL_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub sensor_id: String,
    pub gpio: i32,
    pub timeouts: TimeoutConfig,
    pub baseline: Baseline,
    pub liters_per_pulse: u32,
    pub initial_count: u64,
    pub dial_offset_liters: Option<u64>,
    pub heartbeat_ms: u64,
    pub stale_after_ms: u64,
}

impl ChannelSettings {
    pub fn from_config(sensor: &SensorConfig, app: &AppConfig) -> Self {
        Self {
            sensor_id: sensor.sensor_id.to_string(),
            gpio: sensor.gpio,
            timeouts: sensor.timeouts(),
            baseline: sensor.baseline,
            liters_per_pulse: sensor.liters_per_pulse,
            initial_count: sensor.initial_count,
            dial_offset_liters: sensor.dial_offset_liters,
            heartbeat_ms: app.heartbeat_secs as u64 * 1000,
            stale_after_ms: app.stale_after_secs as u64 * 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelExit {
    Cancelled,
}

pub struct SensorChannel<W> {
    settings: ChannelSettings,
    debouncer: PulseDebouncer<W>,
    publisher: Arc<dyn Publisher>,
    monitor: Arc<ChannelMonitor>,
    gauge: FlowGauge,
    started_ms: u64,
    last_pulse_ms: u64,
    last_publish_ms: u64,
    last_published: Option<Reading>,
}

impl<W: EdgeWaiter> SensorChannel<W> {
    pub fn new(
        settings: ChannelSettings,
        waiter: W,
        publisher: Arc<dyn Publisher>,
        monitor: Arc<ChannelMonitor>,
    ) -> PulseResult<Self> {
        let debouncer = PulseDebouncer::new(waiter, settings.timeouts, settings.baseline)?
            .with_counter(PulseCounter::starting_at(settings.initial_count));
        let now = debouncer.waiter().now_ms();

        Ok(Self {
            settings,
            debouncer,
            publisher,
            monitor,
            gauge: FlowGauge::new(),
            started_ms: now,
            last_pulse_ms: now,
            last_publish_ms: now,
            last_published: None,
        })
    }

    pub fn count(&self) -> u64 {
        self.debouncer.count()
    }

    pub fn monitor(&self) -> &Arc<ChannelMonitor> {
        &self.monitor
    }

    /// Announce the channel and publish the starting total
    pub fn start(&mut self) {
        info!(
            "📟 {}: counting on GPIO{} from {} ({:?}, baseline {:?}, {} L/pulse)",
            self.settings.sensor_id,
            self.settings.gpio,
            self.count(),
            self.debouncer.state(),
            self.debouncer.baseline(),
            self.settings.liters_per_pulse
        );

        let now = self.debouncer.waiter().now_ms();
        self.gauge.update(now, self.liters());
        self.monitor.set_state(ChannelState::Idle);
        self.publish(self.reading(now));
    }

    /// Count until cancelled or the sensor fails
    pub fn run(&mut self, cancel: &CancelToken) -> PulseResult<ChannelExit> {
        self.start();

        loop {
            if cancel.is_cancelled() {
                info!(
                    "🛑 {}: stopped at {} pulses",
                    self.settings.sensor_id,
                    self.count()
                );
                self.monitor.set_state(ChannelState::Stopped);
                return Ok(ChannelExit::Cancelled);
            }

            if let Err(e) = self.step() {
                error!("❌ {}: {}", self.settings.sensor_id, e);
                self.monitor.set_state(ChannelState::Failed(e.to_string()));
                return Err(e);
            }
        }
    }

    /// One debouncer iteration plus the bookkeeping that follows it
    pub fn step(&mut self) -> PulseResult<DebounceEvent> {
        let event = self.debouncer.step()?;

        match event {
            DebounceEvent::Pulse { count, at_ms } => self.on_pulse(count, at_ms),
            DebounceEvent::Bounce { edge, at_ms } => {
                debug!(
                    "{}: bounce on {:?} at {}ms",
                    self.settings.sensor_id, edge, at_ms
                );
                self.monitor.record_bounce();
            }
            DebounceEvent::Transition { .. } | DebounceEvent::Idle => {
                let now = self.debouncer.waiter().now_ms();
                self.on_quiet(now);
            }
        }

        Ok(event)
    }

    fn liters(&self) -> u64 {
        self.count()
            .saturating_mul(self.settings.liters_per_pulse as u64)
    }

    fn reading(&self, now_ms: u64) -> Reading {
        let liters = self.liters();
        Reading {
            count: self.count(),
            liters,
            absolute_liters: self
                .settings
                .dial_offset_liters
                .map(|offset| offset.saturating_add(liters)),
            flow_mlps: self.gauge.flow_mlps(),
            uptime_ms: now_ms.saturating_sub(self.started_ms),
        }
    }

    fn on_pulse(&mut self, count: u64, at_ms: u64) {
        let liters = self.liters();
        self.last_pulse_ms = at_ms;
        self.gauge.update(at_ms, liters);
        self.monitor.record_pulse(count, liters, at_ms);
        self.monitor.record_flow(self.gauge.flow_mlps());

        info!(
            "💧 {}: pulse #{} ({} L, {} mL/s)",
            self.settings.sensor_id,
            count,
            liters,
            self.gauge.flow_mlps()
        );
        self.publish(self.reading(at_ms));
    }

    fn on_quiet(&mut self, now_ms: u64) {
        self.gauge.update(now_ms, self.liters());
        self.monitor.record_flow(self.gauge.flow_mlps());

        let silent_ms = now_ms.saturating_sub(self.last_pulse_ms);
        if silent_ms >= self.settings.stale_after_ms && self.monitor.state() != ChannelState::Stale
        {
            warn!(
                "⚠️ {}: no pulse for {}s, sensor may be disconnected",
                self.settings.sensor_id,
                silent_ms / 1000
            );
            self.monitor.set_state(ChannelState::Stale);
        }

        let reading = self.reading(now_ms);
        let changed = self
            .last_published
            .map_or(true, |last| reading.differs_from(&last));
        let due = now_ms.saturating_sub(self.last_publish_ms) >= self.settings.heartbeat_ms;

        if changed || due {
            self.publish(reading);
        }
    }

    fn publish(&mut self, reading: Reading) {
        let at_ms = self.started_ms + reading.uptime_ms;

        match self.publisher.publish(&self.settings.sensor_id, &reading) {
            Ok(()) => {
                debug!(
                    "{}: published {} pulses",
                    self.settings.sensor_id, reading.count
                );
                self.monitor.record_publish();
            }
            Err(e) => {
                warn!(
                    "⚠️ {}: publish of {} pulses failed: {}",
                    self.settings.sensor_id, reading.count, e
                );
                self.monitor.record_publish_failure(PublishFailure {
                    sensor_id: self.settings.sensor_id.clone(),
                    value: reading.count,
                    at_ms,
                    reason: e.to_string(),
                });
            }
        }

        // Failed readings are retried by the next change or heartbeat
        self.last_published = Some(reading);
        self.last_publish_ms = at_ms;
    }
}

/// Run a channel on its own thread.
///
/// The waiter is built on that thread, since interrupt notifications are
/// bound to the task that waits on them. It is dropped, releasing the pin,
/// on every exit path.
pub fn spawn<W, F>(
    settings: ChannelSettings,
    make_waiter: F,
    publisher: Arc<dyn Publisher>,
    monitor: Arc<ChannelMonitor>,
    cancel: CancelToken,
) -> std::io::Result<JoinHandle<PulseResult<ChannelExit>>>
where
    W: EdgeWaiter,
    F: FnOnce() -> PulseResult<W> + Send + 'static,
{
    std::thread::Builder::new()
        .stack_size(CHANNEL_STACK_SIZE)
        .name(format!("pulse_{}", settings.sensor_id))
        .spawn(move || {
            let sensor_id = settings.sensor_id.clone();
            let opened = make_waiter().and_then(|waiter| {
                SensorChannel::new(settings, waiter, publisher, Arc::clone(&monitor))
            });

            match opened {
                Ok(mut channel) => channel.run(&cancel),
                Err(e) => {
                    error!("❌ {}: {}", sensor_id, e);
                    monitor.set_state(ChannelState::Failed(e.to_string()));
                    Err(e)
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishError;
    use crate::pulse::{EdgeKind, PinLevel, PulseError, SimulatedEdgeWaiter};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        readings: Mutex<Vec<(String, Reading)>>,
    }

    impl RecordingPublisher {
        fn counts(&self) -> Vec<u64> {
            self.readings
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.count)
                .collect()
        }

        fn last(&self) -> Option<(String, Reading)> {
            self.readings.lock().unwrap().last().cloned()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, sensor_id: &str, reading: &Reading) -> Result<(), PublishError> {
            self.readings
                .lock()
                .unwrap()
                .push((sensor_id.to_string(), *reading));
            Ok(())
        }
    }

    #[derive(Default)]
    struct UnreachableBroker {
        calls: AtomicU32,
    }

    impl Publisher for UnreachableBroker {
        fn publish(&self, _sensor_id: &str, _reading: &Reading) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(PublishError::NotConnected)
        }
    }

    fn settings(sensor_id: &str, liters_per_pulse: u32) -> ChannelSettings {
        ChannelSettings {
            sensor_id: sensor_id.to_string(),
            gpio: 4,
            timeouts: TimeoutConfig::new(5_000, 50),
            baseline: Baseline::Low,
            liters_per_pulse,
            initial_count: 0,
            dial_offset_liters: None,
            heartbeat_ms: 3_600_000,
            stale_after_ms: 86_400_000,
        }
    }

    fn pulses(count: u64, cancel: &CancelToken) -> SimulatedEdgeWaiter {
        let mut sim = SimulatedEdgeWaiter::new(PinLevel::Low).cancel_when_exhausted(cancel.clone());
        for i in 0..count {
            sim = sim.pulse(1_000 + i * 2_000, 300, EdgeKind::Rising);
        }
        sim
    }

    #[test]
    fn every_pulse_is_published_with_the_absolute_total() {
        let cancel = CancelToken::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = Arc::new(ChannelMonitor::new("gas", 4));
        let mut channel = SensorChannel::new(
            settings("gas", 10),
            pulses(3, &cancel),
            publisher.clone(),
            monitor.clone(),
        )
        .unwrap();

        assert_eq!(channel.run(&cancel), Ok(ChannelExit::Cancelled));
        assert_eq!(channel.count(), 3);

        let mut counts = publisher.counts();
        assert_eq!(counts.first(), Some(&0));
        counts.dedup();
        assert_eq!(counts, vec![0, 1, 2, 3]);

        let (sensor_id, last) = publisher.last().unwrap();
        assert_eq!(sensor_id, "gas");
        assert_eq!(last.count, 3);
        assert_eq!(last.liters, 30);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.state, ChannelState::Stopped);
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.liters, 30);
        assert_eq!(snapshot.publish_failures, 0);
    }

    #[test]
    fn publish_failures_never_stop_counting() {
        let cancel = CancelToken::new();
        let publisher = Arc::new(UnreachableBroker::default());
        let monitor = Arc::new(ChannelMonitor::new("water", 4));
        let mut channel = SensorChannel::new(
            settings("water", 1),
            pulses(5, &cancel),
            publisher.clone(),
            monitor.clone(),
        )
        .unwrap();

        assert_eq!(channel.run(&cancel), Ok(ChannelExit::Cancelled));
        assert_eq!(channel.count(), 5);

        let snapshot = monitor.snapshot();
        let calls = publisher.calls.load(Ordering::Relaxed);
        assert_eq!(snapshot.count, 5);
        assert!(calls >= 6);
        assert_eq!(snapshot.publish_failures, calls);
        assert_eq!(snapshot.consecutive_publish_failures, calls);
        assert_eq!(snapshot.publishes, 0);

        let failure = snapshot.last_failure.unwrap();
        assert_eq!(failure.sensor_id, "water");
        assert_eq!(failure.value, 5);
        assert_eq!(failure.reason, PublishError::NotConnected.to_string());
    }

    #[test]
    fn bounces_are_counted_but_not_published_as_pulses() {
        let cancel = CancelToken::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = Arc::new(ChannelMonitor::new("water", 4));
        let sim = SimulatedEdgeWaiter::new(PinLevel::Low)
            .pulse(100, 5, EdgeKind::Rising)
            .pulse(500, 20, EdgeKind::Rising)
            .cancel_when_exhausted(cancel.clone());
        let mut channel =
            SensorChannel::new(settings("water", 1), sim, publisher.clone(), monitor.clone())
                .unwrap();

        channel.run(&cancel).unwrap();

        assert_eq!(channel.count(), 0);
        assert_eq!(monitor.snapshot().bounces, 2);
        assert_eq!(monitor.state(), ChannelState::Stopped);
        assert!(publisher.counts().iter().all(|&c| c == 0));
    }

    #[test]
    fn an_idle_sensor_is_idle_not_failed() {
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = Arc::new(ChannelMonitor::new("water", 4));
        let sim = SimulatedEdgeWaiter::new(PinLevel::Low);
        let mut channel =
            SensorChannel::new(settings("water", 1), sim, publisher, monitor.clone()).unwrap();

        channel.start();
        assert_eq!(channel.step(), Ok(DebounceEvent::Idle));
        assert_eq!(channel.count(), 0);
        assert_eq!(monitor.state(), ChannelState::Idle);
    }

    #[test]
    fn unchanged_readings_are_republished_on_the_heartbeat() {
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = Arc::new(ChannelMonitor::new("water", 4));
        let sim = SimulatedEdgeWaiter::new(PinLevel::Low);
        let mut channel = SensorChannel::new(
            ChannelSettings {
                heartbeat_ms: 10_000,
                ..settings("water", 1)
            },
            sim,
            publisher.clone(),
            monitor,
        )
        .unwrap();

        channel.start();
        for _ in 0..5 {
            channel.step().unwrap();
        }

        // Start, then at 10s and 20s
        let uptimes: Vec<u64> = publisher
            .readings
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.uptime_ms)
            .collect();
        assert_eq!(uptimes, vec![0, 10_000, 20_000]);
    }

    #[test]
    fn a_silent_sensor_turns_stale_and_recovers_on_the_next_pulse() {
        let publisher = Arc::new(RecordingPublisher::default());
        let monitor = Arc::new(ChannelMonitor::new("water", 4));
        let sim = SimulatedEdgeWaiter::new(PinLevel::Low).pulse(20_000, 300, EdgeKind::Rising);
        let mut channel = SensorChannel::new(
            ChannelSettings {
                stale_after_ms: 12_000,
                ..settings("water", 1)
            },
            sim,
            publisher,
            monitor.clone(),
        )
        .unwrap();

        channel.start();
        for _ in 0..3 {
            assert_eq!(channel.step(), Ok(DebounceEvent::Idle));
        }
        assert_eq!(monitor.state(), ChannelState::Stale);

        while channel.count() == 0 {
            channel.step().unwrap();
        }
        assert_eq!(monitor.state(), ChannelState::Counting);
    }

    #[test]
    fn dial_offset_gives_an_absolute_reading() {
        let cancel = CancelToken::new();
        let publisher = Arc::new(RecordingPublisher::default());
        let mut channel = SensorChannel::new(
            ChannelSettings {
                initial_count: 100,
                dial_offset_liters: Some(50_000),
                ..settings("water", 1)
            },
            pulses(1, &cancel),
            publisher.clone(),
            Arc::new(ChannelMonitor::new("water", 4)),
        )
        .unwrap();

        channel.run(&cancel).unwrap();

        let (_, last) = publisher.last().unwrap();
        assert_eq!(last.count, 101);
        assert_eq!(last.absolute_liters, Some(50_101));
    }

    #[test]
    fn a_lost_sensor_fails_the_channel_and_keeps_the_count() {
        let cancel = CancelToken::new();
        let monitor = Arc::new(ChannelMonitor::new("water", 4));
        // Four waits per full pulse, then the pin disappears
        let sim = pulses(3, &cancel).with_gpio(4).failing_after(8);
        let mut channel = SensorChannel::new(
            settings("water", 1),
            sim,
            Arc::new(RecordingPublisher::default()),
            monitor.clone(),
        )
        .unwrap();

        assert!(matches!(
            channel.run(&cancel),
            Err(PulseError::SensorUnavailable { gpio: 4, .. })
        ));
        assert_eq!(channel.count(), 2);
        assert!(matches!(monitor.state(), ChannelState::Failed(_)));
        assert_eq!(monitor.snapshot().count, 2);
    }

    #[test]
    fn spawned_channels_run_until_cancelled() {
        let publisher: Arc<dyn Publisher> = Arc::new(RecordingPublisher::default());
        let water = Arc::new(ChannelMonitor::new("water", 4));
        let gas = Arc::new(ChannelMonitor::new("gas", 5));

        let water_cancel = CancelToken::new();
        let sim_cancel = water_cancel.clone();
        let water_handle = spawn(
            settings("water", 1),
            move || Ok(pulses(4, &sim_cancel)),
            Arc::clone(&publisher),
            Arc::clone(&water),
            water_cancel,
        )
        .unwrap();

        let gas_cancel = CancelToken::new();
        let sim_cancel = gas_cancel.clone();
        let gas_handle = spawn(
            settings("gas", 10),
            move || {
                Ok(SimulatedEdgeWaiter::new(PinLevel::Low)
                    .pulse(0, 300, EdgeKind::Rising)
                    .pulse(1_000, 300, EdgeKind::Rising)
                    .cancel_when_exhausted(sim_cancel))
            },
            Arc::clone(&publisher),
            Arc::clone(&gas),
            gas_cancel,
        )
        .unwrap();

        assert_eq!(water_handle.join().unwrap(), Ok(ChannelExit::Cancelled));
        assert_eq!(gas_handle.join().unwrap(), Ok(ChannelExit::Cancelled));
        assert_eq!(water.snapshot().count, 4);
        assert_eq!(gas.snapshot().count, 2);
        assert_eq!(gas.snapshot().liters, 20);
        assert_eq!(gas.state(), ChannelState::Stopped);
    }

    #[test]
    fn a_pin_that_cannot_be_opened_fails_the_channel() {
        let monitor = Arc::new(ChannelMonitor::new("gas", 5));
        let handle = spawn(
            settings("gas", 10),
            || -> PulseResult<SimulatedEdgeWaiter> {
                Err(PulseError::unavailable(5, "ESP_ERR_INVALID_ARG"))
            },
            Arc::new(RecordingPublisher::default()),
            Arc::clone(&monitor),
            CancelToken::new(),
        )
        .unwrap();

        assert!(handle.join().unwrap().is_err());
        assert!(matches!(monitor.state(), ChannelState::Failed(_)));
    }
}
