use super::error::{PulseError, PulseResult};
use super::waiter::{EdgeKind, EdgeWaiter, PinLevel, WaitOutcome};
use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{AnyIOPin, Input, InterruptType, Pin, PinDriver, Pull};
use esp_idf_hal::task::notification::Notification;
use std::num::NonZeroU32;
use std::time::Instant;

/// Edge waiter backed by a GPIO interrupt and a FreeRTOS task notification.
///
/// The ISR only notifies the waiting task, so the thread sleeps inside
/// `Notification::wait` until the edge or the timeout. Pins are addressed by
/// ESP32 GPIO number (`GPIOn` in the datasheet).
///
/// Timeouts are converted to FreeRTOS ticks (10 ms at the default 100 Hz
/// tick rate), so the noise-rejection window is only accurate to about one
/// tick. Edge timestamps come from the monotonic clock and are finer.
///
/// The notification is bound to the task that creates it: construct the
/// waiter on the thread that will wait on it.
pub struct EspEdgeWaiter {
    gpio: i32,
    pin: PinDriver<'static, AnyIOPin, Input>,
    notification: Notification,
    armed: Option<EdgeKind>,
    epoch: Instant,
}

impl EspEdgeWaiter {
    pub fn new(pin: AnyIOPin, pull_up: bool) -> PulseResult<Self> {
        let gpio = pin.pin();
        let mut pin = PinDriver::input(pin).map_err(|e| PulseError::unavailable(gpio, e))?;

        pin.set_pull(if pull_up { Pull::Up } else { Pull::Floating })
            .map_err(|e| PulseError::unavailable(gpio, e))?;

        let notification = Notification::new();
        let notifier = notification.notifier();

        // Safety: the ISR only touches the notifier, which is Send + Sync
        unsafe {
            pin.subscribe(move || {
                notifier.notify_and_yield(NonZeroU32::MIN);
            })
            .map_err(|e| PulseError::unavailable(gpio, e))?;
        }

        log::info!(
            "Pulse: GPIO{} configured as input ({})",
            gpio,
            if pull_up { "pull-up" } else { "floating" }
        );

        Ok(Self {
            gpio,
            pin,
            notification,
            armed: None,
            epoch: Instant::now(),
        })
    }

    fn arm(&mut self, edge: EdgeKind) -> PulseResult<()> {
        if self.armed != Some(edge) {
            let interrupt = match edge {
                EdgeKind::Rising => InterruptType::PosEdge,
                EdgeKind::Falling => InterruptType::NegEdge,
            };
            self.pin
                .set_interrupt_type(interrupt)
                .map_err(|e| PulseError::unavailable(self.gpio, e))?;
            self.armed = Some(edge);
        }

        // Drop a notification left over from an edge nobody waited for
        let _ = self.notification.wait(0);

        // Interrupts are one-shot and must be re-enabled for every wait
        self.pin
            .enable_interrupt()
            .map_err(|e| PulseError::unavailable(self.gpio, e))
    }

    fn at_destination(&self, edge: EdgeKind) -> bool {
        PinLevel::from_high(self.pin.is_high()) == edge.destination()
    }
}

impl EdgeWaiter for EspEdgeWaiter {
    fn sample(&mut self) -> PulseResult<PinLevel> {
        Ok(PinLevel::from_high(self.pin.is_high()))
    }

    fn wait_for_edge(&mut self, edge: EdgeKind, timeout_ms: u32) -> PulseResult<WaitOutcome> {
        self.arm(edge)?;

        // An edge between the previous wait and re-arming would be missed
        // by the interrupt; the level still shows it
        if self.at_destination(edge) {
            return Ok(WaitOutcome::EdgeObserved(edge, self.now_ms()));
        }

        let ticks = TickType::new_millis(timeout_ms as u64).ticks();
        if self.notification.wait(ticks).is_some() {
            return Ok(WaitOutcome::EdgeObserved(edge, self.now_ms()));
        }

        // Edge racing the timeout: trust the pin
        if self.at_destination(edge) {
            return Ok(WaitOutcome::EdgeObserved(edge, self.now_ms()));
        }

        Ok(WaitOutcome::TimedOut)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Drop for EspEdgeWaiter {
    fn drop(&mut self) {
        // PinDriver resets the pin when dropped right after this
        if let Err(e) = self.pin.unsubscribe() {
            log::warn!("Pulse: GPIO{} unsubscribe failed: {:?}", self.gpio, e);
        }
        log::info!("🔌 Pulse: GPIO{} released", self.gpio);
    }
}
