//! Scripted edge source driven by a virtual clock.
//!
//! Replays `(at_ms, edge)` events without real time passing: a wait either
//! jumps the clock to the next matching edge inside its window or to the end
//! of the window. Used by the tests and for bench runs without hardware.

use super::cancel::CancelToken;
use super::error::{PulseError, PulseResult};
use super::waiter::{EdgeKind, EdgeWaiter, PinLevel, WaitOutcome};
use std::collections::VecDeque;

pub struct SimulatedEdgeWaiter {
    gpio: i32,
    level: PinLevel,
    now_ms: u64,
    events: VecDeque<(u64, EdgeKind)>,
    waits: usize,
    fail_after_waits: Option<usize>,
    cancel_when_exhausted: Option<CancelToken>,
}

impl SimulatedEdgeWaiter {
    pub fn new(initial: PinLevel) -> Self {
        Self {
            gpio: -1,
            level: initial,
            now_ms: 0,
            events: VecDeque::new(),
            waits: 0,
            fail_after_waits: None,
            cancel_when_exhausted: None,
        }
    }

    pub fn with_gpio(mut self, gpio: i32) -> Self {
        self.gpio = gpio;
        self
    }

    /// Schedule an edge. Events must be added in time order.
    pub fn edge(mut self, at_ms: u64, edge: EdgeKind) -> Self {
        self.events.push_back((at_ms, edge));
        self
    }

    /// Schedule one full pulse: the primary edge at `at_ms`, the return edge
    /// `width_ms` later.
    pub fn pulse(self, at_ms: u64, width_ms: u64, primary: EdgeKind) -> Self {
        self.edge(at_ms, primary)
            .edge(at_ms + width_ms, primary.reversal())
    }

    /// Every wait after the first `waits` calls fails as if the pin vanished
    pub fn failing_after(mut self, waits: usize) -> Self {
        self.fail_after_waits = Some(waits);
        self
    }

    /// Cancel `token` once the script is exhausted and a wait times out
    pub fn cancel_when_exhausted(mut self, token: CancelToken) -> Self {
        self.cancel_when_exhausted = Some(token);
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.events.is_empty()
    }

    fn check_failure(&mut self) -> PulseResult<()> {
        self.waits += 1;
        match self.fail_after_waits {
            Some(limit) if self.waits > limit => Err(PulseError::unavailable(
                self.gpio,
                "simulated sensor failure",
            )),
            _ => Ok(()),
        }
    }
}

impl EdgeWaiter for SimulatedEdgeWaiter {
    fn sample(&mut self) -> PulseResult<PinLevel> {
        Ok(self.level)
    }

    fn wait_for_edge(&mut self, edge: EdgeKind, timeout_ms: u32) -> PulseResult<WaitOutcome> {
        self.check_failure()?;

        let deadline = self.now_ms + timeout_ms as u64;
        while let Some(&(at_ms, kind)) = self.events.front() {
            // Edges on the boundary count as observed
            if at_ms > deadline {
                break;
            }
            self.events.pop_front();
            self.level = kind.destination();
            if kind == edge {
                self.now_ms = self.now_ms.max(at_ms);
                return Ok(WaitOutcome::EdgeObserved(kind, self.now_ms));
            }
        }

        self.now_ms = deadline;
        if self.events.is_empty() {
            if let Some(token) = &self.cancel_when_exhausted {
                token.cancel();
            }
        }
        Ok(WaitOutcome::TimedOut)
    }

    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}
