use super::config::{Baseline, TimeoutConfig};
use super::counter::PulseCounter;
use super::error::PulseResult;
use super::waiter::{EdgeKind, EdgeWaiter, PinLevel, WaitOutcome};

/// Debouncer's belief about the settled pin level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    StableLow,
    StableHigh,
}

impl DebounceState {
    pub fn from_level(level: PinLevel) -> Self {
        match level {
            PinLevel::Low => DebounceState::StableLow,
            PinLevel::High => DebounceState::StableHigh,
        }
    }

    pub fn level(self) -> PinLevel {
        match self {
            DebounceState::StableLow => PinLevel::Low,
            DebounceState::StableHigh => PinLevel::High,
        }
    }

    /// Edge that would leave this state
    pub fn awaited_edge(self) -> EdgeKind {
        match self {
            DebounceState::StableLow => EdgeKind::Rising,
            DebounceState::StableHigh => EdgeKind::Falling,
        }
    }

    fn toggled(self) -> Self {
        match self {
            DebounceState::StableLow => DebounceState::StableHigh,
            DebounceState::StableHigh => DebounceState::StableLow,
        }
    }
}

/// Result of one debouncer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceEvent {
    /// Long wait elapsed without activity
    Idle,
    /// Edge reversed inside the noise-rejection window and was discarded
    Bounce { edge: EdgeKind, at_ms: u64 },
    /// Confirmed transition away from the baseline level
    Transition { state: DebounceState, at_ms: u64 },
    /// Confirmed return to the baseline level; `count` is the new total
    Pulse { count: u64, at_ms: u64 },
}

/// Edge-classification state machine for one sensor pin.
///
/// Each primary edge is followed by a short wait for its reversal. A
/// reversal inside the window is bounce; silence confirms the transition.
/// A full cycle is counted when the confirmed transition lands back on the
/// baseline level.
pub struct PulseDebouncer<W> {
    waiter: W,
    timeouts: TimeoutConfig,
    baseline: Baseline,
    state: DebounceState,
    counter: PulseCounter,
    // Reversal that arrived exactly on the window boundary, to be processed
    // as the next primary edge
    pending_edge_ms: Option<u64>,
}

impl<W: EdgeWaiter> PulseDebouncer<W> {
    /// Samples the pin once to pick the initial state
    pub fn new(mut waiter: W, timeouts: TimeoutConfig, baseline: Baseline) -> PulseResult<Self> {
        let level = waiter.sample()?;
        let state = DebounceState::from_level(level);
        log::debug!("Debouncer: initial level {:?} -> {:?}", level, state);

        Ok(Self {
            waiter,
            timeouts,
            baseline,
            state,
            counter: PulseCounter::new(),
            pending_edge_ms: None,
        })
    }

    pub fn with_counter(mut self, counter: PulseCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn count(&self) -> u64 {
        self.counter.current()
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    pub fn waiter(&self) -> &W {
        &self.waiter
    }

    /// Run one iteration: a long wait for the next primary edge and, if one
    /// fires, a short wait for its reversal.
    pub fn step(&mut self) -> PulseResult<DebounceEvent> {
        let edge = self.state.awaited_edge();

        let at_ms = match self.pending_edge_ms.take() {
            Some(at_ms) => at_ms,
            None => match self
                .waiter
                .wait_for_edge(edge, self.timeouts.long_timeout_ms)?
            {
                WaitOutcome::TimedOut => return Ok(DebounceEvent::Idle),
                WaitOutcome::EdgeObserved(_, at_ms) => at_ms,
            },
        };

        self.confirm(edge, at_ms)
    }

    fn confirm(&mut self, edge: EdgeKind, at_ms: u64) -> PulseResult<DebounceEvent> {
        let window = self.timeouts.short_timeout_ms;

        match self.waiter.wait_for_edge(edge.reversal(), window)? {
            WaitOutcome::EdgeObserved(_, reversed_ms)
                if reversed_ms.saturating_sub(at_ms) < window as u64 =>
            {
                log::debug!(
                    "Debouncer: {:?} at {}ms reversed after {}ms, bounce",
                    edge,
                    at_ms,
                    reversed_ms.saturating_sub(at_ms)
                );
                Ok(DebounceEvent::Bounce { edge, at_ms })
            }
            WaitOutcome::EdgeObserved(_, reversed_ms) => {
                // The window held; the reversal starts the next cycle
                self.pending_edge_ms = Some(reversed_ms);
                Ok(self.settle(at_ms))
            }
            WaitOutcome::TimedOut => Ok(self.settle(at_ms)),
        }
    }

    fn settle(&mut self, at_ms: u64) -> DebounceEvent {
        self.state = self.state.toggled();

        if self.state.level() == self.baseline.level() {
            let count = self.counter.increment();
            DebounceEvent::Pulse { count, at_ms }
        } else {
            log::debug!("Debouncer: confirmed {:?} at {}ms", self.state, at_ms);
            DebounceEvent::Transition {
                state: self.state,
                at_ms,
            }
        }
    }
}
