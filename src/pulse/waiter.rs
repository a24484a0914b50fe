use super::error::PulseResult;

/// Sampled digital level of a sensor pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    pub fn from_high(is_high: bool) -> Self {
        if is_high {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

impl EdgeKind {
    /// Edge that undoes this one
    pub fn reversal(self) -> Self {
        match self {
            EdgeKind::Rising => EdgeKind::Falling,
            EdgeKind::Falling => EdgeKind::Rising,
        }
    }

    /// Level the pin sits at once this edge has happened
    pub fn destination(self) -> PinLevel {
        match self {
            EdgeKind::Rising => PinLevel::High,
            EdgeKind::Falling => PinLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Awaited edge fired at the given time on the waiter's clock (ms)
    EdgeObserved(EdgeKind, u64),
    TimedOut,
}

/// Blocking edge-wait capability over a single input pin.
///
/// Implementations must block the calling thread (interrupt or epoll style)
/// rather than poll, and must report an edge that lands exactly on the
/// timeout boundary as observed.
pub trait EdgeWaiter {
    /// Read the pin level once
    fn sample(&mut self) -> PulseResult<PinLevel>;

    /// Block until `edge` occurs or `timeout_ms` elapses
    fn wait_for_edge(&mut self, edge: EdgeKind, timeout_ms: u32) -> PulseResult<WaitOutcome>;

    /// Monotonic milliseconds on the clock used for edge timestamps
    fn now_ms(&self) -> u64;
}

impl<W: EdgeWaiter + ?Sized> EdgeWaiter for Box<W> {
    fn sample(&mut self) -> PulseResult<PinLevel> {
        (**self).sample()
    }

    fn wait_for_edge(&mut self, edge: EdgeKind, timeout_ms: u32) -> PulseResult<WaitOutcome> {
        (**self).wait_for_edge(edge, timeout_ms)
    }

    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
