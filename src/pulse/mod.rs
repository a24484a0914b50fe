pub mod cancel;
pub mod config;
pub mod counter;
pub mod debouncer;
pub mod error;
#[cfg(target_os = "espidf")]
pub mod esp_waiter;
pub mod sim;
pub mod waiter;

pub use cancel::CancelToken;
pub use config::{Baseline, TimeoutConfig};
pub use counter::PulseCounter;
pub use debouncer::{DebounceEvent, DebounceState, PulseDebouncer};
pub use error::{PulseError, PulseResult};
#[cfg(target_os = "espidf")]
pub use esp_waiter::EspEdgeWaiter;
pub use sim::SimulatedEdgeWaiter;
pub use waiter::{EdgeKind, EdgeWaiter, PinLevel, WaitOutcome};
