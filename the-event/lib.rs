//! Timing primitives for the replay engine.
//!
//! Everything here is driven by an explicit [`Clock`] so that the scheduling
//! logic can be exercised deterministically with a [`ManualClock`] in tests
//! and with tokio's clock at runtime.

pub mod channel;
pub mod clock;
pub mod throttle;
pub mod timer;

pub use channel::{
  send_blocking,
  try_send,
};
pub use clock::{
  Clock,
  ManualClock,
  SystemClock,
  TokioClock,
};
pub use throttle::{
  Throttle,
  ThrottleRequest,
};
pub use timer::{
  Fired,
  TimerId,
  TimerQueue,
};
