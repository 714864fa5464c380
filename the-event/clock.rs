use std::{
  fmt,
  sync::{
    Arc,
    atomic::{
      AtomicU64,
      Ordering,
    },
  },
  time::Duration,
};

/// Monotonic wall clock, measured from an arbitrary per-clock origin.
pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> Duration;
}

/// `std::time::Instant` based clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
  origin: std::time::Instant,
}

impl SystemClock {
  pub fn new() -> Self {
    Self {
      origin: std::time::Instant::now(),
    }
  }
}

impl Default for SystemClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for SystemClock {
  fn now(&self) -> Duration {
    self.origin.elapsed()
  }
}

/// Clock backed by `tokio::time`, so it follows the runtime's paused time
/// in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
  origin: tokio::time::Instant,
}

impl TokioClock {
  pub fn new() -> Self {
    Self {
      origin: tokio::time::Instant::now(),
    }
  }

  /// Converts a clock reading back into a tokio deadline.
  pub fn instant_at(&self, at: Duration) -> tokio::time::Instant {
    self.origin + at
  }
}

impl Default for TokioClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for TokioClock {
  fn now(&self) -> Duration {
    self.origin.elapsed()
  }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
  nanos: Arc<AtomicU64>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn advance(&self, by: Duration) {
    self.nanos.fetch_add(as_nanos(by), Ordering::SeqCst);
  }

  pub fn set(&self, to: Duration) {
    self.nanos.store(as_nanos(to), Ordering::SeqCst);
  }
}

fn as_nanos(d: Duration) -> u64 {
  u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl Clock for ManualClock {
  fn now(&self) -> Duration {
    Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
  }
}

impl fmt::Debug for ManualClock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualClock")
      .field("now", &self.now())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_clock_is_shared_between_clones() {
    let clock = ManualClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_millis(40));
    other.advance(Duration::from_millis(2));
    assert_eq!(clock.now(), Duration::from_millis(42));

    other.set(Duration::from_secs(1));
    assert_eq!(clock.now(), Duration::from_secs(1));
  }

  #[tokio::test(start_paused = true)]
  async fn tokio_clock_follows_paused_time() {
    let clock = TokioClock::new();
    tokio::time::advance(Duration::from_millis(250)).await;
    assert_eq!(clock.now(), Duration::from_millis(250));
    assert_eq!(
      clock.instant_at(Duration::from_millis(250)),
      tokio::time::Instant::now()
    );
  }
}
