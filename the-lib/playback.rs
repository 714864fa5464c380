use std::{
  fmt,
  time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
  Unstarted,
  Playing,
  Paused,
  Buffering,
  Seeking,
  Ended,
}

impl PlaybackState {
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Unstarted => "unstarted",
      Self::Playing => "playing",
      Self::Paused => "paused",
      Self::Buffering => "buffering",
      Self::Seeking => "seeking",
      Self::Ended => "ended",
    }
  }

  /// Whether the virtual clock advances in this state.
  pub const fn is_running(self) -> bool {
    matches!(self, Self::Playing)
  }
}

impl fmt::Display for PlaybackState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Maps wall-clock time onto recording time.
///
/// While running, virtual time is `anchor_virtual + (now - anchor_wall) *
/// speed`; in every other state it stays at `anchor_virtual`. Every change of
/// speed or state re-anchors, so the mapping stays piecewise linear.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
  anchor_virtual: Duration,
  anchor_wall:    Duration,
  speed:          f64,
  state:          PlaybackState,
}

impl PlaybackClock {
  pub fn new(speed: f64) -> Self {
    Self {
      anchor_virtual: Duration::ZERO,
      anchor_wall: Duration::ZERO,
      speed,
      state: PlaybackState::Unstarted,
    }
  }

  pub fn state(&self) -> PlaybackState {
    self.state
  }

  pub fn speed(&self) -> f64 {
    self.speed
  }

  pub fn virtual_time(&self, now: Duration) -> Duration {
    if self.state.is_running() {
      self.anchor_virtual + now.saturating_sub(self.anchor_wall).mul_f64(self.speed)
    } else {
      self.anchor_virtual
    }
  }

  /// Wall-clock delay until virtual time reaches `at`, from `now`.
  pub fn wall_delay(&self, now: Duration, at: Duration) -> Duration {
    at.saturating_sub(self.virtual_time(now))
      .div_f64(self.speed)
  }

  /// Pins virtual time to its value at `now` and switches state.
  pub fn transition(&mut self, now: Duration, state: PlaybackState) {
    self.anchor_virtual = self.virtual_time(now);
    self.anchor_wall = now;
    self.state = state;
  }

  pub fn set_speed(&mut self, now: Duration, speed: f64) {
    self.anchor_virtual = self.virtual_time(now);
    self.anchor_wall = now;
    self.speed = speed;
  }

  /// Jumps to `to` without changing state.
  pub fn set_virtual_time(&mut self, now: Duration, to: Duration) {
    self.anchor_virtual = to;
    self.anchor_wall = now;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  #[test]
  fn advances_only_while_playing() {
    let mut clock = PlaybackClock::new(1.0);
    assert_eq!(clock.virtual_time(ms(500)), ms(0));

    clock.transition(ms(500), PlaybackState::Playing);
    assert_eq!(clock.virtual_time(ms(800)), ms(300));

    clock.transition(ms(800), PlaybackState::Paused);
    assert_eq!(clock.virtual_time(ms(5000)), ms(300));
  }

  #[test]
  fn speed_scales_both_directions() {
    let mut clock = PlaybackClock::new(1.0);
    clock.transition(ms(0), PlaybackState::Playing);
    clock.set_speed(ms(100), 2.0);
    assert_eq!(clock.virtual_time(ms(200)), ms(300));
    assert_eq!(clock.wall_delay(ms(200), ms(500)), ms(100));
    assert_eq!(clock.wall_delay(ms(200), ms(100)), ms(0));
  }

  #[test]
  fn seeking_keeps_state() {
    let mut clock = PlaybackClock::new(1.0);
    clock.transition(ms(0), PlaybackState::Paused);
    clock.set_virtual_time(ms(10), ms(700));
    assert_eq!(clock.state(), PlaybackState::Paused);
    assert_eq!(clock.virtual_time(ms(20)), ms(700));
    assert_eq!(PlaybackState::Seeking.to_string(), "seeking");
  }
}
