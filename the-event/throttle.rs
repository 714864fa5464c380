//! Leading + trailing edge throttling.
//!
//! A [`Throttle`] lets the first request of an idle period through at once
//! and holds every further request inside the interval as a single pending
//! value that is replaced by newer requests. The owner schedules one trailing
//! timer per burst (at the instant [`ThrottleRequest::Deferred`] names) and
//! calls [`Throttle::fire`] when it expires, so the last value of a burst is
//! always delivered.
//!
//! The throttle does not own a timer itself; it only remembers the handle of
//! the trailing timer so the owner can cancel it.

use std::time::Duration;

use crate::timer::TimerId;

/// Outcome of [`Throttle::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleRequest<T> {
  /// Apply now.
  Invoke(T),
  /// Held as the pending value. `schedule_at` is set when no trailing timer
  /// exists yet and one must be scheduled for that instant.
  Deferred { schedule_at: Option<Duration> },
}

#[derive(Debug)]
pub struct Throttle<T> {
  interval:       Duration,
  last_invoke:    Option<Duration>,
  pending:        Option<T>,
  pending_handle: Option<TimerId>,
}

impl<T> Throttle<T> {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      last_invoke: None,
      pending: None,
      pending_handle: None,
    }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn last_invoke(&self) -> Option<Duration> {
    self.last_invoke
  }

  pub fn has_pending(&self) -> bool {
    self.pending.is_some()
  }

  pub fn pending_handle(&self) -> Option<TimerId> {
    self.pending_handle
  }

  pub fn request(&mut self, now: Duration, value: T) -> ThrottleRequest<T> {
    if self.pending_handle.is_some() {
      log::trace!("throttle: coalescing into pending trailing call");
      self.pending = Some(value);
      return ThrottleRequest::Deferred { schedule_at: None };
    }

    match self.last_invoke {
      Some(last) if now < last + self.interval => {
        self.pending = Some(value);
        ThrottleRequest::Deferred {
          schedule_at: Some(last + self.interval),
        }
      },
      _ => {
        self.last_invoke = Some(now);
        ThrottleRequest::Invoke(value)
      },
    }
  }

  /// Records the trailing timer scheduled for a [`ThrottleRequest::Deferred`].
  pub fn set_pending_handle(&mut self, handle: TimerId) {
    self.pending_handle = Some(handle);
  }

  /// The trailing timer expired: hands out the pending value, if any.
  pub fn fire(&mut self, now: Duration) -> Option<T> {
    self.pending_handle = None;
    let value = self.pending.take()?;
    self.last_invoke = Some(now);
    Some(value)
  }

  /// Delivers the pending value right away. The trailing timer handle is
  /// returned alongside so the owner can cancel it.
  pub fn flush(&mut self, now: Duration) -> (Option<T>, Option<TimerId>) {
    let handle = self.pending_handle.take();
    let value = self.pending.take();
    if value.is_some() {
      self.last_invoke = Some(now);
    }
    (value, handle)
  }

  /// Drops the pending value. Returns the trailing timer handle to cancel.
  pub fn cancel(&mut self) -> Option<TimerId> {
    self.pending = None;
    self.pending_handle.take()
  }

  /// Forgets the last invocation too, so the next request leads again.
  pub fn reset(&mut self) -> Option<TimerId> {
    self.last_invoke = None;
    self.cancel()
  }
}
