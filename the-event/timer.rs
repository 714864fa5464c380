//! A cancelable queue of deferred actions keyed by deadline.
//!
//! Every action belongs to a key (a stream, usually) and is stamped with that
//! key's generation when scheduled. Cancelling a key bumps its generation, so
//! an action that escaped cancellation can be recognised as stale with
//! [`TimerQueue::is_current`] and dropped instead of being run.

use std::{
  collections::{
    BTreeMap,
    HashMap,
    HashSet,
  },
  hash::Hash,
  time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<K, A> {
  key:        K,
  generation: u64,
  action:     A,
}

/// An action whose deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K, A> {
  pub id:         TimerId,
  pub key:        K,
  pub generation: u64,
  pub deadline:   Duration,
  pub action:     A,
}

#[derive(Debug)]
pub struct TimerQueue<K, A> {
  // (deadline, id): ids increase monotonically so equal deadlines fire in
  // scheduling order.
  entries:     BTreeMap<(Duration, TimerId), Entry<K, A>>,
  deadlines:   HashMap<TimerId, Duration>,
  live:        HashMap<K, HashSet<TimerId>>,
  generations: HashMap<K, u64>,
  next_id:     u64,
}

impl<K, A> Default for TimerQueue<K, A> {
  fn default() -> Self {
    Self {
      entries:     BTreeMap::new(),
      deadlines:   HashMap::new(),
      live:        HashMap::new(),
      generations: HashMap::new(),
      next_id:     0,
    }
  }
}

impl<K, A> TimerQueue<K, A>
where
  K: Clone + Eq + Hash,
{
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Number of live actions registered under `key`.
  pub fn len_key(&self, key: &K) -> usize {
    self.live.get(key).map_or(0, HashSet::len)
  }

  pub fn generation(&self, key: &K) -> u64 {
    self.generations.get(key).copied().unwrap_or(0)
  }

  pub fn schedule(&mut self, key: K, deadline: Duration, action: A) -> TimerId {
    let id = TimerId(self.next_id);
    self.next_id += 1;

    let generation = *self.generations.entry(key.clone()).or_insert(0);
    self.live.entry(key.clone()).or_default().insert(id);
    self.deadlines.insert(id, deadline);
    self.entries.insert(
      (deadline, id),
      Entry {
        key,
        generation,
        action,
      },
    );
    id
  }

  /// Removes a single action. Returns `false` if it already fired or was
  /// cancelled before.
  pub fn cancel(&mut self, id: TimerId) -> bool {
    let Some(deadline) = self.deadlines.remove(&id) else {
      return false;
    };
    let Some(entry) = self.entries.remove(&(deadline, id)) else {
      return false;
    };
    self.forget(&entry.key, id);
    true
  }

  /// Drops every action of `key` and invalidates anything scheduled under
  /// the previous generation.
  pub fn cancel_key(&mut self, key: &K) -> usize {
    *self.generations.entry(key.clone()).or_insert(0) += 1;

    let Some(ids) = self.live.remove(key) else {
      return 0;
    };
    for id in &ids {
      if let Some(deadline) = self.deadlines.remove(id) {
        self.entries.remove(&(deadline, *id));
      }
    }
    ids.len()
  }

  /// Drops every action of every key.
  pub fn cancel_all(&mut self) -> usize {
    let cancelled = self.entries.len();
    // Every key that was ever scheduled has a generation entry.
    for generation in self.generations.values_mut() {
      *generation += 1;
    }
    self.entries.clear();
    self.deadlines.clear();
    self.live.clear();
    cancelled
  }

  pub fn next_deadline(&self) -> Option<Duration> {
    self.entries.keys().next().map(|(deadline, _)| *deadline)
  }

  /// Removes and returns the earliest action due at `now`.
  pub fn pop_due(&mut self, now: Duration) -> Option<Fired<K, A>> {
    let (&(deadline, id), _) = self.entries.iter().next()?;
    if deadline > now {
      return None;
    }
    let entry = self.entries.remove(&(deadline, id))?;
    self.deadlines.remove(&id);
    self.forget(&entry.key, id);
    Some(Fired {
      id,
      key: entry.key,
      generation: entry.generation,
      deadline,
      action: entry.action,
    })
  }

  /// Whether a fired action still belongs to its key's current generation.
  pub fn is_current(&self, fired: &Fired<K, A>) -> bool {
    fired.generation == self.generation(&fired.key)
  }

  fn forget(&mut self, key: &K, id: TimerId) {
    if let Some(ids) = self.live.get_mut(key) {
      ids.remove(&id);
      if ids.is_empty() {
        self.live.remove(key);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  #[test]
  fn fires_in_deadline_then_schedule_order() {
    let mut timers = TimerQueue::new();
    timers.schedule("a", ms(20), 1);
    timers.schedule("b", ms(10), 2);
    timers.schedule("a", ms(20), 3);

    assert_eq!(timers.next_deadline(), Some(ms(10)));
    assert!(timers.pop_due(ms(5)).is_none());

    let fired: Vec<_> = std::iter::from_fn(|| timers.pop_due(ms(20)))
      .map(|fired| fired.action)
      .collect();
    assert_eq!(fired, vec![2, 1, 3]);
    assert!(timers.is_empty());
  }

  #[test]
  fn cancel_is_idempotent() {
    let mut timers = TimerQueue::new();
    let id = timers.schedule("a", ms(10), ());
    assert!(timers.cancel(id));
    assert!(!timers.cancel(id));
    assert!(timers.pop_due(ms(100)).is_none());

    let id = timers.schedule("a", ms(10), ());
    assert!(timers.pop_due(ms(10)).is_some());
    assert!(!timers.cancel(id));
    assert_eq!(timers.len_key(&"a"), 0);
  }

  #[test]
  fn cancel_key_only_touches_that_key() {
    let mut timers = TimerQueue::new();
    timers.schedule("a", ms(10), 1);
    timers.schedule("a", ms(30), 2);
    timers.schedule("b", ms(20), 3);

    assert_eq!(timers.cancel_key(&"a"), 2);
    assert_eq!(timers.cancel_key(&"a"), 0);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers.pop_due(ms(100)).map(|f| f.action), Some(3));
  }

  #[test]
  fn escaped_action_is_stale_after_cancel() {
    let mut timers = TimerQueue::new();
    timers.schedule("a", ms(10), ());
    let fired = timers.pop_due(ms(10)).unwrap();
    assert!(timers.is_current(&fired));

    timers.cancel_all();
    assert!(!timers.is_current(&fired));

    timers.schedule("a", ms(10), ());
    let fresh = timers.pop_due(ms(10)).unwrap();
    assert!(timers.is_current(&fresh));
    assert!(!timers.is_current(&fired));
  }
}
