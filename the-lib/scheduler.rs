//! The replay state machine.
//!
//! A [`Scheduler`] owns one timer per pending step of every stream and a
//! single end-of-recording timer, all measured in wall-clock time from the
//! injected [`Clock`]. Nothing happens on its own: the owner calls
//! [`Scheduler::advance`] whenever [`Scheduler::next_deadline`] passes (the
//! tokio driver in [`crate::runtime`] does exactly that), which keeps the
//! engine deterministic under a [`the_replay_event::ManualClock`].
//!
//! Each stream keeps a cursor: the index of its next step that has not been
//! applied yet. Rescheduling always starts from the cursor, so a step is never
//! applied twice and never skipped, whatever sequence of pauses, speed changes
//! and seeks happened in between. Every visible mutation of a stream goes
//! through a [`Throttle`], and every timer carries its key's generation so a
//! callback that outlived its cancellation is recognised and dropped.

use std::{
  sync::Arc,
  time::Duration,
};

use ropey::Rope;
use the_core::position::{
  LineTable,
  to_range,
};
use the_replay_event::{
  Clock,
  Fired,
  Throttle,
  ThrottleRequest,
  TimerQueue,
};
use thiserror::Error;

use crate::{
  buffer::{
    BufferError,
    BufferHost,
  },
  config::PlaybackConfig,
  diff::diff_with_options,
  playback::{
    PlaybackClock,
    PlaybackState,
  },
  timeline::{
    StreamId,
    Timeline,
  },
  transport::{
    Command,
    Notification,
    Transport,
  },
};

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
  #[error("playback speed must be a positive finite number, got {0}")]
  InvalidSpeed(f64),
  #[error("the recording has no stream named {0}")]
  UnknownStream(String),
  #[error("the playback session was torn down")]
  TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKey {
  Stream(usize),
  Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
  /// Apply step `usize` of the keyed stream.
  Step(usize),
  /// The keyed stream's throttle interval expired.
  Trailing,
  End,
}

#[derive(Debug)]
struct FileState {
  id:        StreamId,
  language:  String,
  /// What the buffer is supposed to hold.
  content:   Rope,
  cursor:    usize,
  throttle:  Throttle<Rope>,
  mutations: usize,
}

pub struct Scheduler<B, T = ()> {
  timeline:   Arc<Timeline>,
  buffers:    B,
  transport:  T,
  clock:      Arc<dyn Clock>,
  config:     PlaybackConfig,
  playback:   PlaybackClock,
  files:      Vec<FileState>,
  timers:     TimerQueue<TimerKey, Action>,
  active:     usize,
  torn_down:  bool,
}

impl<B: BufferHost, T: Transport> Scheduler<B, T> {
  /// Creates one buffer per stream holding that stream's first step, makes
  /// the first stream visible and waits in [`PlaybackState::Unstarted`].
  pub fn new(
    timeline: Arc<Timeline>,
    mut buffers: B,
    transport: T,
    clock: Arc<dyn Clock>,
    config: PlaybackConfig,
  ) -> Self {
    let config = match config.validate() {
      Ok(()) => config,
      Err(err) => {
        tracing::warn!(%err, "falling back to default speed bounds");
        let defaults = PlaybackConfig::default();
        PlaybackConfig {
          min_speed: defaults.min_speed,
          max_speed: defaults.max_speed,
          ..config
        }
      },
    };
    let speed = if config.initial_speed.is_finite() && config.initial_speed > 0.0 {
      config.clamp_speed(config.initial_speed)
    } else {
      tracing::warn!(
        speed = config.initial_speed,
        "ignoring invalid initial speed"
      );
      1.0
    };

    let files = timeline
      .streams()
      .map(|stream| {
        let first = stream.first();
        buffers.create_buffer(stream.id(), &first.text, &first.language);
        FileState {
          id:        stream.id().clone(),
          language:  first.language.clone(),
          content:   first.text.clone(),
          cursor:    1,
          throttle:  Throttle::new(config.throttle_interval()),
          mutations: 0,
        }
      })
      .collect::<Vec<_>>();

    let first = timeline.first_stream().id().clone();
    buffers.set_active_stream(&first);

    tracing::debug!(
      streams = files.len(),
      total_ms = timeline.total_duration(),
      "primed replay buffers"
    );

    Self {
      timeline,
      buffers,
      transport,
      clock,
      config,
      playback: PlaybackClock::new(speed),
      files,
      timers: TimerQueue::new(),
      active: 0,
      torn_down: false,
    }
  }

  pub fn state(&self) -> PlaybackState {
    self.playback.state()
  }

  pub fn speed(&self) -> f64 {
    self.playback.speed()
  }

  pub fn total_duration(&self) -> Duration {
    Duration::from_millis(self.timeline.total_duration())
  }

  /// Current position in the recording, never past its end.
  pub fn virtual_time(&self) -> Duration {
    self
      .playback
      .virtual_time(self.clock.now())
      .min(self.total_duration())
  }

  pub fn timeline(&self) -> &Timeline {
    &self.timeline
  }

  pub fn config(&self) -> &PlaybackConfig {
    &self.config
  }

  pub fn buffers(&self) -> &B {
    &self.buffers
  }

  pub fn buffers_mut(&mut self) -> &mut B {
    &mut self.buffers
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  pub fn active_stream(&self) -> &StreamId {
    &self.files[self.active].id
  }

  /// The content the engine last applied to `stream`.
  pub fn content(&self, stream: &str) -> Option<&Rope> {
    let idx = self.timeline.stream_index(stream)?;
    Some(&self.files[idx].content)
  }

  /// Number of visible mutations applied to `stream` since priming.
  pub fn mutations(&self, stream: &str) -> Option<usize> {
    let idx = self.timeline.stream_index(stream)?;
    Some(self.files[idx].mutations)
  }

  pub fn pending_actions(&self) -> usize {
    self.timers.len()
  }

  /// When [`Self::advance`] next has work to do, on the scheduler's clock.
  pub fn next_deadline(&self) -> Option<Duration> {
    self.timers.next_deadline()
  }

  pub fn is_torn_down(&self) -> bool {
    self.torn_down
  }

  fn ensure_live(&self) -> Result<()> {
    if self.torn_down {
      return Err(PlaybackError::TornDown);
    }
    Ok(())
  }

  fn notify(&mut self) {
    let notification = Notification {
      state:        self.state(),
      virtual_time: self.virtual_time(),
    };
    tracing::debug!(
      state = %notification.state,
      virtual_ms = notification.virtual_time.as_millis() as u64,
      "playback state changed"
    );
    self.transport.notify(notification);
  }

  pub fn play(&mut self) -> Result<()> {
    self.ensure_live()?;
    match self.state() {
      PlaybackState::Unstarted | PlaybackState::Paused => {
        let now = self.clock.now();
        self.playback.transition(now, PlaybackState::Playing);
        self.schedule_all();
        self.notify();
      },
      PlaybackState::Ended => {
        self.seek(Duration::ZERO)?;
        self.play()?;
      },
      PlaybackState::Playing | PlaybackState::Buffering | PlaybackState::Seeking => {},
    }
    Ok(())
  }

  pub fn pause(&mut self) -> Result<()> {
    self.ensure_live()?;
    if matches!(
      self.state(),
      PlaybackState::Playing | PlaybackState::Buffering
    ) {
      self.halt(PlaybackState::Paused);
      self.notify();
    }
    Ok(())
  }

  pub fn toggle_play_pause(&mut self) -> Result<()> {
    match self.state() {
      PlaybackState::Playing | PlaybackState::Buffering => self.pause(),
      _ => self.play(),
    }
  }

  /// Freezes virtual time in `state`. Anything a throttle still holds is
  /// applied first so the buffers show the last step reached.
  fn halt(&mut self, state: PlaybackState) {
    let now = self.clock.now();
    let at = self.virtual_time();
    self.playback.transition(now, state);
    self.playback.set_virtual_time(now, at);
    self.flush_throttles();
    self.cancel_timers();
  }

  /// Jumps to `to` (clamped to the recording). Every stream is reset to the
  /// step active at that time, or the latest one that started before it, or
  /// its first step when none has. Playback resumes only if it was running.
  pub fn seek(&mut self, to: Duration) -> Result<()> {
    self.ensure_live()?;
    let resume = matches!(
      self.state(),
      PlaybackState::Playing | PlaybackState::Buffering
    );

    self.discard_throttles();
    self.cancel_timers();

    let to = to.min(self.total_duration());
    let now = self.clock.now();
    self.playback.transition(now, PlaybackState::Seeking);
    self.playback.set_virtual_time(now, to);
    self.notify();

    let t = u64::try_from(to.as_millis()).unwrap_or(u64::MAX);
    let timeline = Arc::clone(&self.timeline);
    for (idx, stream) in timeline.streams().enumerate() {
      let latest = stream.latest_index_at(t);
      let shown = stream.active_index_at(t).or(latest).unwrap_or(0);
      let target = stream.steps()[shown].text.clone();
      self.apply_target(idx, target);
      // Steps that started before `to` are behind us even if another one is
      // the one on screen.
      self.files[idx].cursor = shown.max(latest.unwrap_or(0)) + 1;
    }

    tracing::debug!(to_ms = t, resume, "seeked");
    let now = self.clock.now();
    if resume {
      self.playback.transition(now, PlaybackState::Playing);
      self.schedule_all();
    } else {
      self.playback.transition(now, PlaybackState::Paused);
    }
    self.notify();
    Ok(())
  }

  /// Changes the playback rate. Speeds outside the configured bounds are
  /// clamped; pending steps are rescheduled from the current virtual time.
  pub fn set_speed(&mut self, speed: f64) -> Result<()> {
    self.ensure_live()?;
    if !speed.is_finite() || speed <= 0.0 {
      return Err(PlaybackError::InvalidSpeed(speed));
    }
    let clamped = self.config.clamp_speed(speed);
    if clamped != speed {
      tracing::debug!(requested = speed, clamped, "clamped playback speed");
    }

    let now = self.clock.now();
    if self.state() == PlaybackState::Playing {
      self.flush_throttles();
      self.cancel_timers();
      self.playback.set_speed(now, clamped);
      self.schedule_all();
    } else {
      self.playback.set_speed(now, clamped);
    }
    self.notify();
    Ok(())
  }

  /// Stalls playback while the host is not ready and resumes it afterwards.
  pub fn set_buffering(&mut self, buffering: bool) -> Result<()> {
    self.ensure_live()?;
    match (buffering, self.state()) {
      (true, PlaybackState::Playing) => {
        self.halt(PlaybackState::Buffering);
        self.notify();
      },
      (false, PlaybackState::Buffering) => {
        let now = self.clock.now();
        self.playback.transition(now, PlaybackState::Playing);
        self.schedule_all();
        self.notify();
      },
      _ => {},
    }
    Ok(())
  }

  /// Makes another stream visible. Its buffer is brought up to date with the
  /// latest content applied to it before the switch.
  pub fn set_active_stream(&mut self, stream: &str) -> Result<()> {
    self.ensure_live()?;
    let idx = self
      .timeline
      .stream_index(stream)
      .ok_or_else(|| PlaybackError::UnknownStream(stream.to_owned()))?;

    self.flush_stream(idx);
    let file = &self.files[idx];
    match self.buffers.get_value(&file.id) {
      Some(value) if value == file.content => {},
      Some(_) => {
        tracing::warn!(stream = %file.id, "buffer diverged while hidden, replacing it");
        self.replace_wholesale(idx);
      },
      None => {
        let file = &self.files[idx];
        self
          .buffers
          .create_buffer(&file.id, &file.content, &file.language);
      },
    }

    self.active = idx;
    let id = self.files[idx].id.clone();
    self.buffers.set_active_stream(&id);
    Ok(())
  }

  /// Drops every pending action. The scheduler refuses further commands.
  pub fn teardown(&mut self) {
    if self.torn_down {
      return;
    }
    self.discard_throttles();
    self.cancel_timers();
    self.torn_down = true;
    tracing::debug!("replay torn down");
  }

  /// Runs a playback control command. Returns `false` once the session is
  /// over.
  pub fn handle(&mut self, command: Command) -> Result<bool> {
    match command {
      Command::TogglePlayPause => self.toggle_play_pause()?,
      Command::Seek(to) => self.seek(to)?,
      Command::SetSpeed(speed) => self.set_speed(speed)?,
      Command::SetActiveStream(stream) => self.set_active_stream(stream.as_str())?,
      Command::SetBuffering(buffering) => self.set_buffering(buffering)?,
      Command::Shutdown => {
        self.teardown();
        return Ok(false);
      },
    }
    Ok(true)
  }

  /// Runs every action whose deadline has passed. Returns how many fired.
  pub fn advance(&mut self) -> usize {
    if self.torn_down {
      return 0;
    }
    let now = self.clock.now();
    let mut fired = 0;
    while let Some(action) = self.timers.pop_due(now) {
      self.dispatch(action);
      fired += 1;
    }
    fired
  }

  fn dispatch(&mut self, fired: Fired<TimerKey, Action>) {
    if !self.timers.is_current(&fired) {
      tracing::trace!(key = ?fired.key, action = ?fired.action, "dropping stale action");
      return;
    }
    match (fired.key, fired.action) {
      (TimerKey::Stream(idx), Action::Step(step)) => self.on_step(idx, step),
      (TimerKey::Stream(idx), Action::Trailing) => self.on_trailing(idx),
      (TimerKey::Session, Action::End) => self.on_end(),
      (key, action) => tracing::error!(?key, ?action, "action fired under the wrong key"),
    }
  }

  fn on_step(&mut self, idx: usize, step: usize) {
    let Some(target) = self
      .timeline
      .stream_at(idx)
      .and_then(|stream| stream.steps().get(step))
      .map(|step| step.text.clone())
    else {
      tracing::error!(stream = idx, step, "scheduled step does not exist");
      return;
    };
    tracing::trace!(stream = %self.files[idx].id, step, "step due");

    let now = self.clock.now();
    let file = &mut self.files[idx];
    file.cursor = file.cursor.max(step + 1);
    match file.throttle.request(now, target) {
      ThrottleRequest::Invoke(target) => self.apply_target(idx, target),
      ThrottleRequest::Deferred {
        schedule_at: Some(at),
      } => {
        let handle = self
          .timers
          .schedule(TimerKey::Stream(idx), at, Action::Trailing);
        self.files[idx].throttle.set_pending_handle(handle);
      },
      ThrottleRequest::Deferred { schedule_at: None } => {},
    }
  }

  fn on_trailing(&mut self, idx: usize) {
    let now = self.clock.now();
    if let Some(target) = self.files[idx].throttle.fire(now) {
      self.apply_target(idx, target);
    }
  }

  fn on_end(&mut self) {
    self.flush_throttles();
    self.cancel_timers();
    let now = self.clock.now();
    self.playback.transition(now, PlaybackState::Ended);
    self
      .playback
      .set_virtual_time(now, self.total_duration());
    tracing::info!("replay reached the end of the recording");
    self.notify();
  }

  /// Schedules every step from each stream's cursor on, plus the end of the
  /// recording, against the current virtual time and speed.
  fn schedule_all(&mut self) {
    let now = self.clock.now();
    let timeline = Arc::clone(&self.timeline);
    for (idx, stream) in timeline.streams().enumerate() {
      for (step_idx, step) in stream.steps_from(self.files[idx].cursor) {
        let at = now + self.playback.wall_delay(now, step.start());
        self
          .timers
          .schedule(TimerKey::Stream(idx), at, Action::Step(step_idx));
      }
    }
    let end = now + self.playback.wall_delay(now, self.total_duration());
    self.timers.schedule(TimerKey::Session, end, Action::End);
    tracing::debug!(
      pending = self.timers.len(),
      speed = self.speed(),
      "scheduled replay"
    );
  }

  fn cancel_timers(&mut self) {
    let cancelled = self.timers.cancel_all();
    tracing::trace!(cancelled, "cancelled pending actions");
  }

  fn flush_stream(&mut self, idx: usize) {
    let now = self.clock.now();
    let (pending, handle) = self.files[idx].throttle.flush(now);
    if let Some(handle) = handle {
      self.timers.cancel(handle);
    }
    if let Some(target) = pending {
      self.apply_target(idx, target);
    }
  }

  fn flush_throttles(&mut self) {
    for idx in 0..self.files.len() {
      self.flush_stream(idx);
    }
  }

  fn discard_throttles(&mut self) {
    for file in &mut self.files {
      if let Some(handle) = file.throttle.reset() {
        self.timers.cancel(handle);
      }
    }
  }

  /// Turns the stream's buffer into `target` with one minimal edit, falling
  /// back to replacing it wholesale when the edit cannot be placed.
  fn apply_target(&mut self, idx: usize, target: Rope) {
    let file = &self.files[idx];
    let Some(edit) = diff_with_options(&file.content, &target, &self.config.diff) else {
      return;
    };

    let applied = to_range(
      edit.range_offset,
      edit.range_length,
      edit.original_text.slice(..),
    )
    .map_err(|source| {
      BufferError::OutOfRange {
        stream: file.id.clone(),
        source,
      }
    })
    .and_then(|range| {
      self
        .buffers
        .apply_edit(&file.id, &range, &edit.range_text, false)
    });

    let file = &mut self.files[idx];
    file.content = target;
    file.mutations += 1;

    if let Err(err) = applied {
      tracing::warn!(stream = %file.id, %err, "edit did not apply, replacing buffer");
      self.replace_wholesale(idx);
    }
  }

  fn replace_wholesale(&mut self, idx: usize) {
    let file = &self.files[idx];
    let Some(current) = self.buffers.get_value(&file.id) else {
      self
        .buffers
        .create_buffer(&file.id, &file.content, &file.language);
      return;
    };
    let range = LineTable::new(current.slice(..)).full_range();
    let replacement = file.content.to_string();
    if let Err(err) = self
      .buffers
      .apply_edit(&file.id, &range, &replacement, true)
    {
      tracing::error!(stream = %file.id, %err, "failed to replace buffer");
    }
  }
}
