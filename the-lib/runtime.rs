//! Drives a [`Scheduler`] on the tokio runtime.
//!
//! The task sleeps until either a playback command arrives or the scheduler's
//! next deadline passes, whichever is first, and runs [`Scheduler::advance`]
//! on wake-ups. It stops on [`Command::Shutdown`] or once every command
//! sender is gone, tears the scheduler down and hands it back through the
//! join handle.

use std::sync::Arc;

use the_replay_event::{
  TokioClock,
  send_blocking,
};
use tokio::{
  sync::mpsc::{
    self,
    Receiver,
    Sender,
  },
  task::{
    JoinError,
    JoinHandle,
  },
  time::timeout_at,
};

use crate::{
  buffer::BufferHost,
  config::PlaybackConfig,
  scheduler::Scheduler,
  timeline::Timeline,
  transport::{
    Command,
    Transport,
  },
};

const COMMAND_CAPACITY: usize = 128;

/// Handle to a running replay.
pub struct Player<B, T> {
  commands: Sender<Command>,
  task:     JoinHandle<Scheduler<B, T>>,
}

impl<B, T> Player<B, T> {
  pub fn commands(&self) -> Sender<Command> {
    self.commands.clone()
  }

  pub async fn send(&self, command: Command) -> bool {
    self.commands.send(command).await.is_ok()
  }

  /// For callers outside the runtime, such as a stdin reader thread.
  pub fn send_blocking(&self, command: Command) -> bool {
    send_blocking(&self.commands, command)
  }

  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }

  /// Waits for the replay to stop and returns the torn down scheduler.
  pub async fn join(self) -> Result<Scheduler<B, T>, JoinError> {
    drop(self.commands);
    self.task.await
  }
}

/// Primes the buffers and starts the replay task. Playback begins right away
/// when the configuration asks for autoplay.
pub fn spawn_player<B, T>(
  timeline: Arc<Timeline>,
  buffers: B,
  transport: T,
  config: PlaybackConfig,
) -> Player<B, T>
where
  B: BufferHost + Send + 'static,
  T: Transport + Send + 'static,
{
  let clock = TokioClock::new();
  let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
  let scheduler = Scheduler::new(timeline, buffers, transport, Arc::new(clock), config);
  let task = tokio::spawn(run(scheduler, clock, rx));
  Player { commands: tx, task }
}

async fn run<B, T>(
  mut scheduler: Scheduler<B, T>,
  clock: TokioClock,
  mut rx: Receiver<Command>,
) -> Scheduler<B, T>
where
  B: BufferHost,
  T: Transport,
{
  if scheduler.config().autoplay {
    if let Err(err) = scheduler.play() {
      tracing::warn!(%err, "autoplay failed");
    }
  }

  loop {
    let command = match scheduler.next_deadline() {
      Some(deadline) => {
        match timeout_at(clock.instant_at(deadline), rx.recv()).await {
          Ok(command) => command,
          Err(_) => {
            scheduler.advance();
            continue;
          },
        }
      },
      None => rx.recv().await,
    };

    let Some(command) = command else {
      tracing::debug!("all playback controls dropped");
      break;
    };
    tracing::trace!(?command, "playback command");
    match scheduler.handle(command) {
      Ok(true) => {},
      Ok(false) => break,
      Err(err) => tracing::warn!(%err, "ignoring playback command"),
    }
    // Commands may leave actions that are already due.
    scheduler.advance();
  }

  scheduler.teardown();
  scheduler
}
