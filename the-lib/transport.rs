//! The boundary to the playback controls.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::{
  playback::PlaybackState,
  timeline::StreamId,
};

/// Sent whenever the playback state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
  pub state:        PlaybackState,
  pub virtual_time: Duration,
}

/// Receives state changes.
pub trait Transport {
  fn notify(&mut self, notification: Notification);
}

impl Transport for Vec<Notification> {
  fn notify(&mut self, notification: Notification) {
    self.push(notification);
  }
}

impl Transport for UnboundedSender<Notification> {
  fn notify(&mut self, notification: Notification) {
    // A closed receiver just means nobody is watching anymore.
    let _ = self.send(notification);
  }
}

impl Transport for () {
  fn notify(&mut self, _: Notification) {}
}

/// Requests from the playback controls.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  TogglePlayPause,
  Seek(Duration),
  SetSpeed(f64),
  SetActiveStream(StreamId),
  SetBuffering(bool),
  Shutdown,
}
