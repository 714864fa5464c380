//! Replays a recorded coding session into editor buffers.
//!
//! A [`timeline::Timeline`] of full-text snapshots is turned into a sequence
//! of minimal edits ([`diff`]) that a [`scheduler::Scheduler`] applies to a
//! [`buffer::BufferHost`] at the recorded pace, under play, pause, seek and
//! speed controls.

pub mod buffer;
pub mod config;
pub mod diff;
pub mod playback;
pub mod runtime;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use the_core::position::{
  Position,
  TextRange,
};
