//! The edit-apply contract of the editor widget replay drives, plus an
//! in-memory rope implementation of it.

use indexmap::IndexMap;
use ropey::Rope;
use the_core::position::{
  CoordinateError,
  LineTable,
  TextRange,
};
use thiserror::Error;

use crate::timeline::StreamId;

pub type Result<T> = std::result::Result<T, BufferError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
  #[error("no buffer was created for {0}")]
  UnknownStream(StreamId),
  #[error("edit does not fit the buffer of {stream}: {source}")]
  OutOfRange {
    stream: StreamId,
    #[source]
    source: CoordinateError,
  },
}

/// What the replay engine needs from the editor that displays it.
///
/// One buffer exists per stream; only the active one is visible.
pub trait BufferHost {
  fn create_buffer(&mut self, stream: &StreamId, initial_text: &Rope, language: &str);

  /// Replaces `range` with `replacement`. With `force_full_replace` the range
  /// is ignored and the whole buffer becomes `replacement`.
  fn apply_edit(
    &mut self,
    stream: &StreamId,
    range: &TextRange,
    replacement: &str,
    force_full_replace: bool,
  ) -> Result<()>;

  fn get_value(&self, stream: &StreamId) -> Option<Rope>;

  fn set_active_stream(&mut self, stream: &StreamId);
}

/// One edit as a [`RopeBuffers`] host received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
  pub stream:       StreamId,
  pub range:        TextRange,
  pub replacement:  String,
  pub full_replace: bool,
}

#[derive(Debug, Clone)]
pub struct RopeBuffer {
  pub text:     Rope,
  pub language: String,
}

/// Rope backed buffers that record every edit they receive.
#[derive(Debug, Default)]
pub struct RopeBuffers {
  buffers: IndexMap<StreamId, RopeBuffer>,
  active:  Option<StreamId>,
  edits:   Vec<AppliedEdit>,
}

impl RopeBuffers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn buffer(&self, stream: &str) -> Option<&RopeBuffer> {
    self.buffers.get(stream)
  }

  pub fn text(&self, stream: &str) -> Option<String> {
    self.buffer(stream).map(|buffer| buffer.text.to_string())
  }

  pub fn active(&self) -> Option<&StreamId> {
    self.active.as_ref()
  }

  /// Content of the visible buffer.
  pub fn visible_text(&self) -> Option<String> {
    self.text(self.active.as_ref()?.as_str())
  }

  pub fn streams(&self) -> impl Iterator<Item = (&StreamId, &RopeBuffer)> {
    self.buffers.iter()
  }

  pub fn edits(&self) -> &[AppliedEdit] {
    &self.edits
  }

  pub fn edits_for<'a>(&'a self, stream: &'a str) -> impl Iterator<Item = &'a AppliedEdit> + 'a {
    self
      .edits
      .iter()
      .filter(move |edit| edit.stream.as_str() == stream)
  }

  /// Replaces a buffer's content behind the replay engine's back.
  pub fn overwrite(&mut self, stream: &str, text: &str) {
    if let Some(buffer) = self.buffers.get_mut(stream) {
      buffer.text = Rope::from_str(text);
    }
  }
}

impl BufferHost for RopeBuffers {
  fn create_buffer(&mut self, stream: &StreamId, initial_text: &Rope, language: &str) {
    self.buffers.insert(
      stream.clone(),
      RopeBuffer {
        text:     initial_text.clone(),
        language: language.to_owned(),
      },
    );
  }

  fn apply_edit(
    &mut self,
    stream: &StreamId,
    range: &TextRange,
    replacement: &str,
    force_full_replace: bool,
  ) -> Result<()> {
    let buffer = self
      .buffers
      .get_mut(stream.as_str())
      .ok_or_else(|| BufferError::UnknownStream(stream.clone()))?;

    if force_full_replace {
      buffer.text = Rope::from_str(replacement);
    } else {
      let (start, end) = LineTable::new(buffer.text.slice(..))
        .offsets_of(range)
        .map_err(|source| {
          BufferError::OutOfRange {
            stream: stream.clone(),
            source,
          }
        })?;
      buffer.text.remove(start..end);
      buffer.text.insert(start, replacement);
    }

    self.edits.push(AppliedEdit {
      stream: stream.clone(),
      range: *range,
      replacement: replacement.to_owned(),
      full_replace: force_full_replace,
    });
    Ok(())
  }

  fn get_value(&self, stream: &StreamId) -> Option<Rope> {
    self
      .buffers
      .get(stream.as_str())
      .map(|buffer| buffer.text.clone())
  }

  fn set_active_stream(&mut self, stream: &StreamId) {
    self.active = Some(stream.clone());
  }
}
