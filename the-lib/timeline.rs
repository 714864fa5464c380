//! Recorded snapshot timelines.
//!
//! A recording is a flat JSON array of full-text snapshots of one or more
//! files. Loading groups them into one [`Stream`] per file, validates the
//! ordering rules and freezes the result: nothing in a [`Timeline`] changes
//! after [`Timeline::from_json`] returns.

use std::{
  borrow::Borrow,
  fmt,
  io::Read,
  sync::Arc,
  time::Duration,
};

use indexmap::IndexMap;
use ropey::Rope;
use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TimelineError>;

#[derive(Debug, Error)]
pub enum TimelineError {
  #[error("invalid timeline JSON: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("timeline contains no snapshots")]
  Empty,
  #[error("snapshot {sequence} has an empty file path")]
  MissingFile { sequence: u64 },
  #[error("snapshot {sequence} of {file} ends at {time_end}ms before it starts at {time_start}ms")]
  InvertedInterval {
    file:       StreamId,
    sequence:   u64,
    time_start: u64,
    time_end:   u64,
  },
  #[error(
    "snapshot {sequence} of {file} starts at {time_start}ms, before the previous snapshot at \
     {previous_start}ms"
  )]
  OutOfOrder {
    file:           StreamId,
    sequence:       u64,
    time_start:     u64,
    previous_start: u64,
  },
  #[error("snapshot sequence {sequence} of {file} does not increase past {previous}")]
  SequenceNotIncreasing {
    file:     StreamId,
    sequence: u64,
    previous: u64,
  },
}

/// Identifies one file's stream. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(Arc<str>);

impl StreamId {
  pub fn new(path: impl AsRef<str>) -> Self {
    Self(Arc::from(path.as_ref()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for StreamId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl Borrow<str> for StreamId {
  fn borrow(&self) -> &str {
    &self.0
  }
}

impl From<&str> for StreamId {
  fn from(path: &str) -> Self {
    Self::new(path)
  }
}

impl From<String> for StreamId {
  fn from(path: String) -> Self {
    Self(Arc::from(path))
  }
}

/// Wire form of one snapshot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
  sequence:   u64,
  time_start: u64,
  time_end:   u64,
  file:       String,
  text:       String,
  language:   String,
}

/// A full-text snapshot of one file, valid from `time_start` until
/// `time_end` (milliseconds, recording relative).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeStep {
  pub sequence:   u64,
  pub time_start: u64,
  pub time_end:   u64,
  pub file:       StreamId,
  pub text:       Rope,
  pub language:   String,
}

impl ChangeStep {
  pub fn new(
    sequence: u64,
    time_start: u64,
    time_end: u64,
    file: impl Into<StreamId>,
    text: &str,
    language: impl Into<String>,
  ) -> Self {
    Self {
      sequence,
      time_start,
      time_end,
      file: file.into(),
      text: Rope::from_str(text),
      language: language.into(),
    }
  }

  pub fn start(&self) -> Duration {
    Duration::from_millis(self.time_start)
  }

  pub fn end(&self) -> Duration {
    Duration::from_millis(self.time_end)
  }

  /// `time_start <= t < time_end`.
  pub fn is_active_at(&self, t: u64) -> bool {
    self.time_start <= t && t < self.time_end
  }
}

impl From<Record> for ChangeStep {
  fn from(record: Record) -> Self {
    Self {
      sequence:   record.sequence,
      time_start: record.time_start,
      time_end:   record.time_end,
      file:       StreamId::from(record.file),
      text:       Rope::from_str(&record.text),
      language:   record.language,
    }
  }
}

/// The snapshots of one file, ascending by `time_start`.
#[derive(Debug, Clone)]
pub struct Stream {
  id:    StreamId,
  steps: Vec<ChangeStep>,
}

impl Stream {
  pub fn id(&self) -> &StreamId {
    &self.id
  }

  pub fn steps(&self) -> &[ChangeStep] {
    &self.steps
  }

  /// Streams are never empty.
  pub fn first(&self) -> &ChangeStep {
    &self.steps[0]
  }

  pub fn language(&self) -> &str {
    &self.first().language
  }

  pub fn duration(&self) -> u64 {
    self.steps.iter().map(|step| step.time_end).max().unwrap_or(0)
  }

  /// Index of the step with `time_start <= t < time_end`. With overlapping
  /// steps the latest one wins.
  pub fn active_index_at(&self, t: u64) -> Option<usize> {
    let started = self.steps.partition_point(|step| step.time_start <= t);
    (0..started).rev().find(|&idx| self.steps[idx].is_active_at(t))
  }

  pub fn active_step_at(&self, t: u64) -> Option<&ChangeStep> {
    self.active_index_at(t).map(|idx| &self.steps[idx])
  }

  /// Index of the last step that started at or before `t`.
  pub fn latest_index_at(&self, t: u64) -> Option<usize> {
    self
      .steps
      .partition_point(|step| step.time_start <= t)
      .checked_sub(1)
  }

  pub fn latest_step_at(&self, t: u64) -> Option<&ChangeStep> {
    self.latest_index_at(t).map(|idx| &self.steps[idx])
  }

  /// Steps with `time_start >= t`, ascending.
  pub fn upcoming_from(&self, t: u64) -> Upcoming<'_> {
    let start = self.steps.partition_point(|step| step.time_start < t);
    self.steps_from(start)
  }

  /// Steps from `index` on, ascending.
  pub fn steps_from(&self, index: usize) -> Upcoming<'_> {
    Upcoming {
      steps: &self.steps,
      start: index.min(self.steps.len()),
      pos:   index.min(self.steps.len()),
    }
  }
}

/// Lazy iterator over the tail of a stream, yielding `(index, step)`.
///
/// Clones iterate independently and [`Upcoming::restart`] rewinds to where
/// the iterator was created.
#[derive(Debug, Clone)]
pub struct Upcoming<'a> {
  steps: &'a [ChangeStep],
  start: usize,
  pos:   usize,
}

impl Upcoming<'_> {
  pub fn restart(&mut self) {
    self.pos = self.start;
  }
}

impl<'a> Iterator for Upcoming<'a> {
  type Item = (usize, &'a ChangeStep);

  fn next(&mut self) -> Option<Self::Item> {
    let step = self.steps.get(self.pos)?;
    let item = (self.pos, step);
    self.pos += 1;
    Some(item)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let remaining = self.steps.len() - self.pos;
    (remaining, Some(remaining))
  }
}

impl ExactSizeIterator for Upcoming<'_> {}

/// Every stream of one recording. Streams keep the order in which their
/// first snapshot appeared.
#[derive(Debug, Clone)]
pub struct Timeline {
  streams:        IndexMap<StreamId, Stream>,
  total_duration: u64,
}

impl Timeline {
  pub fn from_json(json: &str) -> Result<Self> {
    let records: Vec<Record> = serde_json::from_str(json)?;
    Self::from_steps(records.into_iter().map(ChangeStep::from))
  }

  pub fn from_reader(reader: impl Read) -> Result<Self> {
    let records: Vec<Record> = serde_json::from_reader(reader)?;
    Self::from_steps(records.into_iter().map(ChangeStep::from))
  }

  pub fn from_steps(steps: impl IntoIterator<Item = ChangeStep>) -> Result<Self> {
    let mut streams: IndexMap<StreamId, Stream> = IndexMap::new();

    for step in steps {
      validate_step(&step)?;
      let stream = streams
        .entry(step.file.clone())
        .or_insert_with(|| {
          Stream {
            id:    step.file.clone(),
            steps: Vec::new(),
          }
        });
      if let Some(previous) = stream.steps.last() {
        validate_successor(previous, &step)?;
      }
      stream.steps.push(step);
    }

    if streams.is_empty() {
      return Err(TimelineError::Empty);
    }

    let total_duration = streams.values().map(Stream::duration).max().unwrap_or(0);
    tracing::debug!(
      streams = streams.len(),
      total_duration,
      "loaded timeline"
    );
    Ok(Self {
      streams,
      total_duration,
    })
  }

  /// Largest `time_end` of any snapshot, in milliseconds.
  pub fn total_duration(&self) -> u64 {
    self.total_duration
  }

  pub fn len_streams(&self) -> usize {
    self.streams.len()
  }

  pub fn streams(&self) -> impl ExactSizeIterator<Item = &Stream> {
    self.streams.values()
  }

  pub fn stream(&self, id: &str) -> Option<&Stream> {
    self.streams.get(id)
  }

  pub fn stream_at(&self, index: usize) -> Option<&Stream> {
    self.streams.get_index(index).map(|(_, stream)| stream)
  }

  pub fn stream_index(&self, id: &str) -> Option<usize> {
    self.streams.get_index_of(id)
  }

  pub fn first_stream(&self) -> &Stream {
    &self.streams[0]
  }

  pub fn active_step_at(&self, id: &str, t: u64) -> Option<&ChangeStep> {
    self.stream(id)?.active_step_at(t)
  }

  pub fn latest_step_at(&self, id: &str, t: u64) -> Option<&ChangeStep> {
    self.stream(id)?.latest_step_at(t)
  }

  /// Empty when the stream does not exist.
  pub fn upcoming_from(&self, id: &str, t: u64) -> Upcoming<'_> {
    match self.stream(id) {
      Some(stream) => stream.upcoming_from(t),
      None => {
        Upcoming {
          steps: &[],
          start: 0,
          pos:   0,
        }
      },
    }
  }
}

fn validate_step(step: &ChangeStep) -> Result<()> {
  if step.file.as_str().is_empty() {
    return Err(TimelineError::MissingFile {
      sequence: step.sequence,
    });
  }
  if step.time_start > step.time_end {
    return Err(TimelineError::InvertedInterval {
      file:       step.file.clone(),
      sequence:   step.sequence,
      time_start: step.time_start,
      time_end:   step.time_end,
    });
  }
  Ok(())
}

fn validate_successor(previous: &ChangeStep, step: &ChangeStep) -> Result<()> {
  if step.time_start < previous.time_start {
    return Err(TimelineError::OutOfOrder {
      file:           step.file.clone(),
      sequence:       step.sequence,
      time_start:     step.time_start,
      previous_start: previous.time_start,
    });
  }
  if step.sequence <= previous.sequence {
    return Err(TimelineError::SequenceNotIncreasing {
      file:     step.file.clone(),
      sequence: step.sequence,
      previous: previous.sequence,
    });
  }
  Ok(())
}
