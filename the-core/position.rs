//! Conversion between linear character offsets and 1-indexed line/column
//! ranges.
//!
//! Lines are split on the convention detected from the text itself (see
//! [`detect_line_ending`]); each line's length includes its terminator. An
//! offset that lands exactly on a line boundary belongs to column 1 of the
//! following line, so the end of a text that finishes with a terminator is
//! column 1 of an empty last line.
//!
//! Columns count `char`s, the same unit ropey and the diff offsets use.

use ropey::RopeSlice;
use thiserror::Error;

use crate::line_ending::{
  LineEnding,
  detect_line_ending,
};

pub type Result<T> = std::result::Result<T, CoordinateError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinateError {
  #[error("offset range {start}..{end} is out of bounds for text length {len}")]
  OutOfRange {
    start: usize,
    end:   usize,
    len:   usize,
  },
  #[error("position {line}:{column} is outside the text")]
  PositionOutOfRange { line: usize, column: usize },
  #[error("invalid range: {start_line}:{start_column} is after {end_line}:{end_column}")]
  InvalidRange {
    start_line:   usize,
    start_column: usize,
    end_line:     usize,
    end_column:   usize,
  },
}

/// A single point in a text, 1-indexed on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
  pub line:   usize,
  pub column: usize,
}

impl Position {
  pub const fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }
}

/// Line/column addressing of a replaced region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
  pub start_line:   usize,
  pub start_column: usize,
  pub end_line:     usize,
  pub end_column:   usize,
}

impl TextRange {
  pub fn new(start: Position, end: Position) -> Self {
    Self {
      start_line:   start.line,
      start_column: start.column,
      end_line:     end.line,
      end_column:   end.column,
    }
  }

  pub fn start(&self) -> Position {
    Position::new(self.start_line, self.start_column)
  }

  pub fn end(&self) -> Position {
    Position::new(self.end_line, self.end_column)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.start() == self.end()
  }
}

/// Start offsets of every line of one text.
///
/// Built once per conversion and dropped with it.
#[derive(Debug, Clone)]
pub struct LineTable {
  starts:      Vec<usize>,
  len_chars:   usize,
  line_ending: LineEnding,
}

impl LineTable {
  pub fn new(text: RopeSlice) -> Self {
    Self::with_line_ending(text, detect_line_ending(text))
  }

  pub fn with_line_ending(text: RopeSlice, line_ending: LineEnding) -> Self {
    let mut starts = Vec::with_capacity(text.len_lines());
    starts.push(0);

    let mut prev = None;
    let mut len_chars = 0;
    for ch in text.chars() {
      len_chars += 1;
      let ends_line = match line_ending {
        LineEnding::LF => ch == '\n',
        LineEnding::Crlf => ch == '\n' && prev == Some('\r'),
      };
      if ends_line {
        starts.push(len_chars);
      }
      prev = Some(ch);
    }

    Self {
      starts,
      len_chars,
      line_ending,
    }
  }

  #[inline]
  pub fn line_ending(&self) -> LineEnding {
    self.line_ending
  }

  #[inline]
  pub fn len_lines(&self) -> usize {
    self.starts.len()
  }

  #[inline]
  pub fn len_chars(&self) -> usize {
    self.len_chars
  }

  /// Char length of the zero-indexed `line`, terminator included.
  fn line_len(&self, line: usize) -> usize {
    let end = self
      .starts
      .get(line + 1)
      .copied()
      .unwrap_or(self.len_chars);
    end - self.starts[line]
  }

  pub fn position_at(&self, offset: usize) -> Result<Position> {
    if offset > self.len_chars {
      return Err(CoordinateError::OutOfRange {
        start: offset,
        end:   offset,
        len:   self.len_chars,
      });
    }

    Ok(self.locate(offset))
  }

  fn locate(&self, offset: usize) -> Position {
    // `starts[0] == 0` so the partition point is always at least one.
    let line = self.starts.partition_point(|&start| start <= offset) - 1;
    Position::new(line + 1, offset - self.starts[line] + 1)
  }

  /// The range covering the whole text.
  pub fn full_range(&self) -> TextRange {
    TextRange::new(Position::new(1, 1), self.locate(self.len_chars))
  }

  pub fn offset_at(&self, pos: Position) -> Result<usize> {
    let out_of_range = || {
      CoordinateError::PositionOutOfRange {
        line:   pos.line,
        column: pos.column,
      }
    };

    if pos.line == 0 || pos.column == 0 || pos.line > self.starts.len() {
      return Err(out_of_range());
    }
    let line = pos.line - 1;
    let column = pos.column - 1;
    if column > self.line_len(line) {
      return Err(out_of_range());
    }
    Ok(self.starts[line] + column)
  }

  pub fn range_of(&self, offset: usize, length: usize) -> Result<TextRange> {
    let end = offset.saturating_add(length);
    if end > self.len_chars {
      return Err(CoordinateError::OutOfRange {
        start: offset,
        end,
        len: self.len_chars,
      });
    }
    let start = self.position_at(offset)?;
    let end = if length == 0 {
      start
    } else {
      self.position_at(end)?
    };
    Ok(TextRange::new(start, end))
  }

  pub fn offsets_of(&self, range: &TextRange) -> Result<(usize, usize)> {
    let start = self.offset_at(range.start())?;
    let end = self.offset_at(range.end())?;
    if start > end {
      return Err(CoordinateError::InvalidRange {
        start_line:   range.start_line,
        start_column: range.start_column,
        end_line:     range.end_line,
        end_column:   range.end_column,
      });
    }
    Ok((start, end))
  }
}

/// Converts the `length` chars starting at `offset` of `original` into a
/// line/column range.
pub fn to_range(offset: usize, length: usize, original: RopeSlice) -> Result<TextRange> {
  LineTable::new(original).range_of(offset, length)
}

/// Inverse of [`to_range`]: the `(start, end)` char offsets `range` covers in
/// `text`.
pub fn to_offsets(range: &TextRange, text: RopeSlice) -> Result<(usize, usize)> {
  LineTable::new(text).offsets_of(range)
}

#[cfg(test)]
mod tests {
  use quickcheck::{
    Arbitrary,
    Gen,
    TestResult,
  };
  use ropey::Rope;

  use super::*;

  fn range(text: &str, offset: usize, length: usize) -> TextRange {
    to_range(offset, length, Rope::from_str(text).slice(..)).unwrap()
  }

  fn r(sl: usize, sc: usize, el: usize, ec: usize) -> TextRange {
    TextRange {
      start_line:   sl,
      start_column: sc,
      end_line:     el,
      end_column:   ec,
    }
  }

  #[test]
  fn single_line() {
    assert_eq!(range("hello", 0, 0), r(1, 1, 1, 1));
    assert_eq!(range("hello", 1, 3), r(1, 2, 1, 5));
    assert_eq!(range("hello", 0, 5), r(1, 1, 1, 6));
  }

  #[test]
  fn boundary_belongs_to_next_line() {
    // "ab\n" occupies offsets 0..3; offset 3 is the start of line 2.
    assert_eq!(range("ab\ncd", 3, 0), r(2, 1, 2, 1));
    assert_eq!(range("ab\ncd", 2, 1), r(1, 3, 2, 1));
    assert_eq!(range("ab\ncd", 0, 3), r(1, 1, 2, 1));
  }

  #[test]
  fn crlf_terminators_count_as_two() {
    let text = "ab\r\ncd\r\n";
    assert_eq!(range(text, 4, 0), r(2, 1, 2, 1));
    assert_eq!(range(text, 2, 2), r(1, 3, 2, 1));
    assert_eq!(range(text, 5, 3), r(2, 2, 3, 1));
  }

  #[test]
  fn lone_lf_is_content_under_crlf() {
    let text = "a\r\nb\nc";
    let table = LineTable::new(Rope::from_str(text).slice(..));
    assert_eq!(table.line_ending(), LineEnding::Crlf);
    assert_eq!(table.len_lines(), 2);
    assert_eq!(table.position_at(5).unwrap(), Position::new(2, 3));
  }

  #[test]
  fn end_of_text() {
    assert_eq!(range("ab\n", 3, 0), r(2, 1, 2, 1));
    assert_eq!(range("ab\n", 1, 2), r(1, 2, 2, 1));
    assert_eq!(range("ab", 2, 0), r(1, 3, 1, 3));
    assert_eq!(range("", 0, 0), r(1, 1, 1, 1));
  }

  #[test]
  fn full_range() {
    let table = LineTable::new(Rope::from_str("ab\r\ncd").slice(..));
    assert_eq!(table.full_range(), r(1, 1, 2, 3));
    assert_eq!(
      to_offsets(&table.full_range(), Rope::from_str("ab\r\ncd").slice(..)),
      Ok((0, 6))
    );
  }

  #[test]
  fn out_of_range() {
    let text = Rope::from_str("abc");
    assert_eq!(
      to_range(2, 5, text.slice(..)),
      Err(CoordinateError::OutOfRange {
        start: 2,
        end:   7,
        len:   3,
      })
    );
    assert!(to_offsets(&r(2, 1, 2, 1), text.slice(..)).is_err());
    assert!(to_offsets(&r(1, 5, 1, 5), text.slice(..)).is_err());
    assert!(matches!(
      to_offsets(&r(1, 3, 1, 2), text.slice(..)),
      Err(CoordinateError::InvalidRange { .. })
    ));
  }

  #[test]
  fn inverse() {
    let text = Rope::from_str("one\ntwo\nthree");
    assert_eq!(to_offsets(&r(2, 1, 3, 3), text.slice(..)), Ok((4, 10)));
    assert_eq!(to_offsets(&r(3, 6, 3, 6), text.slice(..)), Ok((13, 13)));
  }

  #[derive(Clone, Debug)]
  struct Lines(String);

  impl Arbitrary for Lines {
    fn arbitrary(g: &mut Gen) -> Self {
      let pieces = ["a", "bc", "\n", "\r\n", "\r", "é", "  ", "xyz"];
      let len = usize::arbitrary(g) % 24;
      Lines((0..len).map(|_| *g.choose(&pieces).unwrap()).collect())
    }
  }

  quickcheck::quickcheck! {
    fn offsets_round_trip(text: Lines, offset: usize, length: usize) -> TestResult {
      let rope = Rope::from_str(&text.0);
      let len = rope.len_chars();
      if len == 0 {
        return TestResult::discard();
      }
      let offset = offset % (len + 1);
      let length = length % (len - offset + 1);
      let range = to_range(offset, length, rope.slice(..)).unwrap();
      TestResult::from_bool(to_offsets(&range, rope.slice(..)) == Ok((offset, offset + length)))
    }
  }
}
