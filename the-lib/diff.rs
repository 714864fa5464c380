//! Snapshot-to-snapshot diffing.
//!
//! The replay buffer only accepts a single range replacement per step, so a
//! diff is collapsed into one window: everything between the first and the
//! last changed character, unchanged text in between included.
//!
//! For large texts a line-level histogram diff first locates the changed
//! lines, which bounds the character scan to the region around them. The
//! interner built for that diff lives only for one call.

use std::{
  ops::Range,
  time::Instant,
};

use imara_diff::{
  Algorithm,
  Diff,
  IndentHeuristic,
  IndentLevel,
  InternedInput,
};
use ropey::{
  Rope,
  RopeSlice,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiffOptions {
  pub indent_width:        u8,
  /// Below this many chars (both texts together) the line diff is skipped
  /// and the character scan runs over the whole text.
  pub line_diff_min_chars: usize,
  /// Check every descriptor against its target before handing it out.
  pub verify:              bool,
}

impl Default for DiffOptions {
  fn default() -> Self {
    Self {
      indent_width:        4,
      line_diff_min_chars: 8 * 1024,
      verify:              true,
    }
  }
}

/// One contiguous replacement turning `original_text` into `target_text`.
///
/// Offsets and lengths count chars.
#[derive(Debug, Clone, PartialEq)]
pub struct EditDescriptor {
  pub range_offset:  usize,
  pub range_length:  usize,
  pub range_text:    String,
  pub original_text: Rope,
  pub target_text:   Rope,
}

impl EditDescriptor {
  /// Replaces all of `original` with `target`.
  pub fn full_replace(original: &Rope, target: &Rope) -> Self {
    Self {
      range_offset:  0,
      range_length:  original.len_chars(),
      range_text:    target.to_string(),
      original_text: original.clone(),
      target_text:   target.clone(),
    }
  }

  fn from_window(original: &Rope, target: &Rope, window: &Window) -> Self {
    Self {
      range_offset:  window.before.start,
      range_length:  window.before.len(),
      range_text:    target.slice(window.after.clone()).to_string(),
      original_text: original.clone(),
      target_text:   target.clone(),
    }
  }

  #[inline]
  pub fn range_end(&self) -> usize {
    self.range_offset + self.range_length
  }

  #[inline]
  pub fn is_insertion(&self) -> bool {
    self.range_length == 0
  }

  #[inline]
  pub fn is_deletion(&self) -> bool {
    self.range_text.is_empty()
  }

  pub fn is_full_replace(&self) -> bool {
    self.range_offset == 0 && self.range_length == self.original_text.len_chars()
  }

  /// Applies the replacement to `text`. `false` when the range does not fit.
  pub fn apply(&self, text: &mut Rope) -> bool {
    if self.range_end() > text.len_chars() {
      return false;
    }
    text.remove(self.range_offset..self.range_end());
    text.insert(self.range_offset, &self.range_text);
    true
  }

  /// Whether applying the replacement to `original_text` yields exactly
  /// `target_text`.
  pub fn round_trips(&self) -> bool {
    let mut text = self.original_text.clone();
    self.apply(&mut text) && text == self.target_text
  }
}

/// Char ranges of the changed region in both texts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Window {
  before: Range<usize>,
  after:  Range<usize>,
}

struct RopeLines<'a>(RopeSlice<'a>);

impl<'a> imara_diff::TokenSource for RopeLines<'a> {
  type Token = RopeSlice<'a>;
  type Tokenizer = ropey::iter::Lines<'a>;

  fn tokenize(&self) -> Self::Tokenizer {
    self.0.lines()
  }

  fn estimate_tokens(&self) -> u32 {
    // we can provide a perfect estimate which is very nice for performance
    u32::try_from(self.0.len_lines()).unwrap_or(u32::MAX)
  }
}

/// Computes the minimal single replacement turning `original` into `target`,
/// or `None` when they are equal.
pub fn diff(original: &Rope, target: &Rope) -> Option<EditDescriptor> {
  diff_with_options(original, target, &DiffOptions::default())
}

pub fn diff_with_options(
  original: &Rope,
  target: &Rope,
  options: &DiffOptions,
) -> Option<EditDescriptor> {
  if original == target {
    return None;
  }

  let start = tracing::enabled!(tracing::Level::DEBUG).then(Instant::now);
  let len_chars = original.len_chars() + target.len_chars();

  let known_equal = if len_chars >= options.line_diff_min_chars {
    unchanged_lines(original.slice(..), target.slice(..), options)
  } else {
    None
  };
  let (prefix, suffix) = known_equal.unwrap_or((0, 0));
  let window = collapse(original.slice(..), target.slice(..), prefix, suffix);

  let edit = match window {
    Some(window) => EditDescriptor::from_window(original, target, &window),
    None => {
      tracing::warn!(
        prefix,
        suffix,
        "inconsistent diff bounds, replacing the whole text"
      );
      EditDescriptor::full_replace(original, target)
    },
  };

  let edit = if options.verify && !edit.round_trips() {
    tracing::warn!(
      offset = edit.range_offset,
      length = edit.range_length,
      "diff window does not reproduce the target, replacing the whole text"
    );
    EditDescriptor::full_replace(original, target)
  } else {
    edit
  };

  if let Some(start) = start {
    tracing::debug!(
      "snapshot diff took {}s ({} chars)",
      Instant::now().duration_since(start).as_secs_f64(),
      len_chars
    );
  }
  Some(edit)
}

/// Runs a line diff and returns how many chars at the start and at the end
/// of both texts lie outside every changed hunk.
fn unchanged_lines(
  before: RopeSlice,
  after: RopeSlice,
  options: &DiffOptions,
) -> Option<(usize, usize)> {
  let file = InternedInput::new(RopeLines(before), RopeLines(after));
  let mut diff = Diff::compute(Algorithm::Histogram, &file);
  diff.postprocess_with_heuristic(
    &file,
    IndentHeuristic::new(|token| {
      IndentLevel::for_ascii_line(file.interner[token].bytes(), options.indent_width)
    }),
  );

  let mut hunks = diff.hunks();
  let first = hunks.next()?;
  let (mut before_end, mut after_end) = (first.before.end, first.after.end);
  for hunk in hunks {
    before_end = hunk.before.end;
    after_end = hunk.after.end;
  }
  tracing::trace!(
    first_line = first.before.start,
    last_line = before_end,
    "line diff bounds"
  );

  // Lines before the first hunk pair up one to one, so they cover the same
  // chars in both texts.
  let prefix = line_to_char(before, first.before.start)?;
  let suffix = before.len_chars() - line_to_char(before, before_end)?;
  let after_suffix = after.len_chars() - line_to_char(after, after_end)?;
  (suffix == after_suffix).then_some((prefix, suffix))
}

fn line_to_char(text: RopeSlice, line: u32) -> Option<usize> {
  let line = line as usize;
  (line <= text.len_lines()).then(|| text.line_to_char(line))
}

/// Extends the known-equal `prefix` and `suffix` char by char and returns the
/// changed window between them. `None` when the bounds do not fit the texts.
fn collapse(before: RopeSlice, after: RopeSlice, prefix: usize, suffix: usize) -> Option<Window> {
  let len_before = before.len_chars();
  let len_after = after.len_chars();
  let shortest = len_before.min(len_after);
  if prefix > shortest || suffix > shortest {
    return None;
  }

  let mut prefix = prefix;
  let mut b = before.chars_at(prefix);
  let mut a = after.chars_at(prefix);
  while prefix < shortest {
    match (b.next(), a.next()) {
      (Some(x), Some(y)) if x == y => prefix += 1,
      _ => break,
    }
  }

  // The suffix may not reach back into the prefix: "aa" -> "aaa" inserts at
  // the end, it does not overlap both.
  let max_suffix = shortest - prefix;
  let mut suffix = suffix.min(max_suffix);
  let mut b = before.chars_at(len_before - suffix);
  let mut a = after.chars_at(len_after - suffix);
  while suffix < max_suffix {
    match (b.prev(), a.prev()) {
      (Some(x), Some(y)) if x == y => suffix += 1,
      _ => break,
    }
  }

  Some(Window {
    before: prefix..len_before - suffix,
    after:  prefix..len_after - suffix,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn edit(a: &str, b: &str) -> EditDescriptor {
    diff(&Rope::from(a), &Rope::from(b)).unwrap()
  }

  fn window(a: &str, b: &str) -> (usize, usize, String) {
    let edit = edit(a, b);
    (edit.range_offset, edit.range_length, edit.range_text)
  }

  fn test_identity(a: &str, b: &str) {
    let mut old = Rope::from(a);
    let new = Rope::from(b);
    if let Some(edit) = diff(&old, &new) {
      assert!(edit.apply(&mut old));
    }
    assert_eq!(old, new);
  }

  quickcheck::quickcheck! {
      fn diff_round_trips(a: String, b: String) -> bool {
          let mut old = Rope::from(a);
          let new = Rope::from(b);
          match diff(&old, &new) {
            Some(edit) => edit.apply(&mut old) && old == new,
            None => old == new,
          }
      }

      fn diff_of_equal_texts_is_none(a: String) -> bool {
          diff(&Rope::from(a.as_str()), &Rope::from(a.as_str())).is_none()
      }

      fn window_never_exceeds_full_replace(a: String, b: String) -> bool {
          let old = Rope::from(a);
          let new = Rope::from(b);
          diff(&old, &new).is_none_or(|edit| {
            edit.range_length <= old.len_chars()
              && edit.range_text.chars().count() <= new.len_chars()
          })
      }

      fn line_diff_agrees_with_char_scan(a: Vec<bool>, b: Vec<bool>) -> bool {
          let lines = |v: &[bool]| -> String {
            v.iter().map(|&x| if x { "alpha\n" } else { "beta gamma\n" }).collect()
          };
          let old = Rope::from(lines(&a));
          let new = Rope::from(lines(&b));
          let eager = DiffOptions {
            line_diff_min_chars: 0,
            ..DiffOptions::default()
          };
          let lazy = DiffOptions {
            line_diff_min_chars: usize::MAX,
            ..DiffOptions::default()
          };
          diff_with_options(&old, &new, &eager) == diff_with_options(&old, &new, &lazy)
      }

      fn insertion_is_a_pure_insert(a: String, at: usize, ins: String) -> bool {
          if ins.is_empty() {
            return true;
          }
          let chars: Vec<char> = a.chars().collect();
          let at = at % (chars.len() + 1);
          let b: String = chars[..at].iter().copied().chain(ins.chars()).chain(chars[at..].iter().copied()).collect();
          let edit = edit(&a, &b);
          edit.range_offset == common_prefix(&a, &b)
            && edit.is_insertion()
            && edit.range_text.chars().count() == ins.chars().count()
      }

      fn deletion_is_a_pure_delete(a: String, from: usize, len: usize) -> bool {
          let chars: Vec<char> = a.chars().collect();
          let from = from % (chars.len() + 1);
          let to = from + len % (chars.len() - from + 1);
          if from == to {
            return true;
          }
          let b: String = chars[..from].iter().chain(&chars[to..]).collect();
          let edit = edit(&a, &b);
          edit.range_offset == common_prefix(&a, &b)
            && edit.is_deletion()
            && edit.range_length == to - from
      }
  }

  fn common_prefix(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
  }

  #[test]
  fn equal_files() {
    assert!(diff(&Rope::from("foo"), &Rope::from("foo")).is_none());
    test_identity("foo", "foo");
  }

  #[test]
  fn trailing_newline() {
    test_identity("foo\n", "foo");
    test_identity("foo", "foo\n");
  }

  #[test]
  fn new_file() {
    assert_eq!(window("", "foo"), (0, 0, "foo".into()));
  }

  #[test]
  fn deleted_file() {
    assert_eq!(window("foo", ""), (0, 3, String::new()));
  }

  #[test]
  fn insertion_starts_at_first_difference() {
    let edit = edit("hello world", "hello brave world");
    assert!(edit.is_insertion());
    assert_eq!(edit.range_offset, 6);
    assert_eq!(edit.range_text, "brave ");

    // Repeated characters: the insertion lands after the shared prefix.
    assert_eq!(window("aa", "aaa"), (2, 0, "a".into()));
    assert_eq!(window("ab", "aab"), (1, 0, "a".into()));
  }

  #[test]
  fn deletion_starts_at_first_difference() {
    let edit = edit("hello brave world", "hello world");
    assert!(edit.is_deletion());
    assert_eq!((edit.range_offset, edit.range_length), (6, 6));
    assert_eq!(window("aab", "ab"), (1, 1, String::new()));
  }

  #[test]
  fn disjoint_runs_collapse_into_one_window() {
    // Both the 'a' and the 'e' changed; "bcd" in between is replaced too.
    assert_eq!(window("abcde", "XbcdY"), (0, 5, "XbcdY".into()));
    assert_eq!(window("_abcde_", "_XbcdY_"), (1, 5, "XbcdY".into()));
  }

  #[test]
  fn disjoint_content_spans_everything() {
    let edit = edit("abc", "xyz");
    assert!(edit.is_full_replace());
    assert_eq!(edit.range_text, "xyz");
  }

  #[test]
  fn multiline_change_uses_line_bounds() {
    let before: String = (0..400).map(|i| format!("line {i}\n")).collect();
    let after = before.replace("line 200\n", "line two hundred\nline 200b\n");
    let options = DiffOptions {
      line_diff_min_chars: 0,
      ..DiffOptions::default()
    };
    let old = Rope::from(before.as_str());
    let new = Rope::from(after.as_str());
    let edit = diff_with_options(&old, &new, &options).unwrap();
    assert!(edit.round_trips());
    let offset = before.find("line 200\n").unwrap() + "line ".len();
    assert_eq!(edit.range_offset, offset);
    assert_eq!(edit.range_length, 3);
    assert_eq!(edit.range_text, "two hundred\nline 200b");
  }

  #[test]
  fn counts_chars_not_bytes() {
    assert_eq!(window("héllo", "héllo!"), (5, 0, "!".into()));
    assert_eq!(window("日本語", "日本人語"), (2, 0, "人".into()));
  }

  #[test]
  fn inconsistent_bounds_fall_back_to_full_replace() {
    let before = Rope::from("abc");
    let after = Rope::from("abd");
    assert!(collapse(before.slice(..), after.slice(..), 5, 0).is_none());
    let full = EditDescriptor::full_replace(&before, &after);
    assert!(full.round_trips());
    assert!(full.is_full_replace());
  }
}
