use ropey::RopeSlice;

/// Line terminator convention of a recorded snapshot.
///
/// Recordings only ever distinguish between the two conventions editors
/// actually save with, so the exotic unicode separators are plain content
/// here.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum LineEnding {
  /// CarriageReturn followed by LineFeed.
  Crlf,

  /// U+000A -- LineFeed
  #[default]
  LF,
}

impl LineEnding {
  #[inline]
  pub const fn len_chars(&self) -> usize {
    match self {
      Self::Crlf => 2,
      Self::LF => 1,
    }
  }

  #[inline]
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::Crlf => "\u{000D}\u{000A}",
      Self::LF => "\u{000A}",
    }
  }

  // Normally we'd want to implement the FromStr trait, but in this case
  // that would force us into a different return type than
  // auto_detect_line_ending, which would be weird.
  #[allow(clippy::should_implement_trait)]
  #[inline]
  pub fn from_str(g: &str) -> Option<LineEnding> {
    match g {
      "\u{000D}\u{000A}" => Some(LineEnding::Crlf),
      "\u{000A}" => Some(LineEnding::LF),
      _ => None,
    }
  }
}

/// Attempts to detect what line ending the passed text uses.
///
/// The first terminator found decides: a `\n` preceded by `\r` is CRLF, a bare
/// `\n` is LF. Text without any `\n` has no detectable convention.
pub fn auto_detect_line_ending(text: RopeSlice) -> Option<LineEnding> {
  let mut prev = None;
  for ch in text.chars() {
    if ch == '\n' {
      return Some(if prev == Some('\r') {
        LineEnding::Crlf
      } else {
        LineEnding::LF
      });
    }
    prev = Some(ch);
  }

  None
}

/// Same as [`auto_detect_line_ending`] but falls back to LF, the convention
/// single-line snapshots are treated with.
#[inline]
pub fn detect_line_ending(text: RopeSlice) -> LineEnding {
  auto_detect_line_ending(text).unwrap_or_default()
}
