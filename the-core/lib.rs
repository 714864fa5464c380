//! Text primitives shared by the replay engine: line ending detection and
//! conversion between linear character offsets and 1-indexed line/column
//! ranges.

pub mod line_ending;
pub mod position;
