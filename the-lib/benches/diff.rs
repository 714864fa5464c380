//! Benchmarks for snapshot diffing in the-lib.
//!
//! Run with: `cargo bench -p the-lib --bench diff`

use divan::{
  Bencher,
  black_box,
};
use ropey::Rope;
use the_lib::diff::{
  DiffOptions,
  diff,
  diff_with_options,
};

fn main() {
  divan::main();
}

fn make_source(lines: usize) -> String {
  let mut s = String::new();
  for i in 0..lines {
    s.push_str("    let value_");
    s.push_str(&i.to_string());
    s.push_str(" = compute(input, ");
    s.push_str(&(i % 7).to_string());
    s.push_str(");\n");
  }
  s
}

/// A single typed character in the middle of the file.
fn keystroke(lines: usize) -> (Rope, Rope) {
  let before = make_source(lines);
  let mid = before.len() / 2;
  let mut after = before.clone();
  after.insert(mid, 'x');
  (Rope::from(before), Rope::from(after))
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn keystroke_in_middle(bencher: Bencher, lines: usize) {
  let (before, after) = keystroke(lines);
  bencher.bench(|| black_box(diff(black_box(&before), black_box(&after))));
}

#[divan::bench(args = [1_000, 10_000])]
fn keystroke_char_scan_only(bencher: Bencher, lines: usize) {
  let (before, after) = keystroke(lines);
  let options = DiffOptions {
    line_diff_min_chars: usize::MAX,
    ..DiffOptions::default()
  };
  bencher.bench(|| {
    black_box(diff_with_options(
      black_box(&before),
      black_box(&after),
      &options,
    ))
  });
}

#[divan::bench(args = [100, 1_000])]
fn pasted_block(bencher: Bencher, lines: usize) {
  let before = make_source(lines);
  let mid = before.len() / 2;
  let mut after = before.clone();
  after.insert_str(mid, &make_source(lines / 4));
  let (before, after) = (Rope::from(before), Rope::from(after));
  bencher.bench(|| black_box(diff(black_box(&before), black_box(&after))));
}

#[divan::bench(args = [1_000, 10_000])]
fn unchanged(bencher: Bencher, lines: usize) {
  let text = Rope::from(make_source(lines));
  let other = text.clone();
  bencher.bench(|| black_box(diff(black_box(&text), black_box(&other))));
}
