//! Benchmarks for offset <-> line/column conversion in the-core.
//!
//! Run with: `cargo bench -p the-core --bench position`

use divan::{
  Bencher,
  black_box,
};
use ropey::Rope;
use the_core::position::{
  LineTable,
  to_offsets,
  to_range,
};

fn main() {
  divan::main();
}

fn make_text(lines: usize, line_ending: &str) -> Rope {
  let mut s = String::new();
  for i in 0..lines {
    s.push_str("let value_");
    s.push_str(&i.to_string());
    s.push_str(" = compute(input);");
    s.push_str(line_ending);
  }
  Rope::from_str(&s)
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn line_table_lf(bencher: Bencher, lines: usize) {
  let text = make_text(lines, "\n");
  bencher.bench(|| LineTable::new(black_box(text.slice(..))));
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn line_table_crlf(bencher: Bencher, lines: usize) {
  let text = make_text(lines, "\r\n");
  bencher.bench(|| LineTable::new(black_box(text.slice(..))));
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn range_round_trip(bencher: Bencher, lines: usize) {
  let text = make_text(lines, "\n");
  let offset = text.len_chars() / 2;
  bencher.bench(|| {
    let range = to_range(black_box(offset), 16, text.slice(..)).unwrap();
    to_offsets(&range, text.slice(..)).unwrap()
  });
}
