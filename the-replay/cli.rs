use std::{
  path::PathBuf,
  time::Duration,
};

use clap::{
  ArgAction,
  Parser,
};

#[derive(Parser, Debug)]
#[command(name = "the-replay", about, version, long_about = None)]
pub struct Cli {
  /// Recorded session: a JSON array of change steps
  #[arg(value_name = "TIMELINE")]
  pub timeline: PathBuf,

  /// Playback speed multiplier
  #[arg(short = 's', long = "speed", value_name = "X", value_parser = parse_speed)]
  pub speed: Option<f64>,

  /// Start at this point of the recording, in milliseconds
  #[arg(long = "seek", value_name = "MS", value_parser = parse_millis)]
  pub seek: Option<Duration>,

  /// File to show first (defaults to the first file of the recording)
  #[arg(long = "stream", value_name = "FILE")]
  pub stream: Option<String>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE")]
  pub config_file: Option<PathBuf>,

  /// Wait for a `p` command instead of playing right away (wins over `autoplay`)
  #[arg(long = "paused")]
  pub paused: bool,

  /// Keep reading commands after the recording ends
  #[arg(long = "keep-open")]
  pub keep_open: bool,

  /// Print the final content of every file on exit
  #[arg(long = "print-final")]
  pub print_final: bool,

  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count)]
  pub verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE")]
  pub log_file: Option<PathBuf>,
}

pub fn parse_speed(value: &str) -> Result<f64, String> {
  let speed: f64 = value
    .trim_end_matches('x')
    .parse()
    .map_err(|_| format!("'{value}' is not a number"))?;
  if speed.is_finite() && speed > 0.0 {
    Ok(speed)
  } else {
    Err(format!("speed must be positive, got {value}"))
  }
}

pub fn parse_millis(value: &str) -> Result<Duration, String> {
  value
    .trim_end_matches("ms")
    .parse()
    .map(Duration::from_millis)
    .map_err(|_| format!("'{value}' is not a number of milliseconds"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn speeds() {
    assert_eq!(parse_speed("2"), Ok(2.0));
    assert_eq!(parse_speed("0.5x"), Ok(0.5));
    assert!(parse_speed("0").is_err());
    assert!(parse_speed("inf").is_err());
    assert!(parse_speed("fast").is_err());
  }

  #[test]
  fn flags() {
    let cli = Cli::try_parse_from([
      "the-replay",
      "session.json",
      "--speed",
      "4",
      "--seek",
      "1500ms",
      "-vv",
      "--print-final",
    ])
    .unwrap();
    assert_eq!(cli.timeline, PathBuf::from("session.json"));
    assert_eq!(cli.speed, Some(4.0));
    assert_eq!(cli.seek, Some(Duration::from_millis(1500)));
    assert_eq!(cli.verbosity, 2);
    assert!(cli.print_final);
    assert!(!cli.paused);
  }
}
