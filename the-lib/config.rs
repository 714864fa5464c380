use std::{
  ops::RangeInclusive,
  time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::diff::DiffOptions;

/// Speeds the playback clock can represent without overflowing a `Duration`.
pub const SPEED_LIMITS: RangeInclusive<f64> = 0.001..=1000.0;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error(transparent)]
  Parse(#[from] toml::de::Error),
  #[error(
    "invalid speed bounds: min-speed = {min}, max-speed = {max} (need {} <= min-speed <= max-speed <= {})",
    SPEED_LIMITS.start(),
    SPEED_LIMITS.end()
  )]
  SpeedBounds { min: f64, max: f64 },
}

/// Playback tuning, usually read from the `[playback]` table of a TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlaybackConfig {
  /// Minimum time between two visible mutations of one buffer.
  pub throttle_interval_ms: u64,
  pub initial_speed:        f64,
  pub min_speed:            f64,
  pub max_speed:            f64,
  /// Start playing as soon as the session is loaded.
  pub autoplay:             bool,
  pub diff:                 DiffOptions,
}

impl Default for PlaybackConfig {
  fn default() -> Self {
    Self {
      throttle_interval_ms: 50,
      initial_speed:        1.0,
      min_speed:            0.1,
      max_speed:            16.0,
      autoplay:             false,
      diff:                 DiffOptions::default(),
    }
  }
}

impl PlaybackConfig {
  pub fn throttle_interval(&self) -> Duration {
    Duration::from_millis(self.throttle_interval_ms)
  }

  /// Clamps a requested speed into the configured bounds.
  pub fn clamp_speed(&self, speed: f64) -> f64 {
    // `f64::clamp` panics when min > max.
    speed.max(self.min_speed).min(self.max_speed)
  }

  /// Checks that the speed bounds form a usable, non-empty range.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let (min, max) = (self.min_speed, self.max_speed);
    if SPEED_LIMITS.contains(&min) && SPEED_LIMITS.contains(&max) && min <= max {
      Ok(())
    } else {
      Err(ConfigError::SpeedBounds { min, max })
    }
  }

  pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct File {
      playback: PlaybackConfig,
    }

    let config = toml::from_str::<File>(source)?.playback;
    config.validate()?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_file_uses_defaults() {
    assert_eq!(
      PlaybackConfig::from_toml("").unwrap(),
      PlaybackConfig::default()
    );
  }

  #[test]
  fn reads_playback_table() {
    let config = PlaybackConfig::from_toml(
      r#"
      [playback]
      throttle-interval-ms = 20
      initial-speed = 2.0
      autoplay = true

      [playback.diff]
      line-diff-min-chars = 0
      "#,
    )
    .unwrap();
    assert_eq!(config.throttle_interval(), Duration::from_millis(20));
    assert_eq!(config.initial_speed, 2.0);
    assert!(config.autoplay);
    assert_eq!(config.diff.line_diff_min_chars, 0);
    assert!(config.diff.verify);
    assert_eq!(config.max_speed, 16.0);
  }

  #[test]
  fn rejects_unknown_keys() {
    assert!(PlaybackConfig::from_toml("[playback]\nspeeed = 2.0\n").is_err());
  }

  #[test]
  fn clamps_speed() {
    let config = PlaybackConfig::default();
    assert_eq!(config.clamp_speed(100.0), 16.0);
    assert_eq!(config.clamp_speed(0.01), 0.1);
    assert_eq!(config.clamp_speed(1.5), 1.5);
  }

  #[test]
  fn rejects_unusable_speed_bounds() {
    for table in [
      "max-speed = 0.0",
      "max-speed = -2.0",
      "max-speed = 1e300",
      "min-speed = 0.0",
      "min-speed = 1e-300",
      "min-speed = 8.0\nmax-speed = 2.0",
      "max-speed = nan",
      "max-speed = inf",
    ] {
      let source = format!("[playback]\n{table}\n");
      assert!(
        matches!(
          PlaybackConfig::from_toml(&source),
          Err(ConfigError::SpeedBounds { .. })
        ),
        "accepted {table:?}"
      );
    }
    assert!(PlaybackConfig::from_toml("[playback]\nmin-speed = 2.0\nmax-speed = 2.0\n").is_ok());
  }
}
