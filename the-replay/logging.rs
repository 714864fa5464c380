use std::path::Path;

use anyhow::{
  Context,
  Result,
};

/// Routes `log` records (and `tracing` events, through its `log` feature) to
/// stderr or `log_file`.
pub fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
  let level = match verbosity {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _3_or_more => log::LevelFilter::Trace,
  };

  let dispatch = fern::Dispatch::new().level(level).format(|out, message, record| {
    out.finish(format_args!(
      "{} {} [{}] {}",
      chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
      record.target(),
      record.level(),
      message
    ))
  });

  let dispatch = match log_file {
    Some(path) => {
      let file = fern::log_file(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
      dispatch.chain(file)
    },
    None => dispatch.chain(std::io::stderr()),
  };

  dispatch.apply().context("failed to install logger")
}
