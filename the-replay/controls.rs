//! Interactive playback controls read from stdin.

use std::{
  io::BufRead,
  time::Duration,
};

use anyhow::{
  Context,
  Result,
  bail,
};
use the_lib::transport::Command;
use the_replay_event::send_blocking;
use tokio::sync::{
  mpsc::Sender,
  oneshot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
  Player(Command),
  Quit,
}

/// Parses one input line. Blank lines without a space are ignored.
pub fn parse_control(line: &str) -> Result<Option<Control>> {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    let toggle = line.contains(' ').then_some(Control::Player(Command::TogglePlayPause));
    return Ok(toggle);
  }

  let (word, arg) = match trimmed.split_once(char::is_whitespace) {
    Some((word, arg)) => (word, Some(arg.trim())),
    None => (trimmed, None),
  };

  let command = match (word, arg) {
    ("p" | "play" | "pause", None) => Command::TogglePlayPause,
    ("q" | "quit", None) => return Ok(Some(Control::Quit)),
    ("seek", Some(ms)) => {
      let ms: u64 = ms
        .trim_end_matches("ms")
        .parse()
        .with_context(|| format!("invalid seek target '{ms}'"))?;
      Command::Seek(Duration::from_millis(ms))
    },
    ("speed", Some(speed)) => {
      let speed: f64 = speed
        .trim_end_matches('x')
        .parse()
        .with_context(|| format!("invalid speed '{speed}'"))?;
      Command::SetSpeed(speed)
    },
    ("file", Some(path)) => Command::SetActiveStream(path.into()),
    ("buffering", Some("on")) => Command::SetBuffering(true),
    ("buffering", Some("off")) => Command::SetBuffering(false),
    _ => bail!("unknown command '{trimmed}'"),
  };
  Ok(Some(Control::Player(command)))
}

/// Reads commands on a dedicated thread until `q`. `quit` fires on `q`; end of
/// input just stops reading.
pub fn spawn_reader(commands: Sender<Command>, quit: oneshot::Sender<()>) {
  // `send_blocking` may wait on a tokio timer.
  let handle = tokio::runtime::Handle::current();
  std::thread::spawn(move || {
    let _guard = handle.enter();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let line = match line {
        Ok(line) => line,
        Err(err) => {
          log::error!("failed to read stdin: {err}");
          break;
        },
      };
      match parse_control(&line) {
        Ok(Some(Control::Player(command))) => {
          if !send_blocking(&commands, command) {
            break;
          }
        },
        Ok(Some(Control::Quit)) => {
          let _ = quit.send(());
          return;
        },
        Ok(None) => {},
        Err(err) => eprintln!("{err:#}"),
      }
    }
    log::debug!("stopped reading playback controls");
  });
}
