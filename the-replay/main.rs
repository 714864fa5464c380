use std::{
  fs::File,
  io::BufReader,
  path::Path,
  sync::Arc,
};

use anyhow::{
  Context,
  Result,
};
use clap::Parser;
use the_lib::{
  buffer::RopeBuffers,
  config::PlaybackConfig,
  playback::PlaybackState,
  runtime::spawn_player,
  timeline::Timeline,
  transport::{
    Command,
    Notification,
  },
};
use tokio::sync::{
  mpsc,
  oneshot,
};

use crate::cli::Cli;

mod cli;
mod controls;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::setup_logging(cli.verbosity, cli.log_file.as_deref())?;

  let mut config = match &cli.config_file {
    Some(path) => load_config(path)?,
    // Without a config file the replay starts right away.
    None => PlaybackConfig {
      autoplay: true,
      ..PlaybackConfig::default()
    },
  };
  apply_overrides(&cli, &mut config);

  let timeline = load_timeline(&cli.timeline)?;
  log::info!(
    "loaded {} files spanning {}ms from {}",
    timeline.len_streams(),
    timeline.total_duration(),
    cli.timeline.display()
  );
  if let Some(stream) = &cli.stream {
    if timeline.stream(stream).is_none() {
      anyhow::bail!("the recording has no file named {stream}");
    }
  }

  let (notify_tx, mut notifications) = mpsc::unbounded_channel();
  let player = spawn_player(Arc::new(timeline), RopeBuffers::new(), notify_tx, config);

  if let Some(stream) = cli.stream.clone() {
    player.send(Command::SetActiveStream(stream.into())).await;
  }
  if let Some(seek) = cli.seek {
    player.send(Command::Seek(seek)).await;
  }

  let (quit_tx, mut quit_rx) = oneshot::channel();
  controls::spawn_reader(player.commands(), quit_tx);
  let mut reading = true;

  loop {
    tokio::select! {
      notification = notifications.recv() => {
        let Some(notification) = notification else { break };
        print_notification(&notification);
        if notification.state == PlaybackState::Ended && !cli.keep_open {
          break;
        }
      },
      quit = &mut quit_rx, if reading => match quit {
        Ok(()) => break,
        // Input ended without `q`; play on.
        Err(_) => reading = false,
      },
    }
  }

  player.send(Command::Shutdown).await;
  let scheduler = player.join().await.context("replay task failed")?;

  if cli.print_final {
    for (stream, buffer) in scheduler.buffers().streams() {
      println!("=== {stream} ({}) ===", buffer.language);
      let text = buffer.text.to_string();
      print!("{text}");
      if !text.ends_with('\n') {
        println!();
      }
    }
  }
  Ok(())
}

/// Flags given on the command line win over the config file. `--paused` only
/// ever turns autoplay off.
fn apply_overrides(cli: &Cli, config: &mut PlaybackConfig) {
  if let Some(speed) = cli.speed {
    config.initial_speed = speed;
  }
  if cli.paused {
    config.autoplay = false;
  }
}

fn load_config(path: &Path) -> Result<PlaybackConfig> {
  let source = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read config {}", path.display()))?;
  PlaybackConfig::from_toml(&source)
    .with_context(|| format!("invalid config {}", path.display()))
}

fn load_timeline(path: &Path) -> Result<Timeline> {
  let file =
    File::open(path).with_context(|| format!("failed to open timeline {}", path.display()))?;
  Timeline::from_reader(BufReader::new(file))
    .with_context(|| format!("invalid timeline {}", path.display()))
}

fn print_notification(notification: &Notification) {
  println!(
    "{:>9.3}s  {}",
    notification.virtual_time.as_secs_f64(),
    notification.state
  );
}
