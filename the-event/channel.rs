//! Helpers for handing commands from synchronous code to the async player.

use std::time::Duration;

use futures_executor::block_on;
use tokio::sync::mpsc::{
  Sender,
  error::TrySendError,
};

/// How long a control waits for room in a full command queue before it is
/// given up on.
const SEND_TIMEOUT_MS: u64 = 2;

/// Queues `data` from synchronous code, such as a thread reading controls.
///
/// A queue with room takes the value at once. A full queue gets
/// `SEND_TIMEOUT_MS` to drain, after which the value is dropped with a warning
/// so the reader never stalls behind a busy player. The wait uses a tokio
/// timer, so the calling thread must have entered a runtime.
///
/// `false` when the value was dropped or the player is gone.
pub fn send_blocking<T>(tx: &Sender<T>, data: T) -> bool {
  match tx.try_send(data) {
    Ok(()) => true,
    Err(TrySendError::Full(data)) => {
      let sent = block_on(tx.send_timeout(data, Duration::from_millis(SEND_TIMEOUT_MS))).is_ok();
      if !sent {
        log::warn!("dropping message: channel stayed full for {SEND_TIMEOUT_MS}ms");
      }
      sent
    },
    Err(TrySendError::Closed(_)) => {
      log::warn!("dropping message: receiver is gone");
      false
    },
  }
}

/// Queues `data` only if there is room right now.
pub fn try_send<T>(tx: &Sender<T>, data: T) -> bool {
  tx.try_send(data).is_ok()
}

#[cfg(test)]
mod tests {
  use tokio::sync::mpsc;

  use super::*;

  #[test]
  fn reports_full_and_closed_channels() {
    let (tx, mut rx) = mpsc::channel(1);
    assert!(send_blocking(&tx, 1));
    assert!(!try_send(&tx, 2));
    assert_eq!(rx.try_recv().ok(), Some(1));
    assert!(try_send(&tx, 3));
    assert_eq!(rx.try_recv().ok(), Some(3));

    drop(rx);
    assert!(!send_blocking(&tx, 4));
  }

  #[test]
  fn gives_up_on_a_queue_that_stays_full() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let (tx, mut rx) = mpsc::channel(1);
    assert!(send_blocking(&tx, 1));
    assert!(!send_blocking(&tx, 2));
    assert_eq!(rx.try_recv().ok(), Some(1));
    assert!(rx.try_recv().is_err());
  }
}
