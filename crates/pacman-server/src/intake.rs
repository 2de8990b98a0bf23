//! Main intake loop: accepts CONNECT frames off the rendezvous pipe,
//! enqueues them for the worker pool, and services the USR1 diagnostic
//! dump between blocking calls.

use crate::diagnostics;
use crate::pipes;
use crate::protocol::{self, ConnectRequest};
use crate::signals::SignalFlags;
use crate::worker::ActiveGamesTable;
use anyhow::{Result, bail};
use crossbeam_channel::{Sender, TrySendError};
use log::{info, warn};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

const BACKPRESSURE_POLL: Duration = Duration::from_millis(20);

/// Runs the intake loop until a shutdown signal fires. Returns once the
/// rendezvous pipe has been unlinked and the loop has exited cleanly.
pub fn run(
  rendezvous_path: &Path,
  requests: Sender<ConnectRequest>,
  signals: &SignalFlags,
  active_games: &ActiveGamesTable,
  scores_log: &Path,
) -> Result<()> {
  info!("intake: accepting connections on {}", rendezvous_path.display());
  while !signals.shutdown.load(Ordering::Acquire) {
    service_usr1(signals, active_games, scores_log);

    let fd = match pipes::open_read(rendezvous_path) {
      Ok(f) => f,
      Err(e) => {
        warn!("intake: failed to open rendezvous pipe: {e:#}");
        thread::sleep(BACKPRESSURE_POLL);
        continue;
      }
    };

    if signals.shutdown.load(Ordering::Acquire) {
      break;
    }

    let request = match protocol::read_connect_request(fd) {
      Ok(r) => r,
      Err(e) => {
        warn!("intake: malformed CONNECT frame: {e:#}");
        continue;
      }
    };

    if !enqueue_with_backpressure(&requests, request, signals, active_games, scores_log)? {
      break;
    }
  }

  pipes::remove_rendezvous_pipe(rendezvous_path);
  info!("intake: shut down");
  Ok(())
}

/// Pushes `request` into the bounded buffer, blocking (via polling) while
/// full. Returns `Ok(false)` if a shutdown arrived while waiting.
fn enqueue_with_backpressure(
  requests: &Sender<ConnectRequest>,
  request: ConnectRequest,
  signals: &SignalFlags,
  active_games: &ActiveGamesTable,
  scores_log: &Path,
) -> Result<bool> {
  let mut pending = request;
  loop {
    match requests.try_send(pending) {
      Ok(()) => return Ok(true),
      Err(TrySendError::Full(returned)) => {
        pending = returned;
        service_usr1(signals, active_games, scores_log);
        if signals.shutdown.load(Ordering::Acquire) {
          return Ok(false);
        }
        thread::sleep(BACKPRESSURE_POLL);
      }
      Err(TrySendError::Disconnected(_)) => bail!("worker pool's request channel is gone"),
    }
  }
}

fn service_usr1(signals: &SignalFlags, active_games: &ActiveGamesTable, scores_log: &Path) {
  if signals.usr1_pending.swap(false, Ordering::AcqRel)
    && let Err(e) = diagnostics::dump_top_scores(active_games, scores_log)
  {
    warn!("intake: failed to write diagnostic dump: {e:#}");
  }
}
