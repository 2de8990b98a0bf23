//! Per-connection level loop: from CONNECT ack through however many levels
//! the client survives, to final teardown.

use crate::board::{self, BoardHandle};
use crate::ghost_task;
use crate::level;
use crate::pacman_task;
use crate::pipes;
use crate::protocol::{self, BoardFrame, ConnectRequest};
use crate::worker::ActiveGamesTable;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Runs one client's session to completion: level discovery, handshake,
/// the level loop, and final pipe teardown. Errors here are session-scoped
/// and are logged by the caller; they never bring down the worker.
pub fn run(
  slot: usize,
  levels_dir: &Path,
  request: ConnectRequest,
  active_games: &ActiveGamesTable,
) -> Result<()> {
  let levels = level::discover_levels(levels_dir).context("discover levels")?;
  if levels.is_empty() {
    warn!("worker {slot}: no levels available, refusing session");
    return Ok(());
  }

  let notify_path = Path::new(&request.notify_pipe);
  let request_path = Path::new(&request.request_pipe);

  let mut notify = pipes::open_write(notify_path).context("open client notify pipe")?;
  let request_pipe = pipes::open_read(request_path).context("open client request pipe")?;

  protocol::write_connect_ack(&mut notify, 0).context("write CONNECT ack")?;

  let player_id = derive_player_id(request_path);
  let running = Arc::new(AtomicBool::new(true));
  let mut score_accumulated = 0i32;

  for (level_index, lvl_path) in levels.iter().enumerate() {
    if !running.load(Ordering::Acquire) {
      break;
    }
    let is_last_level = level_index + 1 == levels.len();

    let parsed = level::parse_level(lvl_path, levels_dir)
      .with_context(|| format!("parse level {}", lvl_path.display()))?;
    let tempo_ms = parsed.tempo.max(1) as u64;
    let ghost_count = parsed.ghosts.len();
    let board = board::load_level(parsed, player_id.clone(), score_accumulated);
    let board_handle: BoardHandle = Arc::new(RwLock::new(board));
    active_games.bind(slot, board_handle.clone());

    let level_finished = Arc::new(AtomicBool::new(false));

    let pacman_handle = {
      let request_pipe = request_pipe
        .try_clone()
        .context("clone request pipe for pacman task")
        .map_err(|e| {
          active_games.clear(slot);
          e
        })?;
      let board_handle = board_handle.clone();
      let running = running.clone();
      let level_finished = level_finished.clone();
      thread::Builder::new()
        .name(format!("pacman-{slot}"))
        .spawn(move || pacman_task::run(request_pipe, board_handle, running, level_finished))
        .context("spawn pacman task")
        .map_err(|e| {
          active_games.clear(slot);
          e
        })?
    };

    let ghost_handles: Vec<_> = match (0..ghost_count)
      .map(|i| {
        let board_handle = board_handle.clone();
        let running = running.clone();
        let level_finished = level_finished.clone();
        thread::Builder::new()
          .name(format!("ghost-{slot}-{i}"))
          .spawn(move || ghost_task::run(i, board_handle, running, level_finished))
          .context("spawn ghost task")
      })
      .collect::<Result<Vec<_>>>()
    {
      Ok(handles) => handles,
      Err(e) => {
        running.store(false, Ordering::Release);
        let _ = pacman_handle.join();
        active_games.clear(slot);
        return Err(e);
      }
    };

    info!("worker {slot}: level {} started", lvl_path.display());
    loop {
      let victory = is_last_level && level_finished.load(Ordering::Acquire);
      let frame = {
        let board = board_handle.read();
        let game_over = !board.pacman.alive;
        if game_over {
          running.store(false, Ordering::Release);
        }
        BoardFrame {
          width: board.width,
          height: board.height,
          tempo: board.tempo,
          victory: victory as i32,
          game_over: game_over as i32,
          points: board.pacman.points,
          cells: board.get_board_displayed(),
        }
      };

      if let Err(e) = protocol::write_board_frame(&mut notify, &frame) {
        debug!("worker {slot}: notify write failed, peer gone: {e:#}");
        running.store(false, Ordering::Release);
        break;
      }

      if !running.load(Ordering::Acquire) || level_finished.load(Ordering::Acquire) {
        break;
      }
      thread::sleep(Duration::from_millis(tempo_ms));
    }

    active_games.clear(slot);
    if running.load(Ordering::Acquire) {
      score_accumulated = board_handle.read().pacman.points;
    }

    let _ = pacman_handle.join();
    for handle in ghost_handles {
      let _ = handle.join();
    }

    match Arc::try_unwrap(board_handle) {
      Ok(lock) => board::unload_level(lock.into_inner()),
      Err(_) => debug!("worker {slot}: board handle still referenced at unload, skipping"),
    }

    if !running.load(Ordering::Acquire) {
      break;
    }
  }

  drop(request_pipe);
  drop(notify);
  info!("worker {slot}: session ended");
  Ok(())
}

/// Recovers a display id from the client's request pipe path
/// (`/tmp/<id>_request` by convention), falling back to the full path if
/// the convention isn't followed.
fn derive_player_id(request_path: &Path) -> String {
  request_path
    .file_stem()
    .and_then(|s| s.to_str())
    .and_then(|s| s.strip_suffix("_request"))
    .map(|s| s.to_string())
    .unwrap_or_else(|| request_path.display().to_string())
}
