//! Bounded request queue, the active-games table, and the fixed-size
//! worker pool that runs one session per slot.

use crate::board::BoardHandle;
use crate::errors::ServerError;
use crate::protocol::ConnectRequest;
use crate::session;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

/// Capacity of the connection request buffer; the only source of
/// backpressure on new connections.
pub const REQUEST_BUFFER_CAPACITY: usize = 10;

/// Bounded producer/consumer queue between the intake task and the worker
/// pool. `crossbeam_channel`'s blocking `send`/`recv` plays the role of the
/// empty/full counting semaphores plus mutex described in the spec.
pub fn make_request_buffer() -> (Sender<ConnectRequest>, Receiver<ConnectRequest>) {
  bounded(REQUEST_BUFFER_CAPACITY)
}

/// Fixed-length table of the board currently owned by each worker slot,
/// used only for the diagnostic top-scores dump. Guarded by a single mutex
/// (`mutex_sessions` in the original design) rather than per-slot locks, so
/// a dump always observes one consistent point-in-time snapshot of which
/// slots are occupied.
pub struct ActiveGamesTable {
  slots: Mutex<Vec<Option<BoardHandle>>>,
}

impl ActiveGamesTable {
  pub fn new(max_games: usize) -> Self {
    Self {
      slots: Mutex::new(vec![None; max_games]),
    }
  }

  /// Binds `board` to `slot`. Called only after `load_level` succeeds.
  pub fn bind(&self, slot: usize, board: BoardHandle) {
    self.slots.lock().unwrap()[slot] = Some(board);
  }

  /// Clears `slot`. Called before `unload_level` runs.
  pub fn clear(&self, slot: usize) {
    self.slots.lock().unwrap()[slot] = None;
  }

  /// Returns `(player_id, points)` for every currently-bound slot.
  ///
  /// Clones the handles out from under the table mutex first, then reads
  /// each board after releasing it, so a live session's board lock is never
  /// contended while `slots` is held.
  pub fn snapshot_scores(&self) -> Vec<(String, i32)> {
    let handles: Vec<BoardHandle> = {
      let slots = self.slots.lock().unwrap();
      slots.iter().filter_map(|slot| slot.clone()).collect()
    };
    handles
      .iter()
      .map(|board| {
        let board = board.read();
        (board.player_id.clone(), board.pacman.points)
      })
      .collect()
  }
}

/// Spawns `max_games` worker threads, each pulling from `requests` and
/// running one session at a time against its own slot in `active_games`.
pub fn spawn_workers(
  max_games: usize,
  levels_dir: PathBuf,
  requests: Receiver<ConnectRequest>,
  active_games: Arc<ActiveGamesTable>,
  shutdown: Arc<std::sync::atomic::AtomicBool>,
) -> Result<Vec<thread::JoinHandle<()>>> {
  (0..max_games)
    .map(|slot| {
      let requests = requests.clone();
      let active_games = active_games.clone();
      let levels_dir = levels_dir.clone();
      let shutdown = shutdown.clone();
      thread::Builder::new()
        .name(format!("worker-{slot}"))
        .spawn(move || worker_loop(slot, levels_dir, requests, active_games, shutdown))
        .map_err(|e| ServerError::WorkerSpawn(e).into())
    })
    .collect()
}

fn worker_loop(
  slot: usize,
  levels_dir: PathBuf,
  requests: Receiver<ConnectRequest>,
  active_games: Arc<ActiveGamesTable>,
  shutdown: Arc<std::sync::atomic::AtomicBool>,
) {
  while let Ok(request) = requests.recv() {
    if shutdown.load(std::sync::atomic::Ordering::Acquire) {
      break;
    }
    info!("worker {slot}: picked up connection request");
    if let Err(e) = session::run(slot, &levels_dir, request, &active_games) {
      error!("worker {slot}: session ended with error: {e:#}");
    }
    active_games.clear(slot);
  }
  info!("worker {slot}: request channel closed, exiting");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::board;
  use crate::level::{ParsedGhost, ParsedLevel, ParsedPacman};
  use crate::level::Terrain;

  fn tiny_board() -> BoardHandle {
    let parsed = ParsedLevel {
      width: 1,
      height: 1,
      tempo: 10,
      terrain: vec![Terrain::Empty],
      dots: vec![false],
      pacman: ParsedPacman {
        x: 0,
        y: 0,
        passo: 0,
      },
      ghosts: Vec::<ParsedGhost>::new(),
    };
    Arc::new(parking_lot::RwLock::new(board::load_level(
      parsed,
      "p1".to_string(),
      3,
    )))
  }

  #[test]
  fn bind_and_clear_round_trip() {
    let table = ActiveGamesTable::new(2);
    assert!(table.snapshot_scores().is_empty());
    table.bind(0, tiny_board());
    assert_eq!(table.snapshot_scores(), vec![("p1".to_string(), 3)]);
    table.clear(0);
    assert!(table.snapshot_scores().is_empty());
  }
}
