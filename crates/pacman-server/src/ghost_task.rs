//! Ghost task: one per ghost, advancing its position once per tick.

use crate::board::BoardHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Runs ghost `index` to completion on the calling thread.
///
/// Polls `running`/`level_finished` once per tick rather than blocking on
/// anything, so cancellation is always cooperative and prompt.
pub fn run(
  index: usize,
  board: BoardHandle,
  running: Arc<AtomicBool>,
  level_finished: Arc<AtomicBool>,
) {
  while running.load(Ordering::Acquire) && !level_finished.load(Ordering::Acquire) {
    let tempo_ms = {
      let mut board = board.write();
      board.move_ghost(index);
      board.tempo.max(1) as u64
    };
    thread::sleep(Duration::from_millis(tempo_ms));
  }
}
