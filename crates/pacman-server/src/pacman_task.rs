//! Pacman task: drains the client's request pipe and applies PLAY /
//! DISCONNECT against the board.
//!
//! The request pipe is put in non-blocking mode so this task can poll
//! `running`/`level_finished` between read attempts instead of parking in
//! a blocking `read()` that only the client's next byte could wake (see
//! `SPEC_FULL.md` Design Notes on pacman task cancellation).

use crate::board::{BoardHandle, MoveOutcome};
use crate::command::{Command, Direction};
use crate::pipes;
use log::{debug, warn};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

const OP_PLAY: u8 = 2;
const OP_DISCONNECT: u8 = 3;

/// Runs the pacman task to completion on the calling thread. Intended to be
/// spawned on a dedicated named thread by the session runtime, once per
/// level.
pub fn run(
  mut request_pipe: File,
  board: BoardHandle,
  running: Arc<AtomicBool>,
  level_finished: Arc<AtomicBool>,
) {
  if let Err(e) = pipes::set_nonblocking(&request_pipe) {
    warn!("pacman task: failed to set non-blocking mode: {e:#}");
    return;
  }

  while running.load(Ordering::Acquire) && !level_finished.load(Ordering::Acquire) {
    let mut op = [0u8; 1];
    match request_pipe.read(&mut op) {
      Ok(0) => {
        debug!("pacman task: request pipe EOF, peer gone");
        running.store(false, Ordering::Release);
        break;
      }
      Ok(_) => {}
      Err(e) if e.kind() == ErrorKind::WouldBlock => {
        std::thread::sleep(POLL_INTERVAL);
        continue;
      }
      Err(e) => {
        warn!("pacman task: read error: {e:#}");
        running.store(false, Ordering::Release);
        break;
      }
    }

    match op[0] {
      OP_PLAY => {
        let dir_byte = match read_direction_byte(&mut request_pipe) {
          Some(b) => b,
          None => {
            running.store(false, Ordering::Release);
            break;
          }
        };
        let direction = match Direction::from_byte(dir_byte) {
          Ok(d) => d,
          Err(e) => {
            warn!("pacman task: {e:#}");
            continue;
          }
        };
        let outcome = {
          let mut board = board.write();
          // A live PLAY always moves now: client input bypasses the
          // library's own move cadence.
          board.pacman.alive = true;
          board.pacman.waiting = 0;
          board.move_pacman(Command::once(direction))
        };
        if outcome == MoveOutcome::ReachedPortal {
          level_finished.store(true, Ordering::Release);
        }
      }
      OP_DISCONNECT => {
        debug!("pacman task: client disconnected");
        running.store(false, Ordering::Release);
        break;
      }
      other => {
        warn!("pacman task: unknown op byte {other}");
      }
    }
  }
}

/// Reads the one direction byte that follows a PLAY op code, retrying
/// across `WouldBlock` since the fd is non-blocking. Returns `None` on
/// EOF or a real error.
fn read_direction_byte(pipe: &mut File) -> Option<u8> {
  loop {
    let mut byte = [0u8; 1];
    match pipe.read(&mut byte) {
      Ok(0) => return None,
      Ok(_) => return Some(byte[0]),
      Err(e) if e.kind() == ErrorKind::WouldBlock => {
        std::thread::sleep(POLL_INTERVAL);
        continue;
      }
      Err(e) => {
        warn!("pacman task: read error on direction byte: {e:#}");
        return None;
      }
    }
  }
}
