//! A single actor command: one step of movement, a random step, an idle
//! tick, or a repeat-count wrapper around the previous step.

use anyhow::{Result, bail};

/// One movement or control command applied to an actor on a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Up,
  Down,
  Left,
  Right,
  /// Random step, resolved by the caller at apply time.
  Random,
  /// Idle: no movement this tick.
  Idle,
  /// Repeat the previous directional step; `turns` carries the count.
  Repeat,
}

impl Direction {
  /// Maps a wire/script byte to a direction. `W/A/S/D` are movement,
  /// `R` is random, `C` is idle, `T` is repeat.
  pub fn from_byte(b: u8) -> Result<Self> {
    Ok(match b.to_ascii_uppercase() {
      b'W' => Direction::Up,
      b'S' => Direction::Down,
      b'A' => Direction::Left,
      b'D' => Direction::Right,
      b'R' => Direction::Random,
      b'C' => Direction::Idle,
      b'T' => Direction::Repeat,
      other => bail!("unknown direction byte {:?}", other as char),
    })
  }

  /// Resolves a direction into a `(dx, dy)` step. `Random` is resolved by
  /// the caller before reaching this point; `Idle`/`Repeat` never move.
  pub fn delta(self) -> (i32, i32) {
    match self {
      Direction::Up => (0, -1),
      Direction::Down => (0, 1),
      Direction::Left => (-1, 0),
      Direction::Right => (1, 0),
      Direction::Random | Direction::Idle | Direction::Repeat => (0, 0),
    }
  }
}

/// One command entry, either issued live (from a PLAY byte, always
/// `turns == 1`) or taken from a ghost's parsed move script (where a `T n`
/// entry carries `turns > 1`).
#[derive(Debug, Clone, Copy)]
pub struct Command {
  pub direction: Direction,
  pub turns: u32,
  pub turns_left: u32,
}

impl Command {
  /// A single-shot command, as produced by a live PLAY byte.
  pub fn once(direction: Direction) -> Self {
    Self {
      direction,
      turns: 1,
      turns_left: 1,
    }
  }

  /// A repeat-block command, as produced by a ghost script's `T n` entry.
  pub fn repeated(direction: Direction, turns: u32) -> Self {
    Self {
      direction,
      turns,
      turns_left: turns,
    }
  }

  /// Consumes one turn. Returns `true` once the block is exhausted and the
  /// script cursor should advance to the next entry.
  pub fn consume_turn(&mut self) -> bool {
    self.turns_left = self.turns_left.saturating_sub(1);
    self.turns_left == 0
  }
}
