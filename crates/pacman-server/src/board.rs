//! Board state and the mechanics that mutate it.
//!
//! Every mutator here assumes its caller already holds the board's write
//! lock; every read that feeds a frame assumes the caller holds at least a
//! read lock. The lock itself is owned one level up, by `Session`, so that
//! the "never hold a lock while writing to a pipe" discipline the session
//! runtime enforces is visible at the call site rather than buried here.

use crate::command::{Command, Direction};
use crate::level::{ParsedLevel, Terrain};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellContent {
  Empty,
  Wall,
  Pacman,
  Ghost,
}

impl CellContent {
  /// The BOARD frame's content byte is the closed set `{' ', 'X', 'P', 'M'}`;
  /// `has_dot`/`has_portal` are internal board state, never folded into it.
  fn as_byte(self) -> u8 {
    match self {
      CellContent::Empty => b' ',
      CellContent::Wall => b'X',
      CellContent::Pacman => b'P',
      CellContent::Ghost => b'M',
    }
  }
}

#[derive(Debug, Clone)]
struct Cell {
  terrain: Terrain,
  has_dot: bool,
}

#[derive(Debug, Clone)]
pub struct Pacman {
  pub x: i32,
  pub y: i32,
  pub alive: bool,
  pub points: i32,
  pub passo: u32,
  pub waiting: u32,
}

#[derive(Debug, Clone)]
pub struct Ghost {
  pub x: i32,
  pub y: i32,
  pub passo: u32,
  pub waiting: u32,
  pub script: Vec<Command>,
  pub current_move: usize,
}

/// Outcome of a single `move_pacman` call, reported so the session can act
/// on level/game transitions without reaching back into board internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
  Moved,
  Blocked,
  ReachedPortal,
  CaughtByGhost,
}

pub struct Board {
  pub width: i32,
  pub height: i32,
  pub tempo: i32,
  cells: Vec<Cell>,
  pub pacman: Pacman,
  pub ghosts: Vec<Ghost>,
  pub player_id: String,
}

impl Board {
  fn idx(&self, x: i32, y: i32) -> usize {
    (y * self.width + x) as usize
  }

  fn in_bounds(&self, x: i32, y: i32) -> bool {
    x >= 0 && y >= 0 && x < self.width && y < self.height
  }

  fn terrain_at(&self, x: i32, y: i32) -> Terrain {
    self.cells[self.idx(x, y)].terrain
  }

  /// Renders the current content byte of every cell, suitable for a BOARD
  /// frame body. Must be called with at least a read lock held.
  pub fn get_board_displayed(&self) -> Vec<u8> {
    let mut out = vec![CellContent::Empty.as_byte(); (self.width * self.height) as usize];
    for (i, cell) in self.cells.iter().enumerate() {
      if matches!(cell.terrain, Terrain::Wall) {
        out[i] = CellContent::Wall.as_byte();
      }
    }
    if self.pacman.alive {
      let idx = self.idx(self.pacman.x, self.pacman.y);
      out[idx] = CellContent::Pacman.as_byte();
    }
    for ghost in &self.ghosts {
      let idx = self.idx(ghost.x, ghost.y);
      out[idx] = CellContent::Ghost.as_byte();
    }
    out
  }

  /// Applies one pacman command. The caller is responsible for resetting
  /// `passo`/`waiting` beforehand when the command is client-driven (PLAY
  /// bypasses the library's own cadence, see `SPEC_FULL.md` Design Notes).
  pub fn move_pacman(&mut self, mut cmd: Command) -> MoveOutcome {
    if !self.pacman.alive {
      return MoveOutcome::Blocked;
    }
    let direction = resolve_random(cmd.direction);
    cmd.direction = direction;
    let (dx, dy) = direction.delta();
    let (nx, ny) = (self.pacman.x + dx, self.pacman.y + dy);
    if !self.in_bounds(nx, ny) || matches!(self.terrain_at(nx, ny), Terrain::Wall) {
      return MoveOutcome::Blocked;
    }
    self.pacman.x = nx;
    self.pacman.y = ny;

    let idx = self.idx(nx, ny);
    if self.cells[idx].has_dot {
      self.cells[idx].has_dot = false;
      self.pacman.points += 1;
    }

    if self.ghosts.iter().any(|g| g.x == nx && g.y == ny) {
      self.pacman.alive = false;
      return MoveOutcome::CaughtByGhost;
    }

    if matches!(self.terrain_at(nx, ny), Terrain::Portal) {
      return MoveOutcome::ReachedPortal;
    }
    MoveOutcome::Moved
  }

  /// Applies one tick of ghost `i`'s movement: a scripted or random step,
  /// gated by its `passo`/`waiting` cadence.
  pub fn move_ghost(&mut self, i: usize) {
    if self.ghosts[i].waiting > 0 {
      self.ghosts[i].waiting -= 1;
      return;
    }
    self.ghosts[i].waiting = self.ghosts[i].passo;

    let cmd = self.next_ghost_command(i);
    let direction = resolve_random(cmd.direction);
    let (dx, dy) = direction.delta();
    let ghost = &mut self.ghosts[i];
    let (nx, ny) = (ghost.x + dx, ghost.y + dy);
    if self.in_bounds(nx, ny) && !matches!(self.terrain_at(nx, ny), Terrain::Wall) {
      let ghost = &mut self.ghosts[i];
      ghost.x = nx;
      ghost.y = ny;
    }
    if self.pacman.alive && self.ghosts[i].x == self.pacman.x && self.ghosts[i].y == self.pacman.y
    {
      self.pacman.alive = false;
    }
  }

  fn next_ghost_command(&mut self, i: usize) -> Command {
    let ghost = &mut self.ghosts[i];
    if ghost.script.is_empty() {
      return Command::once(Direction::Random);
    }
    let n = ghost.script.len();
    let done = ghost.script[ghost.current_move].consume_turn();
    let cmd = ghost.script[ghost.current_move];
    if done {
      ghost.current_move = (ghost.current_move + 1) % n;
    }
    cmd
  }
}

fn resolve_random(direction: Direction) -> Direction {
  if direction != Direction::Random {
    return direction;
  }
  const CHOICES: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
  ];
  CHOICES[rand::rng().random_range(0..CHOICES.len())]
}

/// Loads a parsed level into a fresh `Board`, carrying `score_accumulated`
/// into the pacman's starting points so score survives across levels.
pub fn load_level(parsed: ParsedLevel, player_id: String, score_accumulated: i32) -> Board {
  let cells = parsed
    .terrain
    .iter()
    .zip(parsed.dots.iter())
    .map(|(&terrain, &has_dot)| Cell { terrain, has_dot })
    .collect();

  let ghosts = parsed
    .ghosts
    .into_iter()
    .map(|g| Ghost {
      x: g.x,
      y: g.y,
      passo: g.passo,
      waiting: g.passo,
      script: g.script,
      current_move: 0,
    })
    .collect();

  Board {
    width: parsed.width,
    height: parsed.height,
    tempo: parsed.tempo,
    cells,
    pacman: Pacman {
      x: parsed.pacman.x,
      y: parsed.pacman.y,
      alive: true,
      points: score_accumulated,
      passo: parsed.pacman.passo,
      waiting: parsed.pacman.passo,
    },
    ghosts,
    player_id,
  }
}

/// Releases a board's resources. The board owns no external handles, so
/// this exists as the named counterpart the session runtime calls, kept
/// symmetric with `load_level` and the point at which the active-games
/// slot has already been cleared by the caller.
pub fn unload_level(_board: Board) {}

/// Shared, lock-protected handle to a board, held by a session's tasks and
/// (weakly, via the active-games table) by the diagnostic dumper.
pub type BoardHandle = Arc<RwLock<Board>>;

#[cfg(test)]
mod tests {
  use super::*;
  use crate::level::{ParsedGhost, ParsedPacman};

  fn simple_level() -> ParsedLevel {
    // . . @
    // . X .
    ParsedLevel {
      width: 3,
      height: 2,
      tempo: 10,
      terrain: vec![
        Terrain::Empty,
        Terrain::Empty,
        Terrain::Portal,
        Terrain::Empty,
        Terrain::Wall,
        Terrain::Empty,
      ],
      dots: vec![true, true, false, true, false, true],
      pacman: ParsedPacman {
        x: 0,
        y: 0,
        passo: 0,
      },
      ghosts: vec![],
    }
  }

  #[test]
  fn move_pacman_collects_dot_and_advances() {
    let mut board = load_level(simple_level(), "p1".to_string(), 0);
    let outcome = board.move_pacman(Command::once(Direction::Right));
    assert_eq!(outcome, MoveOutcome::Moved);
    assert_eq!(board.pacman.points, 1);
    assert_eq!((board.pacman.x, board.pacman.y), (1, 0));
  }

  #[test]
  fn move_pacman_blocked_by_wall() {
    let mut board = load_level(simple_level(), "p1".to_string(), 0);
    board.pacman.x = 0;
    board.pacman.y = 1;
    let outcome = board.move_pacman(Command::once(Direction::Right));
    assert_eq!(outcome, MoveOutcome::Blocked);
    assert_eq!((board.pacman.x, board.pacman.y), (0, 1));
  }

  #[test]
  fn move_pacman_reaches_portal() {
    let mut board = load_level(simple_level(), "p1".to_string(), 0);
    board.pacman.x = 1;
    board.pacman.y = 0;
    let outcome = board.move_pacman(Command::once(Direction::Right));
    assert_eq!(outcome, MoveOutcome::ReachedPortal);
    assert!(board.pacman.alive);
  }

  #[test]
  fn ghost_catches_pacman() {
    let mut parsed = simple_level();
    parsed.ghosts.push(ParsedGhost {
      x: 1,
      y: 0,
      passo: 0,
      script: vec![Command::once(Direction::Left)],
    });
    let mut board = load_level(parsed, "p1".to_string(), 0);
    board.move_ghost(0);
    assert!(!board.pacman.alive);
  }

  #[test]
  fn score_carries_across_levels() {
    let board = load_level(simple_level(), "p1".to_string(), 7);
    assert_eq!(board.pacman.points, 7);
  }

  #[test]
  fn displayed_board_has_correct_length() {
    let board = load_level(simple_level(), "p1".to_string(), 0);
    let displayed = board.get_board_displayed();
    assert_eq!(displayed.len(), 6);
    assert_eq!(displayed[0], b'P');
  }
}
