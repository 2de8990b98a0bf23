//! Text-format parser for level (`.lvl`), pacman (`.p`) and ghost (`.m`)
//! files.
//!
//! Grammar (see `SPEC_FULL.md` §4.9): a `.lvl` file opens with `DIM w h`,
//! `TEMPO ms`, an optional `PAC <file>`, and zero or more `MON <file>`
//! header lines, then exactly `h` grid rows. `#`-prefixed and blank lines
//! are comments and are skipped wherever they appear among headers.

use crate::command::{Command, Direction};
use crate::protocol::{MAX_GHOSTS, MAX_MOVES};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

/// One cell's static content, independent of which actor currently
/// occupies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terrain {
  Empty,
  Wall,
  Portal,
}

#[derive(Debug, Clone)]
pub struct ParsedLevel {
  pub width: i32,
  pub height: i32,
  pub tempo: i32,
  pub terrain: Vec<Terrain>,
  pub dots: Vec<bool>,
  pub pacman: ParsedPacman,
  pub ghosts: Vec<ParsedGhost>,
}

#[derive(Debug, Clone)]
pub struct ParsedPacman {
  pub x: i32,
  pub y: i32,
  pub passo: u32,
}

#[derive(Debug, Clone)]
pub struct ParsedGhost {
  pub x: i32,
  pub y: i32,
  pub passo: u32,
  pub script: Vec<Command>,
}

/// Lists `*.lvl` files in `levels_dir`, sorted lexicographically by
/// filename, matching the server's level progression order.
pub fn discover_levels(levels_dir: &Path) -> Result<Vec<PathBuf>> {
  let mut levels = Vec::new();
  for entry in fs::read_dir(levels_dir)
    .with_context(|| format!("read levels dir {}", levels_dir.display()))?
  {
    let entry = entry?;
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) == Some("lvl") {
      levels.push(path);
    }
  }
  levels.sort();
  Ok(levels)
}

/// Parses a `.lvl` file and its associated `.p`/`.m` actor files, all
/// resolved relative to `levels_dir`.
pub fn parse_level(lvl_path: &Path, levels_dir: &Path) -> Result<ParsedLevel> {
  let text = fs::read_to_string(lvl_path)
    .with_context(|| format!("read level file {}", lvl_path.display()))?;
  let mut lines = meaningful_lines(&text);

  let mut width = None;
  let mut height = None;
  let mut tempo = None;
  let mut pac_file = None;
  let mut mon_files = Vec::new();

  loop {
    let Some(line) = lines.peek() else {
      bail!("level file {} ended before grid", lvl_path.display());
    };
    let mut parts = line.split_whitespace();
    match parts.next() {
      Some("DIM") => {
        let w: i32 = parts
          .next()
          .context("DIM missing width")?
          .parse()
          .context("DIM width not an integer")?;
        let h: i32 = parts
          .next()
          .context("DIM missing height")?
          .parse()
          .context("DIM height not an integer")?;
        width = Some(w);
        height = Some(h);
        lines.next();
      }
      Some("TEMPO") => {
        let ms: i32 = parts
          .next()
          .context("TEMPO missing value")?
          .parse()
          .context("TEMPO value not an integer")?;
        tempo = Some(ms);
        lines.next();
      }
      Some("PAC") => {
        pac_file = Some(parts.next().context("PAC missing filename")?.to_string());
        lines.next();
      }
      Some("MON") => {
        for name in parts {
          if mon_files.len() < MAX_GHOSTS - 1 {
            mon_files.push(name.to_string());
          }
        }
        lines.next();
      }
      _ => break,
    }
  }

  let width = width.with_context(|| format!("{} missing DIM header", lvl_path.display()))?;
  let height = height.with_context(|| format!("{} missing DIM header", lvl_path.display()))?;
  let tempo = tempo.unwrap_or(100);
  if width <= 0 || height <= 0 {
    bail!("{} declares a non-positive board size", lvl_path.display());
  }

  let mut terrain = vec![Terrain::Empty; (width * height) as usize];
  let mut dots = vec![false; (width * height) as usize];
  for row in 0..height {
    let line = lines
      .next()
      .with_context(|| format!("{} missing grid row {}", lvl_path.display(), row))?;
    let chars: Vec<char> = line.chars().collect();
    for col in 0..width {
      let idx = (row * width + col) as usize;
      let ch = chars.get(col as usize).copied().unwrap_or(' ');
      match ch {
        'X' => terrain[idx] = Terrain::Wall,
        '@' => terrain[idx] = Terrain::Portal,
        _ => dots[idx] = true,
      }
    }
  }

  let pacman = match pac_file {
    Some(name) => parse_pacman_file(&levels_dir.join(&name))?,
    None => default_pacman_position(&terrain, width, height),
  };

  let mut ghosts = Vec::new();
  for name in mon_files {
    ghosts.push(parse_ghost_file(&levels_dir.join(&name))?);
  }

  Ok(ParsedLevel {
    width,
    height,
    tempo,
    terrain,
    dots,
    pacman,
    ghosts,
  })
}

fn default_pacman_position(terrain: &[Terrain], width: i32, height: i32) -> ParsedPacman {
  for row in 0..height {
    for col in 0..width {
      let idx = (row * width + col) as usize;
      if terrain[idx] != Terrain::Wall {
        return ParsedPacman {
          x: col,
          y: row,
          passo: 0,
        };
      }
    }
  }
  ParsedPacman {
    x: 0,
    y: 0,
    passo: 0,
  }
}

fn parse_pacman_file(path: &Path) -> Result<ParsedPacman> {
  let text =
    fs::read_to_string(path).with_context(|| format!("read pacman file {}", path.display()))?;
  let mut x = 0;
  let mut y = 0;
  let mut passo = 0u32;
  for line in meaningful_lines(&text) {
    let mut parts = line.split_whitespace();
    match parts.next() {
      Some("POS") => {
        x = parts.next().context("POS missing x")?.parse()?;
        y = parts.next().context("POS missing y")?.parse()?;
      }
      Some("PASSO") => {
        passo = parts.next().context("PASSO missing value")?.parse()?;
      }
      _ => break,
    }
  }
  Ok(ParsedPacman { x, y, passo })
}

fn parse_ghost_file(path: &Path) -> Result<ParsedGhost> {
  let text =
    fs::read_to_string(path).with_context(|| format!("read ghost file {}", path.display()))?;
  let mut lines = meaningful_lines(&text);
  let mut x = 0;
  let mut y = 0;
  let mut passo = 0u32;

  loop {
    let Some(line) = lines.peek() else { break };
    let mut parts = line.split_whitespace();
    match parts.next() {
      Some("POS") => {
        x = parts.next().context("POS missing x")?.parse()?;
        y = parts.next().context("POS missing y")?.parse()?;
        lines.next();
      }
      Some("PASSO") => {
        passo = parts.next().context("PASSO missing value")?.parse()?;
        lines.next();
      }
      _ => break,
    }
  }

  let mut script = Vec::new();
  let mut last_direction = Direction::Idle;
  for line in lines {
    if script.len() >= MAX_MOVES {
      break;
    }
    let mut parts = line.split_whitespace();
    let Some(tok) = parts.next() else { continue };
    if tok.eq_ignore_ascii_case("T") {
      let n: u32 = parts
        .next()
        .context("T move missing repeat count")?
        .parse()
        .context("T repeat count not an integer")?;
      script.push(Command::repeated(last_direction, n));
    } else if tok.len() == 1 {
      let dir = Direction::from_byte(tok.as_bytes()[0])?;
      last_direction = dir;
      script.push(Command::once(dir));
    } else {
      bail!("unrecognized ghost move line {:?} in {}", line, path.display());
    }
  }
  Ok(ParsedGhost {
    x,
    y,
    passo,
    script,
  })
}

/// Strips blank lines and `#`-prefixed comments, yielding a peekable
/// iterator over the remaining trimmed lines.
fn meaningful_lines(text: &str) -> std::iter::Peekable<impl Iterator<Item = &str>> {
  text
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty() && !l.starts_with('#'))
    .peekable()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn parses_minimal_level_without_actor_files() {
    let dir = tempdir().unwrap();
    fs::write(
      dir.path().join("a.lvl"),
      "DIM 3 2\nTEMPO 50\n...\nX.X\n",
    )
    .unwrap();
    let level = parse_level(&dir.path().join("a.lvl"), dir.path()).unwrap();
    assert_eq!(level.width, 3);
    assert_eq!(level.height, 2);
    assert_eq!(level.tempo, 50);
    assert_eq!(level.terrain[3], Terrain::Wall);
    assert_eq!(level.terrain[5], Terrain::Wall);
    assert_eq!(level.terrain[4], Terrain::Empty);
  }

  #[test]
  fn parses_pacman_and_ghost_files() {
    let dir = tempdir().unwrap();
    fs::write(
      dir.path().join("a.lvl"),
      "DIM 4 1\nTEMPO 80\nPAC a.p\nMON a.m\n....\n",
    )
    .unwrap();
    fs::write(dir.path().join("a.p"), "POS 1 0\nPASSO 2\n").unwrap();
    fs::write(
      dir.path().join("a.m"),
      "POS 3 0\nPASSO 1\nW\nT 3\nR\n",
    )
    .unwrap();
    let level = parse_level(&dir.path().join("a.lvl"), dir.path()).unwrap();
    assert_eq!(level.pacman.x, 1);
    assert_eq!(level.pacman.passo, 2);
    assert_eq!(level.ghosts.len(), 1);
    let ghost = &level.ghosts[0];
    assert_eq!(ghost.x, 3);
    assert_eq!(ghost.script.len(), 3);
    assert_eq!(ghost.script[1].turns, 3);
  }

  #[test]
  fn discover_levels_sorts_lexicographically() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b.lvl"), "DIM 1 1\nTEMPO 1\n.\n").unwrap();
    fs::write(dir.path().join("a.lvl"), "DIM 1 1\nTEMPO 1\n.\n").unwrap();
    let found = discover_levels(dir.path()).unwrap();
    let names: Vec<_> = found
      .iter()
      .map(|p| p.file_name().unwrap().to_str().unwrap())
      .collect();
    assert_eq!(names, vec!["a.lvl", "b.lvl"]);
  }

  #[test]
  fn rejects_missing_dim() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.lvl"), "TEMPO 1\n.\n").unwrap();
    assert!(parse_level(&dir.path().join("a.lvl"), dir.path()).is_err());
  }
}
