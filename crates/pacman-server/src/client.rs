//! Display client library code: connection handshake, keyboard/command-file
//! input, and plain-text board rendering. `bin/client.rs` is a thin CLI
//! wrapper around `run`.

use crate::config::ClientConfig;
use crate::pipes;
use crate::protocol::{self, BoardFrame, ConnectRequest};
use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal;
use log::{info, warn};
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

/// Sleep between replayed moves until the first BOARD frame reports the
/// level's real `tempo`.
const DEFAULT_REPLAY_TEMPO_MS: i32 = 100;

/// Enables raw terminal mode for the lifetime of this guard.
struct RawModeGuard;
impl RawModeGuard {
  fn enable() -> Result<Self> {
    terminal::enable_raw_mode().context("enable raw terminal mode")?;
    Ok(Self)
  }
}
impl Drop for RawModeGuard {
  fn drop(&mut self) {
    let _ = terminal::disable_raw_mode();
  }
}

/// Creates this client's own pipes, connects, plays, and tears its pipes
/// back down on the way out (even on error).
pub fn run(config: &ClientConfig) -> Result<()> {
  let request_path = config.request_pipe_path();
  let notify_path = config.notify_pipe_path();

  pipes::create_client_pipe(&request_path)?;
  pipes::create_client_pipe(&notify_path)?;

  let connect_result = connect_and_play(config, &request_path, &notify_path);

  pipes::remove_client_pipe(&request_path);
  pipes::remove_client_pipe(&notify_path);

  connect_result
}

fn connect_and_play(config: &ClientConfig, request_path: &Path, notify_path: &Path) -> Result<()> {
  let mut rendezvous =
    pipes::open_write(&config.rendezvous_pipe).context("open server rendezvous pipe")?;
  protocol::write_connect_request(
    &mut rendezvous,
    &ConnectRequest {
      request_pipe: request_path.display().to_string(),
      notify_pipe: notify_path.display().to_string(),
    },
  )
  .context("send CONNECT frame")?;
  drop(rendezvous);

  let mut notify = pipes::open_read(notify_path).context("open own notify pipe")?;
  let mut request = pipes::open_write(request_path).context("open own request pipe")?;

  let status = protocol::read_connect_ack(&mut notify).context("read CONNECT ack")?;
  if status != 0 {
    bail!("server refused connection (status {status})");
  }
  info!("connected as {}", config.id);

  let last_tempo_ms = Arc::new(AtomicI32::new(DEFAULT_REPLAY_TEMPO_MS));

  let reader_handle = {
    let notify = notify.try_clone().context("clone notify pipe for reader")?;
    let last_tempo_ms = last_tempo_ms.clone();
    thread::spawn(move || render_frames(notify, last_tempo_ms))
  };

  match &config.cmd_file {
    Some(path) => {
      let quit = Arc::new(AtomicBool::new(false));
      let quit_watcher = {
        let quit = quit.clone();
        thread::spawn(move || watch_for_quit(quit))
      };
      replay_cmd_file(path, &mut request, &quit, &last_tempo_ms)?;
      quit.store(true, Ordering::Release);
      let _ = quit_watcher.join();
    }
    None => read_keyboard(&mut request)?,
  }

  protocol::write_disconnect(&mut request).context("send DISCONNECT")?;
  drop(request);
  drop(notify);
  let _ = reader_handle.join();
  Ok(())
}

/// Reads BOARD frames until EOF, renders each as plain text to stdout, and
/// records the level's tempo so a cmd-file replay can pace itself to match.
fn render_frames(mut notify: File, last_tempo_ms: Arc<AtomicI32>) {
  loop {
    match protocol::read_board_frame(&mut notify) {
      Ok(Some(frame)) => {
        last_tempo_ms.store(frame.tempo.max(1), Ordering::Release);
        print_frame(&frame);
      }
      Ok(None) => break,
      Err(e) => {
        warn!("client: board frame read error: {e:#}");
        break;
      }
    }
  }
}

/// Watches the terminal for Q in raw mode, ignoring every other key, and
/// flips `quit` once pressed. Used to let Q interrupt a cmd-file replay,
/// which otherwise never reads the keyboard itself.
fn watch_for_quit(quit: Arc<AtomicBool>) {
  let _raw = match RawModeGuard::enable() {
    Ok(guard) => guard,
    Err(e) => {
      warn!("client: could not watch keyboard for quit: {e:#}");
      return;
    }
  };
  while !quit.load(Ordering::Acquire) {
    if event::poll(Duration::from_millis(100)).unwrap_or(false)
      && let Ok(Event::Key(key)) = event::read()
      && matches!(key.code, KeyCode::Char('q' | 'Q'))
    {
      quit.store(true, Ordering::Release);
      break;
    }
  }
}

fn print_frame(frame: &BoardFrame) {
  let mut out = String::new();
  out.push_str(&format!(
    "points={} game_over={} victory={}\n",
    frame.points, frame.game_over, frame.victory
  ));
  for row in 0..frame.height {
    let start = (row * frame.width) as usize;
    let end = start + frame.width as usize;
    out.push_str(&String::from_utf8_lossy(&frame.cells[start..end]));
    out.push('\n');
  }
  print!("{out}");
  let _ = std::io::stdout().flush();
}

/// Reads keyboard WASD/Q in raw mode, writing PLAY frames; returns when Q
/// is pressed.
fn read_keyboard(request: &mut File) -> Result<()> {
  let _raw = RawModeGuard::enable()?;
  loop {
    if event::poll(Duration::from_millis(100)).unwrap_or(false)
      && let Ok(Event::Key(key)) = event::read()
    {
      match key.code {
        KeyCode::Char('w' | 'W') => protocol::write_play(&mut *request, b'W')?,
        KeyCode::Char('a' | 'A') => protocol::write_play(&mut *request, b'A')?,
        KeyCode::Char('s' | 'S') => protocol::write_play(&mut *request, b'S')?,
        KeyCode::Char('d' | 'D') => protocol::write_play(&mut *request, b'D')?,
        KeyCode::Char('q' | 'Q') => break,
        _ => {}
      }
    }
  }
  Ok(())
}

/// Replays moves from a file, ignoring `#` comments, blank lines, and
/// `POS`/`PASSO` headers left over from the ghost-script format. Sends one
/// PLAY per character on each line, paced to the last known tempo, and
/// loops back to the start of the file at EOF. Only `quit` (driven by the
/// Q key, see `watch_for_quit`) ends the replay early.
pub fn replay_cmd_file(
  path: &Path,
  request: &mut File,
  quit: &AtomicBool,
  last_tempo_ms: &AtomicI32,
) -> Result<()> {
  let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
  while !quit.load(Ordering::Acquire) {
    for line in text.lines() {
      let trimmed = line.trim();
      if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("POS")
        || trimmed.starts_with("PASSO")
      {
        continue;
      }
      for byte in trimmed.bytes() {
        if quit.load(Ordering::Acquire) {
          return Ok(());
        }
        protocol::write_play(&mut *request, byte.to_ascii_uppercase())?;
        let tempo_ms = last_tempo_ms.load(Ordering::Acquire).max(1) as u64;
        thread::sleep(Duration::from_millis(tempo_ms));
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;
  use tempfile::tempdir;

  #[test]
  fn replays_each_character_and_loops_at_eof() {
    let dir = tempdir().unwrap();
    let cmd_path = dir.path().join("moves.txt");
    fs::write(&cmd_path, "# header\nPOS 0 0\nPASSO 1\nDA\n\nDD\n").unwrap();

    let pipe_path = dir.path().join("request");
    pipes::create_client_pipe(&pipe_path).unwrap();

    let quit = Arc::new(AtomicBool::new(false));
    let last_tempo_ms = Arc::new(AtomicI32::new(1));

    let writer_path = pipe_path.clone();
    let quit_writer = quit.clone();
    let tempo_writer = last_tempo_ms.clone();
    let writer_cmd_path = cmd_path.clone();
    let writer_handle = thread::spawn(move || {
      let mut writer = pipes::open_write(&writer_path).unwrap();
      let _ = replay_cmd_file(&writer_cmd_path, &mut writer, &quit_writer, &tempo_writer);
    });

    let mut reader = pipes::open_read(&pipe_path).unwrap();
    let mut seen = Vec::new();
    // One loop of the file is 4 characters (D, A, D, D); read two loops
    // worth so the EOF-looping behavior is exercised.
    for _ in 0..8 {
      match protocol::read_client_request(&mut reader).unwrap() {
        Some(protocol::ClientRequest::Play(dir)) => seen.push(dir),
        other => panic!("unexpected {:?}", other),
      }
    }
    quit.store(true, Ordering::Release);
    let _ = writer_handle.join();

    assert_eq!(seen, vec![b'D', b'A', b'D', b'D', b'D', b'A', b'D', b'D']);
    pipes::remove_client_pipe(&pipe_path);
  }

  #[test]
  fn quit_flag_stops_replay_promptly() {
    let dir = tempdir().unwrap();
    let cmd_path = dir.path().join("moves.txt");
    fs::write(&cmd_path, "WASD\n").unwrap();

    let pipe_path = dir.path().join("request");
    pipes::create_client_pipe(&pipe_path).unwrap();

    let reader_path = pipe_path.clone();
    let drain = thread::spawn(move || {
      let mut reader = pipes::open_read(&reader_path).unwrap();
      let mut buf = [0u8; 64];
      loop {
        match reader.read(&mut buf) {
          Ok(0) | Err(_) => break,
          Ok(_) => {}
        }
      }
    });

    let mut writer = pipes::open_write(&pipe_path).unwrap();
    let quit = Arc::new(AtomicBool::new(false));
    let last_tempo_ms = AtomicI32::new(5);

    let quit_clone = quit.clone();
    let stopper = thread::spawn(move || {
      thread::sleep(Duration::from_millis(60));
      quit_clone.store(true, Ordering::Release);
    });

    let start = std::time::Instant::now();
    let result = replay_cmd_file(&cmd_path, &mut writer, &quit, &last_tempo_ms);
    assert!(result.is_ok());
    assert!(
      start.elapsed() < Duration::from_secs(2),
      "replay did not stop promptly after quit"
    );

    drop(writer);
    let _ = stopper.join();
    let _ = drain.join();
    pipes::remove_client_pipe(&pipe_path);
  }
}
