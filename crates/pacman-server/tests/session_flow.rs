//! End-to-end session tests driving `session::run` directly over real
//! named pipes, the way a worker would after dequeuing a connection
//! request.

use pacman_server::protocol::{self, ConnectRequest};
use pacman_server::worker::ActiveGamesTable;
use pacman_server::{pipes, session};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

struct ClientPipes {
  request_path: std::path::PathBuf,
  notify_path: std::path::PathBuf,
}

fn setup_client_pipes(dir: &Path) -> ClientPipes {
  let request_path = dir.join("7_request");
  let notify_path = dir.join("7_notification");
  pipes::create_client_pipe(&request_path).unwrap();
  pipes::create_client_pipe(&notify_path).unwrap();
  ClientPipes {
    request_path,
    notify_path,
  }
}

fn connect_request(pipes: &ClientPipes) -> ConnectRequest {
  ConnectRequest {
    request_pipe: pipes.request_path.display().to_string(),
    notify_pipe: pipes.notify_path.display().to_string(),
  }
}

#[test]
fn disconnect_ends_session_promptly() {
  let levels_dir = tempdir().unwrap();
  fs::write(levels_dir.path().join("a.lvl"), "DIM 2 1\nTEMPO 20\n..\n").unwrap();

  let pipe_dir = tempdir().unwrap();
  let client_pipes = setup_client_pipes(pipe_dir.path());
  let req = connect_request(&client_pipes);

  let active_games = std::sync::Arc::new(ActiveGamesTable::new(1));
  let levels_dir_path = levels_dir.path().to_path_buf();
  let active_games_clone = active_games.clone();
  let handle = std::thread::spawn(move || {
    session::run(0, &levels_dir_path, req, &active_games_clone)
  });

  let mut notify = pipes::open_read(&client_pipes.notify_path).unwrap();
  let mut request = pipes::open_write(&client_pipes.request_path).unwrap();
  let status = protocol::read_connect_ack(&mut notify).unwrap();
  assert_eq!(status, 0);

  protocol::write_disconnect(&mut request).unwrap();

  let result = handle.join().unwrap();
  assert!(result.is_ok());
}

#[test]
fn peer_gone_ends_session_without_crashing() {
  let levels_dir = tempdir().unwrap();
  fs::write(levels_dir.path().join("a.lvl"), "DIM 2 1\nTEMPO 20\n..\n").unwrap();

  let pipe_dir = tempdir().unwrap();
  let client_pipes = setup_client_pipes(pipe_dir.path());
  let req = connect_request(&client_pipes);

  let active_games = std::sync::Arc::new(ActiveGamesTable::new(1));
  let levels_dir_path = levels_dir.path().to_path_buf();
  let active_games_clone = active_games.clone();
  let handle = std::thread::spawn(move || {
    session::run(0, &levels_dir_path, req, &active_games_clone)
  });

  let mut notify = pipes::open_read(&client_pipes.notify_path).unwrap();
  let request = pipes::open_write(&client_pipes.request_path).unwrap();
  let status = protocol::read_connect_ack(&mut notify).unwrap();
  assert_eq!(status, 0);

  // Close both ends without disconnecting; the next BOARD write on the
  // server side should observe a broken pipe rather than blocking forever
  // or crashing the process.
  drop(notify);
  drop(request);

  let result = handle.join().unwrap();
  assert!(result.is_ok());
}

#[test]
fn portal_crossing_carries_score_into_next_level() {
  let levels_dir = tempdir().unwrap();
  fs::write(
    levels_dir.path().join("a.lvl"),
    "DIM 3 1\nTEMPO 30\n..@\n",
  )
  .unwrap();
  fs::write(levels_dir.path().join("b.lvl"), "DIM 2 1\nTEMPO 30\n..\n").unwrap();

  let pipe_dir = tempdir().unwrap();
  let client_pipes = setup_client_pipes(pipe_dir.path());
  let req = connect_request(&client_pipes);

  let active_games = std::sync::Arc::new(ActiveGamesTable::new(1));
  let levels_dir_path = levels_dir.path().to_path_buf();
  let active_games_clone = active_games.clone();
  let handle = std::thread::spawn(move || {
    session::run(0, &levels_dir_path, req, &active_games_clone)
  });

  let mut notify = pipes::open_read(&client_pipes.notify_path).unwrap();
  let mut request = pipes::open_write(&client_pipes.request_path).unwrap();
  assert_eq!(protocol::read_connect_ack(&mut notify).unwrap(), 0);

  // Drive pacman across the dot at x=1 and onto the portal at x=2.
  protocol::write_play(&mut request, b'D').unwrap();
  protocol::write_play(&mut request, b'D').unwrap();

  // Read frames on a background thread so a stalled or absent frame can
  // never hang the test itself; the main thread just waits on the channel
  // with a timeout.
  let (tx, rx) = std::sync::mpsc::channel();
  std::thread::spawn(move || {
    loop {
      match protocol::read_board_frame(&mut notify) {
        Ok(Some(frame)) => {
          let matched = frame.width == 2 && frame.points >= 1;
          if tx.send(matched).is_err() || matched {
            break;
          }
        }
        _ => break,
      }
    }
  });

  let mut saw_second_level_with_score = false;
  while let Ok(matched) = rx.recv_timeout(Duration::from_secs(5)) {
    if matched {
      saw_second_level_with_score = true;
      break;
    }
  }

  protocol::write_disconnect(&mut request).unwrap();
  let _ = handle.join();

  assert!(
    saw_second_level_with_score,
    "expected to observe the second level with carried-over score"
  );
}
