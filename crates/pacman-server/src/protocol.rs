//! Wire codec between the server and a display client.
//!
//! Unlike a serialized-struct protocol, every frame here has a fixed byte
//! layout: a one-byte op code followed by a shape the op code determines.
//! Integers are host-endian `i32`s, matching the original process-local
//! assumption (this is not a cross-architecture wire format).

use anyhow::{Context, Result, bail};
use std::io::{Read, Write};

/// Maximum length of a FIFO path carried inside a CONNECT frame, including
/// the terminating NUL.
pub const MAX_PIPE_PATH_LENGTH: usize = 256;

/// Maximum number of ghosts a level may declare.
pub const MAX_GHOSTS: usize = 4;

/// Maximum number of move-script entries a ghost file may declare.
pub const MAX_MOVES: usize = 64;

const OP_CONNECT: u8 = 1;
const OP_PLAY: u8 = 2;
const OP_DISCONNECT: u8 = 3;
const OP_BOARD: u8 = 4;

/// Size in bytes of a CONNECT request frame's body (two fixed-width paths).
const CONNECT_BODY_LEN: usize = 2 * MAX_PIPE_PATH_LENGTH;

/// A connection request read from the rendezvous pipe.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
  pub request_pipe: String,
  pub notify_pipe: String,
}

/// Reads one full CONNECT request frame from `reader`.
///
/// Loops until the whole fixed-size frame has been read, since a single
/// `read` is not guaranteed to return every byte the client wrote.
pub fn read_connect_request<R: Read>(mut reader: R) -> Result<ConnectRequest> {
  let mut op = [0u8; 1];
  reader.read_exact(&mut op).context("read CONNECT op byte")?;
  if op[0] != OP_CONNECT {
    bail!("expected CONNECT op byte, got {}", op[0]);
  }
  let mut body = [0u8; CONNECT_BODY_LEN];
  read_full(&mut reader, &mut body).context("read CONNECT body")?;
  let request_pipe = path_from_fixed(&body[..MAX_PIPE_PATH_LENGTH])?;
  let notify_pipe = path_from_fixed(&body[MAX_PIPE_PATH_LENGTH..])?;
  Ok(ConnectRequest {
    request_pipe,
    notify_pipe,
  })
}

/// Writes a CONNECT request frame (used by the client).
pub fn write_connect_request<W: Write>(mut writer: W, req: &ConnectRequest) -> Result<()> {
  let mut body = [0u8; 1 + CONNECT_BODY_LEN];
  body[0] = OP_CONNECT;
  path_into_fixed(
    &req.request_pipe,
    &mut body[1..1 + MAX_PIPE_PATH_LENGTH],
  )?;
  path_into_fixed(
    &req.notify_pipe,
    &mut body[1 + MAX_PIPE_PATH_LENGTH..],
  )?;
  writer.write_all(&body).context("write CONNECT frame")
}

/// Writes a CONNECT ack (`status == 0` is success).
pub fn write_connect_ack<W: Write>(mut writer: W, status: u8) -> Result<()> {
  writer
    .write_all(&[OP_CONNECT, status])
    .context("write CONNECT ack")
}

/// Reads a CONNECT ack, returning the status byte.
pub fn read_connect_ack<R: Read>(mut reader: R) -> Result<u8> {
  let mut buf = [0u8; 2];
  reader.read_exact(&mut buf).context("read CONNECT ack")?;
  if buf[0] != OP_CONNECT {
    bail!("expected CONNECT ack op byte, got {}", buf[0]);
  }
  Ok(buf[1])
}

/// One request-pipe message from client to server: a play direction or a
/// disconnect notice. Returns `None` on a clean EOF (peer closed).
#[derive(Debug, Clone, Copy)]
pub enum ClientRequest {
  Play(u8),
  Disconnect,
}

/// Reads the next request-pipe message. `Ok(None)` means the peer is gone
/// (EOF); unknown op codes are reported as an error so the caller can log
/// and keep reading.
pub fn read_client_request<R: Read>(mut reader: R) -> Result<Option<ClientRequest>> {
  let mut op = [0u8; 1];
  match reader.read(&mut op) {
    Ok(0) => return Ok(None),
    Ok(_) => {}
    Err(e) => return Err(e).context("read request op byte"),
  }
  match op[0] {
    OP_PLAY => {
      let mut dir = [0u8; 1];
      reader.read_exact(&mut dir).context("read PLAY direction")?;
      Ok(Some(ClientRequest::Play(dir[0])))
    }
    OP_DISCONNECT => Ok(Some(ClientRequest::Disconnect)),
    other => bail!("unknown request op byte {}", other),
  }
}

/// Writes a PLAY frame (used by the client).
pub fn write_play<W: Write>(mut writer: W, direction: u8) -> Result<()> {
  writer
    .write_all(&[OP_PLAY, direction])
    .context("write PLAY frame")
}

/// Writes a DISCONNECT frame (used by the client).
pub fn write_disconnect<W: Write>(mut writer: W) -> Result<()> {
  writer
    .write_all(&[OP_DISCONNECT])
    .context("write DISCONNECT frame")
}

/// One rendered board frame sent from server to client over the notify pipe.
#[derive(Debug, Clone)]
pub struct BoardFrame {
  pub width: i32,
  pub height: i32,
  pub tempo: i32,
  pub victory: i32,
  pub game_over: i32,
  pub points: i32,
  pub cells: Vec<u8>,
}

/// Writes a BOARD frame. `cells` must have exactly `width * height` bytes.
pub fn write_board_frame<W: Write>(mut writer: W, frame: &BoardFrame) -> Result<()> {
  debug_assert_eq!(frame.cells.len(), (frame.width * frame.height) as usize);
  let mut header = Vec::with_capacity(1 + 6 * 4);
  header.push(OP_BOARD);
  header.extend_from_slice(&frame.width.to_ne_bytes());
  header.extend_from_slice(&frame.height.to_ne_bytes());
  header.extend_from_slice(&frame.tempo.to_ne_bytes());
  header.extend_from_slice(&frame.victory.to_ne_bytes());
  header.extend_from_slice(&frame.game_over.to_ne_bytes());
  header.extend_from_slice(&frame.points.to_ne_bytes());
  writer.write_all(&header).context("write BOARD header")?;
  writer
    .write_all(&frame.cells)
    .context("write BOARD cells")
}

/// Reads a BOARD frame (used by the client). `Ok(None)` on clean EOF.
pub fn read_board_frame<R: Read>(mut reader: R) -> Result<Option<BoardFrame>> {
  let mut op = [0u8; 1];
  match reader.read(&mut op) {
    Ok(0) => return Ok(None),
    Ok(_) => {}
    Err(e) => return Err(e).context("read BOARD op byte"),
  }
  if op[0] != OP_BOARD {
    bail!("expected BOARD op byte, got {}", op[0]);
  }
  let mut ints = [0u8; 6 * 4];
  read_full(&mut reader, &mut ints).context("read BOARD header")?;
  let read_i32 = |slice: &[u8]| i32::from_ne_bytes(slice.try_into().unwrap());
  let width = read_i32(&ints[0..4]);
  let height = read_i32(&ints[4..8]);
  let tempo = read_i32(&ints[8..12]);
  let victory = read_i32(&ints[12..16]);
  let game_over = read_i32(&ints[16..20]);
  let points = read_i32(&ints[20..24]);
  if width < 0 || height < 0 {
    bail!("BOARD frame carries negative dimensions");
  }
  let mut cells = vec![0u8; (width * height) as usize];
  read_full(&mut reader, &mut cells).context("read BOARD cells")?;
  Ok(Some(BoardFrame {
    width,
    height,
    tempo,
    victory,
    game_over,
    points,
    cells,
  }))
}

/// Reads exactly `buf.len()` bytes, looping across short reads, erroring
/// only on a genuine EOF before the buffer is filled.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
  let mut filled = 0;
  while filled < buf.len() {
    let n = reader.read(&mut buf[filled..])?;
    if n == 0 {
      bail!("peer closed connection mid-frame");
    }
    filled += n;
  }
  Ok(())
}

fn path_from_fixed(field: &[u8]) -> Result<String> {
  let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
  String::from_utf8(field[..end].to_vec()).context("non-utf8 path in CONNECT frame")
}

fn path_into_fixed(path: &str, field: &mut [u8]) -> Result<()> {
  let bytes = path.as_bytes();
  if bytes.len() >= field.len() {
    bail!(
      "path {:?} exceeds MAX_PIPE_PATH_LENGTH ({})",
      path,
      field.len()
    );
  }
  field[..bytes.len()].copy_from_slice(bytes);
  Ok(())
}
