//! Named-pipe lifecycle helpers.
//!
//! The server owns the rendezvous pipe: it unlinks any stale one, creates
//! it fresh, and unlinks it again on shutdown. Per-session pipes are owned
//! by the client: it creates and unlinks `request`/`notify`; the server
//! only opens file descriptors against paths the client handed it.

use anyhow::{Context, Result};
use log::{debug, info};
use nix::fcntl::{FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};
use std::path::Path;

/// Creates the rendezvous pipe at `path`, removing any stale pipe left
/// behind by a previous run first.
pub fn create_rendezvous_pipe(path: &Path) -> Result<()> {
  if path.exists() {
    info!("removing stale rendezvous pipe at {}", path.display());
    let _ = std::fs::remove_file(path);
  }
  unistd::mkfifo(path, Mode::from_bits_truncate(0o666))
    .with_context(|| format!("mkfifo {}", path.display()))?;
  debug!("created rendezvous pipe at {}", path.display());
  Ok(())
}

/// Removes the rendezvous pipe. Best-effort: the server is shutting down
/// either way.
pub fn remove_rendezvous_pipe(path: &Path) {
  if let Err(e) = std::fs::remove_file(path) {
    if e.kind() != std::io::ErrorKind::NotFound {
      log::warn!("failed to remove rendezvous pipe {}: {}", path.display(), e);
    }
  }
}

/// Opens `path` read-only, blocking until a writer appears on the other end.
pub fn open_read(path: &Path) -> Result<File> {
  let fd = nix::fcntl::open(path, OFlag::O_RDONLY, Mode::empty())
    .with_context(|| format!("open {} for reading", path.display()))?;
  Ok(unsafe { File::from_raw_fd(fd) })
}

/// Opens `path` write-only, blocking until a reader appears on the other end.
pub fn open_write(path: &Path) -> Result<File> {
  let fd = nix::fcntl::open(path, OFlag::O_WRONLY, Mode::empty())
    .with_context(|| format!("open {} for writing", path.display()))?;
  Ok(unsafe { File::from_raw_fd(fd) })
}

/// Creates a client-owned FIFO at `path`, tolerating one that already
/// exists from a prior crashed run with the same id.
pub fn create_client_pipe(path: &Path) -> Result<()> {
  match unistd::mkfifo(path, Mode::from_bits_truncate(0o666)) {
    Ok(()) => Ok(()),
    Err(nix::errno::Errno::EEXIST) => Ok(()),
    Err(e) => Err(e).with_context(|| format!("mkfifo {}", path.display())),
  }
}

/// Removes a client-owned FIFO. Best-effort.
pub fn remove_client_pipe(path: &Path) {
  let _ = std::fs::remove_file(path);
}

/// Switches `file`'s underlying fd to non-blocking mode, so a reader can
/// poll for cancellation instead of parking indefinitely in `read()`.
pub fn set_nonblocking(file: &File) -> Result<()> {
  let fd = file.as_raw_fd();
  let flags = nix::fcntl::fcntl(fd, FcntlArg::F_GETFL).context("fcntl F_GETFL")?;
  let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
  nix::fcntl::fcntl(fd, FcntlArg::F_SETFL(flags)).context("fcntl F_SETFL O_NONBLOCK")?;
  Ok(())
}

/// Consumes a `File`, returning its raw fd without closing it so it can be
/// handed to code (e.g. an intentional early close to unblock a reader)
/// that wants to manage the fd's lifetime explicitly.
pub fn into_raw_fd(file: File) -> std::os::fd::RawFd {
  file.into_raw_fd()
}
