//! Process-wide signal handling for the server's lifecycle.
//!
//! Handlers only ever flip an atomic flag; all the actual work (unlinking
//! the rendezvous pipe, writing the diagnostic dump) happens on the intake
//! task, which polls these flags between blocking calls.

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Atomic flags shared between signal handlers and the intake task.
pub struct SignalFlags {
  pub shutdown: Arc<AtomicBool>,
  pub usr1_pending: Arc<AtomicBool>,
}

/// Registers TERM/INT/USR1 handlers and ignores SIGPIPE process-wide, so a
/// write to a client that has gone away surfaces as an `EPIPE` return value
/// instead of killing the server.
pub fn install() -> Result<SignalFlags> {
  let shutdown = Arc::new(AtomicBool::new(false));
  let usr1_pending = Arc::new(AtomicBool::new(false));

  signal_hook::flag::register(SIGTERM, shutdown.clone()).context("register SIGTERM handler")?;
  signal_hook::flag::register(SIGINT, shutdown.clone()).context("register SIGINT handler")?;
  signal_hook::flag::register(SIGUSR1, usr1_pending.clone()).context("register SIGUSR1 handler")?;

  unsafe {
    nix::sys::signal::signal(
      nix::sys::signal::Signal::SIGPIPE,
      nix::sys::signal::SigHandler::SigIgn,
    )
    .context("ignore SIGPIPE")?;
  }

  Ok(SignalFlags {
    shutdown,
    usr1_pending,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::Ordering;
  use std::time::{Duration, Instant};

  fn wait_for(flag: &AtomicBool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
      if flag.load(Ordering::Acquire) {
        return true;
      }
      std::thread::sleep(Duration::from_millis(5));
    }
    false
  }

  #[test]
  fn sigterm_and_sigusr1_flip_their_flags() {
    let flags = install().unwrap();
    assert!(!flags.shutdown.load(Ordering::Acquire));
    assert!(!flags.usr1_pending.load(Ordering::Acquire));

    nix::sys::signal::raise(nix::sys::signal::Signal::SIGUSR1).unwrap();
    assert!(wait_for(&flags.usr1_pending), "SIGUSR1 did not set usr1_pending");

    nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();
    assert!(wait_for(&flags.shutdown), "SIGTERM did not set shutdown");
  }
}
