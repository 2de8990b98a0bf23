//! `client <id> <rendezvous_pipe> [cmd_file]`
//!
//! Minimal reference display client: connects via the rendezvous pipe,
//! then either reads WASD/Q from the terminal in raw mode or replays moves
//! from `cmd_file`, rendering each BOARD frame it receives as plain text.

use anyhow::Result;
use clap::Parser;
use pacman_server::client;
use pacman_server::config::ClientConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about = "Thin display client for the Pac-Man game server")]
struct ClientArgs {
  /// Identifies this client; its pipes are `/tmp/<id>_request` and `/tmp/<id>_notification`.
  id: String,
  /// Path of the server's rendezvous named pipe.
  rendezvous_pipe: PathBuf,
  /// Optional file of moves to replay instead of reading the keyboard.
  cmd_file: Option<PathBuf>,
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let args = ClientArgs::parse();
  if let Err(e) = run(args) {
    eprintln!("client error: {e:#}");
    std::process::exit(1);
  }
}

fn run(args: ClientArgs) -> Result<()> {
  let config = ClientConfig::new(args.id, args.rendezvous_pipe, args.cmd_file)?;
  client::run(&config)
}
