//! `server <levels_dir> <max_games> <rendezvous_pipe>`
//!
//! Hosts the rendezvous pipe, the bounded worker pool, and the signal-driven
//! intake loop. Exits 0 on graceful shutdown (TERM/INT), 1 on setup failure.

use clap::Parser;
use log::{error, info};
use pacman_server::config::ServerConfig;
use pacman_server::errors::ServerError;
use pacman_server::worker::ActiveGamesTable;
use pacman_server::{intake, pipes, signals, worker};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-player Pac-Man game session server")]
struct ServerArgs {
  /// Directory containing `*.lvl` level files (and their `.p`/`.m` actor files).
  levels_dir: PathBuf,
  /// Maximum number of concurrently running games.
  max_games: i64,
  /// Path of the rendezvous named pipe clients CONNECT through.
  rendezvous_pipe: PathBuf,
}

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let args = ServerArgs::parse();
  if let Err(e) = run(args) {
    error!("server exiting with error: {e:#}");
    std::process::exit(1);
  }
  info!("server exited cleanly");
}

fn run(args: ServerArgs) -> anyhow::Result<()> {
  let config = ServerConfig::new(args.levels_dir, args.max_games, args.rendezvous_pipe)?;
  let scores_log = config.scores_log_path();

  pipes::create_rendezvous_pipe(&config.rendezvous_pipe).map_err(|source| {
    ServerError::RendezvousPipeSetup {
      path: config.rendezvous_pipe.clone(),
      source,
    }
  })?;
  let signal_flags = signals::install()?;
  let active_games = Arc::new(ActiveGamesTable::new(config.max_games));
  let (sender, receiver) = worker::make_request_buffer();

  let worker_handles = worker::spawn_workers(
    config.max_games,
    config.levels_dir.clone(),
    receiver,
    active_games.clone(),
    signal_flags.shutdown.clone(),
  )?;

  intake::run(
    &config.rendezvous_pipe,
    sender,
    &signal_flags,
    &active_games,
    &scores_log,
  )?;

  for handle in worker_handles {
    let _ = handle.join();
  }
  Ok(())
}
