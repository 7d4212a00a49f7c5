// tictactoe_server — lobby and match server for two-player tic-tac-toe.
//
// Clients connect over TCP, register a display name, browse and create game
// listings in a shared lobby, chat, and play matches against each other. The
// wire vocabulary lives in `tictactoe_protocol`; this crate owns all state.
//
// Module overview:
// - `session.rs`:    One registered client: its link, identity, waiting flag,
//                    current mark and opponent, win/loss counters, and the
//                    "lost" failure path.
// - `lobby.rs`:      Process-wide registry of sessions, listings, and chat,
//                    behind one mutex, with a condvar for parked creators.
// - `matchmaker.rs`: Pairs a listing's creator with its joiner and runs the
//                    three-step setup handshake on both.
// - `game.rs`:       Board, win detection, and the alternating-turn engine.
// - `server.rs`:     Accept loop and the per-connection handler thread.
// - `client.rs`:     `LobbyClient`, the protocol-level client used by tests
//                    and front ends.
// - `config.rs`:     `ServerConfig`, loaded from JSON.
// - `error.rs`:      `ConnectionLost` and the per-request errors.
//
// The server can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_server`).

pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod lobby;
pub mod matchmaker;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_support;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use client::{ClientError, LobbyClient, MatchInfo, MatchResult, TurnEvent};
pub use config::ServerConfig;
pub use error::{ConnectionLost, JoinError, RegisterError};
pub use server::{ServerHandle, start_server};

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
