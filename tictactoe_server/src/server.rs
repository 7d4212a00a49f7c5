// TCP listener and per-connection handler for the lobby server.
//
// Architecture: one thread per accepted connection, plus the accept thread.
//
// - **Accept thread**: polls a non-blocking `TcpListener` and checks the
//   `keep_running` flag between polls. Every accepted stream gets its own
//   handler thread.
// - **Handler thread**: reads the display name (under the handshake
//   timeout), registers the session, then loops on lobby requests until the
//   client exits or the connection is lost.
//
// Handler threads share state only through the `Lobby` and through the
// session references a `Game` holds. When a client joins a listing, its
// handler thread runs pairing and the whole game for both players while the
// creator's handler stays parked inside `Lobby::wait_for_match`. When the
// game is over each surviving handler sends its own client a fresh lobby
// block and resumes its loop.
//
// Every error that ends a session funnels into `teardown`, which is the only
// place sessions leave the roster.
//
// Shutdown: `ServerHandle::stop` clears `keep_running` and joins the accept
// thread. Handler threads already running are left to finish on their own.

use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use tictactoe_protocol::{ListingId, LobbyIntent, ResponseCode, Tag};

use crate::config::ServerConfig;
use crate::error::ConnectionLost;
use crate::game::GameOutcome;
use crate::lobby::Lobby;
use crate::matchmaker;
use crate::session::{Link, Session, open_link, validate_name};

/// How long the accept thread sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    lobby: Arc<Lobby>,
}

impl ServerHandle {
    /// The shared lobby, for inspection.
    pub fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    /// Stop accepting connections and wait for the accept thread to exit.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Block until the accept thread exits on its own.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping it
/// and the actual bound address (useful when port 0 is used to let the OS
/// pick a free port).
pub fn start_server(config: ServerConfig) -> io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind(config.listen_address())?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let lobby = Arc::new(Lobby::new(&config));
    let keep_running = Arc::new(AtomicBool::new(true));
    let handshake_timeout = config.handshake_timeout();

    let thread = {
        let lobby = Arc::clone(&lobby);
        let keep_running = Arc::clone(&keep_running);
        thread::spawn(move || accept_loop(listener, lobby, handshake_timeout, keep_running))
    };
    info!("lobby server listening on {addr}");

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
            lobby,
        },
        addr,
    ))
}

fn accept_loop(
    listener: TcpListener,
    lobby: Arc<Lobby>,
    handshake_timeout: Duration,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("accepted connection from {peer}");
                let lobby = Arc::clone(&lobby);
                thread::spawn(move || handle_connection(stream, &lobby, handshake_timeout));
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!("accept failed, no longer listening: {e}");
                break;
            }
        }
    }
    info!("accept loop stopped");
}

/// Everything one client does, from the name frame to teardown.
fn handle_connection(stream: TcpStream, lobby: &Lobby, handshake_timeout: Duration) {
    let registered = accept_name(&stream, handshake_timeout).and_then(|(name, link)| {
        lobby
            .register(&name, link)
            .map_err(|e| ConnectionLost::ProtocolViolation(e.to_string()))
    });
    let session = match registered {
        Ok(session) => session,
        Err(cause) => {
            info!("connection closed before registration: {cause}");
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    };

    let result = welcome(&session, lobby).and_then(|()| lobby_loop(&session, lobby));
    teardown(&session, lobby, result.err());
}

/// Read display-name frames until one is acceptable. A blank name gets
/// `-3` and another read.
fn accept_name(
    stream: &TcpStream,
    timeout: Duration,
) -> Result<(String, Link), ConnectionLost> {
    let transport = |e: io::Error| ConnectionLost::TransportLost(e.to_string());
    stream.set_nonblocking(false).map_err(transport)?;
    stream.set_read_timeout(Some(timeout)).map_err(transport)?;
    let mut link = open_link(stream).map_err(transport)?;

    let name = loop {
        let requested = link.receive_block()?;
        match validate_name(&requested) {
            Ok(name) => break name,
            Err(err) => {
                debug!("rejected display name {requested:?}: {err}");
                link.send_block(err.response_code().as_str())?;
            }
        }
    };

    stream.set_read_timeout(None).map_err(transport)?;
    Ok((name, link))
}

/// Tell a new player its id and show it the lobby.
fn welcome(session: &Session, lobby: &Lobby) -> Result<(), ConnectionLost> {
    session.send(Tag::Assigned, &session.id().to_string())?;
    session.send_block(&lobby.snapshot_block())
}

/// Serve lobby requests. `Ok` means the client exited cleanly.
fn lobby_loop(session: &Arc<Session>, lobby: &Lobby) -> Result<(), ConnectionLost> {
    loop {
        match session.receive_intent()? {
            LobbyIntent::NewGame => host_game(session, lobby)?,
            LobbyIntent::Refresh => session.send_block(&lobby.snapshot_block())?,
            LobbyIntent::Stats => session.send_block(&lobby.compute_stats())?,
            LobbyIntent::ReadChat => session.send_block(&lobby.read_chat())?,
            LobbyIntent::Chat(text) => lobby.append_chat(session.name(), &text),
            LobbyIntent::Join(id) => join_game(session, lobby, id)?,
            LobbyIntent::Exit => return Ok(()),
            LobbyIntent::Quit(reason) => {
                return Err(session.fail(ConnectionLost::ClientQuit(reason)));
            }
        }
    }
}

/// Open a listing and park until its game is over.
fn host_game(session: &Session, lobby: &Lobby) -> Result<(), ConnectionLost> {
    let listing = lobby.create_listing(session);
    lobby.wait_for_match(listing.id, session)?;
    session.send_block(&lobby.snapshot_block())
}

/// Claim a listing, then run pairing and the game on this thread.
fn join_game(session: &Arc<Session>, lobby: &Lobby, id: ListingId) -> Result<(), ConnectionLost> {
    let mut claim = match lobby.join_listing(id, session) {
        Ok(claim) => claim,
        Err(err) => {
            info!("player {} could not join listing {id}: {err}", session.id());
            return session.send_block(err.response_code().as_str());
        }
    };
    session.send_block(ResponseCode::Accepted.as_str())?;
    claim.begin_pairing();

    match matchmaker::pair(Arc::clone(claim.creator()), Arc::clone(session)) {
        Ok(game) => match game.run() {
            GameOutcome::Draw => info!("listing {id} ended in a draw"),
            GameOutcome::Win { winner, loser, .. } => {
                info!("listing {id}: player {winner} beat player {loser}");
            }
            GameOutcome::Aborted { lost, cause } => {
                info!("listing {id} aborted, player {lost} lost: {cause}");
            }
        },
        Err(failed) => info!("listing {id} never started: {failed}"),
    }
    drop(claim);

    if let Some(cause) = session.lost_cause() {
        return Err(cause);
    }
    session.send_block(&lobby.snapshot_block())
}

/// The single exit path for a registered session.
fn teardown(session: &Session, lobby: &Lobby, cause: Option<ConnectionLost>) {
    match &cause {
        None => info!("player {} exited", session.id()),
        Some(cause @ (ConnectionLost::ProtocolViolation(_) | ConnectionLost::WaitExpired(_))) => {
            warn!("dropping player {}: {cause}", session.id());
            session.notify_quit(&cause.to_string());
        }
        Some(cause) => info!("player {} disconnected: {cause}", session.id()),
    }
    lobby.deregister(session.id());
    session.shutdown();
}
