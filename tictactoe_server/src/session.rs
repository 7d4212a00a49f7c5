// Per-connection session state.
//
// A `Session` is the server-side representative of one registered client. It
// owns the client's `Link` (the tagged codec over the TCP stream) and the
// mutable per-player state: waiting flag, mark for the current game, a weak
// back-reference to the current opponent, and the win/loss counters.
//
// Sessions are shared as `Arc<Session>`: the connection handler that accepted
// the client holds the strong reference, the lobby roster holds a `Weak`, and
// during a game the joiner's handler thread drives both players' links. Only
// one thread ever uses a given link at a time (the creator's handler is parked
// in the lobby while the joiner's thread runs the game), so the link mutex is
// never contended in practice; it exists to make that hand-off sound.
//
// The "lost" path: any failed send or receive records the cause on the
// session, best-effort notifies the current opponent with a `Q` message, and
// returns `ConnectionLost` to the caller. Nothing retries.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info};

use tictactoe_protocol::{Codec, CodecError, Dialect, LobbyIntent, Mark, PlayerId, Tag};

use crate::error::{ConnectionLost, RegisterError};
use crate::lock;

/// Sent to the surviving player when their opponent drops.
pub const OPPONENT_LOST_MESSAGE: &str =
    "The other player has lost connection with the server.\nGame over.";

/// The tagged codec over one client's TCP stream.
pub type Link = Codec<BufReader<TcpStream>, BufWriter<TcpStream>>;

/// Wrap an accepted stream in a server-side `Link`.
pub fn open_link(stream: &TcpStream) -> io::Result<Link> {
    Ok(Codec::new(
        BufReader::new(stream.try_clone()?),
        BufWriter::new(stream.try_clone()?),
        Dialect::SERVER,
    ))
}

/// Trim a requested display name, rejecting names that end up empty.
pub fn validate_name(name: &str) -> Result<String, RegisterError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegisterError::InvalidName);
    }
    Ok(name.to_string())
}

pub struct Session {
    id: PlayerId,
    name: String,
    link: Mutex<Link>,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    waiting: bool,
    role: Option<Mark>,
    opponent: Weak<Session>,
    wins: u32,
    losses: u32,
    lost: Option<ConnectionLost>,
}

impl Session {
    /// Create a session for a freshly registered client. The id comes from
    /// the lobby registry, which guarantees uniqueness.
    pub fn register(id: PlayerId, name: &str, link: Link) -> Result<Self, RegisterError> {
        let name = validate_name(name)?;
        info!("player {id} registered as {name:?}");
        Ok(Self {
            id,
            name,
            link: Mutex::new(link),
            state: Mutex::new(SessionState {
                waiting: true,
                ..SessionState::default()
            }),
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while idle in the lobby, false while hosting a listing or
    /// playing.
    pub fn is_waiting(&self) -> bool {
        lock(&self.state).waiting
    }

    pub fn role(&self) -> Option<Mark> {
        lock(&self.state).role
    }

    /// The current opponent, if a game is in progress and they are still
    /// registered.
    pub fn opponent(&self) -> Option<Arc<Session>> {
        lock(&self.state).opponent.upgrade()
    }

    pub fn wins(&self) -> u32 {
        lock(&self.state).wins
    }

    pub fn losses(&self) -> u32 {
        lock(&self.state).losses
    }

    /// Why this session's connection failed, once it has.
    pub fn lost_cause(&self) -> Option<ConnectionLost> {
        lock(&self.state).lost.clone()
    }

    pub(crate) fn set_waiting(&self, waiting: bool) {
        lock(&self.state).waiting = waiting;
    }

    pub(crate) fn record_win(&self) {
        lock(&self.state).wins += 1;
    }

    pub(crate) fn record_loss(&self) {
        lock(&self.state).losses += 1;
    }

    /// Bind this session to `opponent` for one game.
    pub(crate) fn enter_match(&self, opponent: &Arc<Session>, role: Mark) {
        let mut state = lock(&self.state);
        state.waiting = false;
        state.role = Some(role);
        state.opponent = Arc::downgrade(opponent);
    }

    /// Drop the per-game binding so nothing stale survives into the next
    /// game.
    pub(crate) fn leave_match(&self) {
        let mut state = lock(&self.state);
        state.waiting = true;
        state.role = None;
        state.opponent = Weak::new();
    }

    pub fn send(&self, tag: Tag, payload: &str) -> Result<(), ConnectionLost> {
        self.with_link(|link| link.send(tag, payload))
    }

    pub fn send_block(&self, text: &str) -> Result<(), ConnectionLost> {
        self.with_link(|link| link.send_block(text))
    }

    pub fn receive_expecting(&self, tag: Tag) -> Result<String, ConnectionLost> {
        self.with_link(|link| link.receive_expecting(tag))
    }

    pub fn receive_integer(&self, tag: Tag) -> Result<i64, ConnectionLost> {
        self.with_link(|link| link.receive_integer(tag))
    }

    /// Block until the client sends its next lobby request.
    pub fn receive_intent(&self) -> Result<LobbyIntent, ConnectionLost> {
        let frame = self.with_link(|link| link.receive_frame())?;
        let text = frame.text();
        LobbyIntent::parse(&text).ok_or_else(|| {
            self.fail(ConnectionLost::ProtocolViolation(format!(
                "unrecognized lobby request {text:?}"
            )))
        })
    }

    /// Liveness probe: the client must echo `token` back verbatim.
    pub fn probe(&self, token: &str) -> Result<(), ConnectionLost> {
        self.send(Tag::Echo, token)?;
        let echoed = self.receive_expecting(Tag::EchoAck)?;
        if echoed != token {
            return Err(self.fail(ConnectionLost::ProtocolViolation(format!(
                "echo mismatch: sent {token:?}, got {echoed:?}"
            ))));
        }
        Ok(())
    }

    /// Deliver match setup in three confirmed steps: id, mark, then the
    /// opponent's id. Each step must be acknowledged with `c1`, `c2`, `c3`.
    pub fn begin_match_handshake(
        &self,
        opponent_id: PlayerId,
        role: Mark,
        opponent_peer_id: PlayerId,
    ) -> Result<(), ConnectionLost> {
        let steps = [
            (Tag::Assigned, opponent_id.to_string(), "1"),
            (Tag::Role, role.to_string(), "2"),
            (Tag::Integer, opponent_peer_id.to_string(), "3"),
        ];
        for (tag, payload, confirmation) in steps {
            self.send(tag, &payload)?;
            let got = self.receive_expecting(Tag::Confirm)?;
            if got != confirmation {
                return Err(self.fail(ConnectionLost::ProtocolViolation(format!(
                    "expected handshake confirmation {confirmation}, got {got:?}"
                ))));
            }
        }
        debug!("player {} confirmed match setup", self.id);
        Ok(())
    }

    /// Best-effort `Q` notification. Failures are ignored and do not enter
    /// the lost path.
    pub fn notify_quit(&self, reason: &str) {
        let _ = lock(&self.link).send(Tag::Quit, reason);
    }

    /// Enter the lost path with `cause`: record it, tell the opponent, and
    /// hand the cause back for propagation.
    pub fn fail(&self, cause: ConnectionLost) -> ConnectionLost {
        let opponent = {
            let mut state = lock(&self.state);
            if state.lost.is_none() {
                state.lost = Some(cause.clone());
            }
            state.opponent.upgrade()
        };
        info!("player {} connection lost: {cause}", self.id);
        if let Some(opponent) = opponent {
            opponent.notify_quit(OPPONENT_LOST_MESSAGE);
        }
        cause
    }

    /// Close both directions of the underlying socket.
    pub fn shutdown(&self) {
        let _ = lock(&self.link).reader().get_ref().shutdown(Shutdown::Both);
    }

    fn with_link<T>(
        &self,
        op: impl FnOnce(&mut Link) -> Result<T, CodecError>,
    ) -> Result<T, ConnectionLost> {
        let result = {
            let mut link = lock(&self.link);
            op(&mut *link)
        };
        result.map_err(|err| self.fail(err.into()))
    }
}
