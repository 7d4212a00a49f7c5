// Protocol-level client for the lobby server.
//
// `LobbyClient` speaks the client side of the wire protocol over one blocking
// TCP stream and returns typed values; it does no rendering. Every lobby
// request is answered synchronously except `new_game` (the creator hears
// nothing until someone joins, then `await_match`) and chat (no reply).
//
// Reads use the client dialect: echo probes are answered transparently and a
// `Q` from the server surfaces as `ClientError::Codec(ConnectionTerminated)`,
// whose reason `terminated_reason` extracts. After an aborted game the server
// still sends a lobby block, so `return_to_lobby` works after either outcome.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use tictactoe_protocol::{
    Codec, CodecError, Dialect, ListingId, ListingRecord, LobbyIntent, Mark, PlayerId,
    ResponseCode, Tag, TurnSignal, decode_listing_block, parse_integer,
};

use crate::error::JoinError;
use crate::game::Board;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("display name rejected")]
    InvalidName,
    #[error("join refused: {0}")]
    Rejected(JoinError),
    #[error("unexpected reply from server: {0:?}")]
    UnexpectedReply(String),
    #[error("malformed lobby listing: {0}")]
    Listing(#[from] serde_json::Error),
}

impl ClientError {
    /// The server's reason, if this error is a `Q` abort.
    pub fn terminated_reason(&self) -> Option<&str> {
        match self {
            ClientError::Codec(CodecError::ConnectionTerminated(reason)) => Some(reason),
            _ => None,
        }
    }
}

/// Match setup as delivered by the three-step handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchInfo {
    pub opponent_id: PlayerId,
    pub mark: Mark,
    pub opponent_peer_id: PlayerId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Draw,
    Won,
    Lost,
}

/// One step of a game, from this player's point of view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    /// Send a move with `send_move`.
    YourMove { board: Board },
    /// The opponent picked `cell` (1-9), whether or not it was free.
    OpponentMoved { board: Board, cell: u8 },
    Finished {
        board: Board,
        result: MatchResult,
        /// The winning triple, unless the game was a draw.
        path: Option<[usize; 3]>,
    },
}

pub struct LobbyClient {
    codec: Codec<BufReader<TcpStream>, BufWriter<TcpStream>>,
    player_id: PlayerId,
    name: String,
}

impl LobbyClient {
    /// Connect, register `name`, and return the client with the initial
    /// lobby listing.
    pub fn connect(
        addr: impl ToSocketAddrs,
        name: &str,
    ) -> Result<(Self, Vec<ListingRecord>), ClientError> {
        let stream = TcpStream::connect(addr).map_err(CodecError::from)?;
        let reader = BufReader::new(stream.try_clone().map_err(CodecError::from)?);
        let mut codec = Codec::new(reader, BufWriter::new(stream), Dialect::CLIENT);

        codec.send_block(name)?;
        let reply = codec.receive_frame()?;
        if reply.known_tag() != Some(Tag::Assigned) {
            let text = reply.text();
            return Err(match ResponseCode::parse(&text) {
                Some(ResponseCode::InvalidName) => ClientError::InvalidName,
                _ => ClientError::UnexpectedReply(text),
            });
        }
        let player_id = to_player_id(parse_integer(&reply.payload)?)?;

        let mut client = Self {
            codec,
            player_id,
            name: name.trim().to_string(),
        };
        let listings = client.return_to_lobby()?;
        Ok((client, listings))
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound every blocking read. `None` waits forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.codec
            .reader()
            .get_ref()
            .set_read_timeout(timeout)
            .map_err(CodecError::from)?;
        Ok(())
    }

    pub fn refresh(&mut self) -> Result<Vec<ListingRecord>, ClientError> {
        self.request(LobbyIntent::Refresh)?;
        self.return_to_lobby()
    }

    pub fn stats(&mut self) -> Result<String, ClientError> {
        self.request(LobbyIntent::Stats)?;
        Ok(self.codec.receive_block()?)
    }

    /// The whole chat log; a single space when it is empty.
    pub fn read_chat(&mut self) -> Result<String, ClientError> {
        self.request(LobbyIntent::ReadChat)?;
        Ok(self.codec.receive_block()?)
    }

    pub fn chat(&mut self, text: &str) -> Result<(), ClientError> {
        self.request(LobbyIntent::Chat(text.to_string()))
    }

    /// Open a listing. Follow with `await_match`.
    pub fn new_game(&mut self) -> Result<(), ClientError> {
        self.request(LobbyIntent::NewGame)
    }

    /// Ask to join a listing. Follow a success with `await_match`.
    pub fn join(&mut self, id: ListingId) -> Result<(), ClientError> {
        self.request(LobbyIntent::Join(id))?;
        let reply = self.codec.receive_block()?;
        match ResponseCode::parse(&reply) {
            Some(ResponseCode::Accepted) => Ok(()),
            Some(ResponseCode::GameFull) => Err(ClientError::Rejected(JoinError::GameFull)),
            Some(ResponseCode::GameNotFound) => {
                Err(ClientError::Rejected(JoinError::GameNotFound))
            }
            _ => Err(ClientError::UnexpectedReply(reply)),
        }
    }

    /// Run the client half of match setup, confirming each step.
    pub fn await_match(&mut self) -> Result<MatchInfo, ClientError> {
        let opponent_id = to_player_id(self.codec.receive_integer(Tag::Assigned)?)?;
        self.codec.send(Tag::Confirm, "1")?;
        let role = self.codec.receive_expecting(Tag::Role)?;
        let mark = role
            .chars()
            .next()
            .and_then(Mark::from_char)
            .ok_or_else(|| ClientError::UnexpectedReply(role.clone()))?;
        self.codec.send(Tag::Confirm, "2")?;
        let opponent_peer_id = to_player_id(self.codec.receive_integer(Tag::Integer)?)?;
        self.codec.send(Tag::Confirm, "3")?;
        Ok(MatchInfo {
            opponent_id,
            mark,
            opponent_peer_id,
        })
    }

    /// Block until the next turn or the end of the game.
    pub fn next_turn(&mut self) -> Result<TurnEvent, ClientError> {
        let wire = self.codec.receive_expecting(Tag::Board)?;
        let board = Board::from_wire(&wire).ok_or(ClientError::UnexpectedReply(wire))?;
        let command = self.codec.receive_expecting(Tag::Command)?;
        let result = match TurnSignal::parse(&command) {
            Some(TurnSignal::YourTurn) => return Ok(TurnEvent::YourMove { board }),
            Some(TurnSignal::Wait) => {
                let cell = self.codec.receive_integer(Tag::Integer)?;
                let cell = u8::try_from(cell)
                    .map_err(|_| ClientError::UnexpectedReply(cell.to_string()))?;
                return Ok(TurnEvent::OpponentMoved { board, cell });
            }
            Some(TurnSignal::Draw) => MatchResult::Draw,
            Some(TurnSignal::Win) => MatchResult::Won,
            Some(TurnSignal::Loss) => MatchResult::Lost,
            None => return Err(ClientError::UnexpectedReply(command)),
        };
        let path = match result {
            MatchResult::Draw => None,
            MatchResult::Won | MatchResult::Lost => {
                let wire = self.codec.receive_expecting(Tag::Path)?;
                Some(parse_path(&wire).ok_or(ClientError::UnexpectedReply(wire))?)
            }
        };
        Ok(TurnEvent::Finished {
            board,
            result,
            path,
        })
    }

    /// Submit a cell, 1-9.
    pub fn send_move(&mut self, cell: u8) -> Result<(), ClientError> {
        Ok(self.codec.send(Tag::Move, &cell.to_string())?)
    }

    /// Read the lobby block the server sends after registration and after
    /// every game.
    pub fn return_to_lobby(&mut self) -> Result<Vec<ListingRecord>, ClientError> {
        let block = self.codec.receive_block()?;
        Ok(decode_listing_block(&block)?)
    }

    /// Leave the lobby cleanly.
    pub fn exit(mut self) -> Result<(), ClientError> {
        self.request(LobbyIntent::Exit)
    }

    /// Give up on the connection with a reason the server logs.
    pub fn quit(mut self, reason: &str) -> Result<(), ClientError> {
        Ok(self.codec.send(Tag::ClientQuit, reason)?)
    }

    fn request(&mut self, intent: LobbyIntent) -> Result<(), ClientError> {
        Ok(self.codec.send_block(&intent.to_text())?)
    }
}

fn to_player_id(value: i64) -> Result<PlayerId, ClientError> {
    u32::try_from(value)
        .map(PlayerId)
        .map_err(|_| ClientError::UnexpectedReply(value.to_string()))
}

fn parse_path(wire: &str) -> Option<[usize; 3]> {
    let digits: Vec<usize> = wire
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as usize))
        .collect::<Option<_>>()?;
    digits.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winning_path_parses_three_digits() {
        assert_eq!(parse_path("048"), Some([0, 4, 8]));
        assert_eq!(parse_path("01"), None);
        assert_eq!(parse_path("0a2"), None);
    }

    #[test]
    fn quit_reason_is_exposed() {
        let err = ClientError::from(CodecError::ConnectionTerminated("bye".into()));
        assert_eq!(err.terminated_reason(), Some("bye"));
        assert_eq!(ClientError::InvalidName.terminated_reason(), None);
    }
}
