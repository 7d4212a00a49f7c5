// Protocol vocabulary for client-server communication.
//
// A tagged message is one character of tag followed by a free-form payload.
// By convention server-to-client tags are upper-case and client-to-server
// tags are lower-case:
// - `Tag`: every tag the in-game and match-setup exchange uses.
// - `TurnSignal`: the payload of a `C` message (your turn / wait / outcome).
// - `LobbyIntent`: what a client asks for while idle in the lobby. Lobby
//   input reuses letters that are also tags (`c`, `e`), so it is parsed from
//   the raw frame text rather than through `Tag`.
// - `ResponseCode`: untagged one-word replies to join and register requests.
// - `ListingRecord`: one lobby row, shipped as a JSON array inside an
//   untagged block capped at a fixed byte size.

use serde::{Deserialize, Serialize};

use crate::types::{ListingId, PlayerId};

/// Placeholder shown in a listing's second slot until someone joins.
pub const WAITING_FOR_PLAYER: &str = "Waiting for player";

/// Default cap for the lobby browse block, in bytes.
pub const LISTING_BLOCK_MAX: usize = 4096;

/// Recognized message tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// S→C: a player id (own id after registration, or match setup step 1).
    Assigned,
    /// C→S: handshake confirmation `1`/`2`/`3`.
    Confirm,
    /// S→C: the assigned mark.
    Role,
    /// S→C: opponent id during setup, or the opponent's relayed move.
    Integer,
    /// S→C: nine board characters, space meaning empty.
    Board,
    /// S→C: a `TurnSignal`.
    Command,
    /// C→S: the mover's chosen cell, 1–9.
    Move,
    /// S→C: the winning triple's three cell indices.
    Path,
    /// S→C: abort with a human-readable reason.
    Quit,
    /// C→S: the client gave up on the connection.
    ClientQuit,
    /// S→C: liveness probe; the client echoes the payload back.
    Echo,
    /// C→S: echo acknowledgement.
    EchoAck,
}

impl Tag {
    pub fn as_char(self) -> char {
        match self {
            Tag::Assigned => 'A',
            Tag::Confirm => 'c',
            Tag::Role => 'R',
            Tag::Integer => 'I',
            Tag::Board => 'B',
            Tag::Command => 'C',
            Tag::Move => 'i',
            Tag::Path => 'P',
            Tag::Quit => 'Q',
            Tag::ClientQuit => 'q',
            Tag::Echo => 'E',
            Tag::EchoAck => 'e',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'A' => Tag::Assigned,
            'c' => Tag::Confirm,
            'R' => Tag::Role,
            'I' => Tag::Integer,
            'B' => Tag::Board,
            'C' => Tag::Command,
            'i' => Tag::Move,
            'P' => Tag::Path,
            'Q' => Tag::Quit,
            'q' => Tag::ClientQuit,
            'E' => Tag::Echo,
            'e' => Tag::EchoAck,
            _ => return None,
        })
    }

    /// Tags whose payload must parse as a base-10 integer.
    pub fn carries_integer(self) -> bool {
        matches!(self, Tag::Assigned | Tag::Integer | Tag::Move)
    }
}

/// A decoded frame: the first character and everything after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub tag: char,
    pub payload: String,
}

impl Frame {
    /// The frame's recognized tag, if any.
    pub fn known_tag(&self) -> Option<Tag> {
        Tag::from_char(self.tag)
    }

    /// The frame text as it was sent (tag included).
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.payload.len() + 1);
        text.push(self.tag);
        text.push_str(&self.payload);
        text
    }
}

/// Payload of a `C` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnSignal {
    YourTurn,
    Wait,
    Draw,
    Win,
    Loss,
}

impl TurnSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnSignal::YourTurn => "Y",
            TurnSignal::Wait => "N",
            TurnSignal::Draw => "D",
            TurnSignal::Win => "W",
            TurnSignal::Loss => "L",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Y" => Some(TurnSignal::YourTurn),
            "N" => Some(TurnSignal::Wait),
            "D" => Some(TurnSignal::Draw),
            "W" => Some(TurnSignal::Win),
            "L" => Some(TurnSignal::Loss),
            _ => None,
        }
    }
}

/// Untagged replies to join and registration requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    Accepted,
    GameFull,
    GameNotFound,
    InvalidName,
}

impl ResponseCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCode::Accepted => "1",
            ResponseCode::GameFull => "-1",
            ResponseCode::GameNotFound => "-2",
            ResponseCode::InvalidName => "-3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1" => Some(ResponseCode::Accepted),
            "-1" => Some(ResponseCode::GameFull),
            "-2" => Some(ResponseCode::GameNotFound),
            "-3" => Some(ResponseCode::InvalidName),
            _ => None,
        }
    }
}

/// A request from a client idling in the lobby.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LobbyIntent {
    NewGame,
    Refresh,
    Stats,
    ReadChat,
    Chat(String),
    Join(ListingId),
    Exit,
    /// The client gave up (`q`), optionally with a reason.
    Quit(String),
}

impl LobbyIntent {
    /// Parse the full text of a lobby frame. Returns `None` for anything the
    /// lobby does not understand.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(chat) = text.strip_prefix('>') {
            return Some(LobbyIntent::Chat(chat.to_string()));
        }
        if let Some(reason) = text.strip_prefix('q') {
            return Some(LobbyIntent::Quit(reason.to_string()));
        }
        match text {
            "n" => return Some(LobbyIntent::NewGame),
            "r" => return Some(LobbyIntent::Refresh),
            "s" => return Some(LobbyIntent::Stats),
            "c" => return Some(LobbyIntent::ReadChat),
            "e" => return Some(LobbyIntent::Exit),
            _ => {}
        }
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            return text.parse().ok().map(|id| LobbyIntent::Join(ListingId(id)));
        }
        None
    }

    /// The wire text for this intent (what a client sends).
    pub fn to_text(&self) -> String {
        match self {
            LobbyIntent::NewGame => "n".into(),
            LobbyIntent::Refresh => "r".into(),
            LobbyIntent::Stats => "s".into(),
            LobbyIntent::ReadChat => "c".into(),
            LobbyIntent::Chat(text) => format!(">{text}"),
            LobbyIntent::Join(id) => id.0.to_string(),
            LobbyIntent::Exit => "e".into(),
            LobbyIntent::Quit(reason) => format!("q{reason}"),
        }
    }
}

/// One row of the lobby browse view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: ListingId,
    pub player_one: String,
    pub player_one_id: PlayerId,
    pub player_two: String,
    pub player_two_id: Option<PlayerId>,
}

/// Serialize listing rows as a JSON array no longer than `max_bytes`.
/// Rows that would push the block past the cap are dropped from the tail.
pub fn encode_listing_block(records: &[ListingRecord], max_bytes: usize) -> String {
    let mut take = records.len();
    loop {
        let block = serde_json::to_string(&records[..take]).unwrap_or_else(|_| "[]".into());
        if block.len() <= max_bytes || take == 0 {
            return block;
        }
        take -= 1;
    }
}

/// Parse a lobby browse block.
pub fn decode_listing_block(block: &str) -> serde_json::Result<Vec<ListingRecord>> {
    serde_json::from_str(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32) -> ListingRecord {
        ListingRecord {
            id: ListingId(id),
            player_one: format!("player-{id}"),
            player_one_id: PlayerId(id),
            player_two: WAITING_FOR_PLAYER.into(),
            player_two_id: None,
        }
    }

    #[test]
    fn every_tag_char_maps_back() {
        for c in "AcRIBCiPQqEe".chars() {
            let tag = Tag::from_char(c).unwrap();
            assert_eq!(tag.as_char(), c);
        }
        assert_eq!(Tag::from_char('Z'), None);
        assert_eq!(Tag::from_char('>'), None);
    }

    #[test]
    fn lobby_intents_parse_from_raw_text() {
        assert_eq!(LobbyIntent::parse("n"), Some(LobbyIntent::NewGame));
        assert_eq!(LobbyIntent::parse("c"), Some(LobbyIntent::ReadChat));
        assert_eq!(LobbyIntent::parse("e"), Some(LobbyIntent::Exit));
        assert_eq!(
            LobbyIntent::parse(">hello all"),
            Some(LobbyIntent::Chat("hello all".into()))
        );
        assert_eq!(
            LobbyIntent::parse("17"),
            Some(LobbyIntent::Join(ListingId(17)))
        );
        assert_eq!(LobbyIntent::parse("q"), Some(LobbyIntent::Quit(String::new())));
        assert_eq!(LobbyIntent::parse("x"), None);
        assert_eq!(LobbyIntent::parse(""), None);
        assert_eq!(LobbyIntent::parse("-2"), None);
        assert_eq!(LobbyIntent::parse("99999999999"), None);
    }

    #[test]
    fn intent_text_is_what_parse_accepts() {
        let intent = LobbyIntent::Chat("gg".into());
        assert_eq!(LobbyIntent::parse(&intent.to_text()), Some(intent));
        assert_eq!(LobbyIntent::Join(ListingId(3)).to_text(), "3");
    }

    #[test]
    fn listing_block_is_truncated_to_cap() {
        let records: Vec<_> = (1..=200).map(record).collect();
        let block = encode_listing_block(&records, LISTING_BLOCK_MAX);
        assert!(block.len() <= LISTING_BLOCK_MAX);

        let decoded = decode_listing_block(&block).unwrap();
        assert!(!decoded.is_empty());
        assert!(decoded.len() < records.len());
        assert_eq!(decoded[..], records[..decoded.len()]);
    }

    #[test]
    fn empty_lobby_is_an_empty_array() {
        assert_eq!(encode_listing_block(&[], LISTING_BLOCK_MAX), "[]");
        assert!(decode_listing_block("[]").unwrap().is_empty());
    }

    #[test]
    fn response_codes_match_wire_values() {
        assert_eq!(ResponseCode::GameFull.as_str(), "-1");
        assert_eq!(ResponseCode::parse("-2"), Some(ResponseCode::GameNotFound));
        assert_eq!(ResponseCode::parse("0"), None);
    }
}
