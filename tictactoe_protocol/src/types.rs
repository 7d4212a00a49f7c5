// Core ID and mark types for the lobby protocol.
//
// These are lightweight newtypes shared by `message.rs` (listing records,
// match setup payloads) and the server's session and lobby registry. Both IDs
// are server-assigned, monotonically increasing, and never reused within a
// process lifetime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned player ID, handed out at name registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Lobby listing ID. The first listing created is `ListingId(1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two marks a paired player places on the board. The listing
/// creator always plays `X` and moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// The board/wire character for this mark.
    pub fn as_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'X' => Some(Mark::X),
            'O' => Some(Mark::O),
            _ => None,
        }
    }

    /// The other mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_distinct_and_reversible() {
        assert_ne!(Mark::X, Mark::X.opponent());
        assert_eq!(Mark::X.opponent().opponent(), Mark::X);
        assert_eq!(Mark::from_char(Mark::O.as_char()), Some(Mark::O));
        assert_eq!(Mark::from_char(' '), None);
    }
}
