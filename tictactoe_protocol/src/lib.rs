// tictactoe_protocol — wire protocol for the tic-tac-toe lobby server.
//
// This crate defines the tags, message vocabulary, framing, and codec used by
// the lobby server (`tictactoe_server`) and its clients. It is shared between
// both sides and knows nothing about sessions, listings, or game rules.
//
// Module overview:
// - `types.rs`:    ID newtypes (`PlayerId`, `ListingId`) and the `Mark` enum.
// - `message.rs`:  `Tag`, `Frame`, `TurnSignal`, `LobbyIntent`,
//                  `ResponseCode`, and the JSON lobby listing block.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then UTF-8 text.
// - `codec.rs`:    Tagged encode/decode plus `Codec`, which applies the quit,
//                  echo-probe, integer, and tag-mismatch rules on receive.
//
// Design decisions:
// - **One frame per message.** The tag+payload text of a message always
//   travels in a single frame, so the receiver never has to guess where one
//   message ends.
// - **No async runtime.** Uses `std::io::Read`/`Write`, matching the server's
//   thread-per-connection model.

pub mod codec;
pub mod framing;
pub mod message;
pub mod types;

pub use codec::{Codec, CodecError, Dialect, decode, encode, parse_integer};
pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{
    Frame, LISTING_BLOCK_MAX, ListingRecord, LobbyIntent, ResponseCode, Tag, TurnSignal,
    WAITING_FOR_PLAYER, decode_listing_block, encode_listing_block,
};
pub use types::{ListingId, Mark, PlayerId};
