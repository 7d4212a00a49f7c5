// Tagged message codec layered on `framing.rs`.
//
// `encode`/`decode` convert between a `(tag, payload)` pair and frame bytes.
// `Codec` owns a reader/writer pair and enforces the receive rules both ends
// of the protocol share:
// - A frame carrying the reading side's quit tag ends the exchange with
//   `CodecError::ConnectionTerminated`. The reason is the payload; a bare quit
//   tag gets one best-effort extra read for a trailing reason frame.
// - A frame carrying the echo probe tag (client side only) is answered
//   immediately with the acknowledgement tag and the same payload, and the
//   read continues. Callers never see probes.
// - `receive_expecting` rejects any other tag than the one asked for, and
//   integer-carrying tags must hold a base-10 integer.
//
// `Dialect` captures which tags are special for the reading side, so the
// server and the client share this one implementation.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::framing::{read_message, write_message};
use crate::message::{Frame, Tag};

/// Everything that can go wrong reading or writing a tagged message.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("transport failure: {0}")]
    Io(#[from] io::Error),
    #[error("received an empty frame")]
    EmptyFrame,
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("expected tag '{expected}', found '{found}'")]
    UnexpectedTag { expected: char, found: char },
    #[error("malformed integer payload {0:?}")]
    MalformedInteger(String),
    #[error("peer terminated the connection: {0}")]
    ConnectionTerminated(String),
}

impl CodecError {
    /// True when the failure came from the underlying stream rather than
    /// from what the peer sent.
    pub fn is_transport(&self) -> bool {
        matches!(self, CodecError::Io(_))
    }
}

/// Which tags carry special meaning for the reading side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dialect {
    pub quit: Tag,
    /// `(probe, acknowledgement)` when this side answers liveness probes.
    pub echo: Option<(Tag, Tag)>,
}

impl Dialect {
    /// The server reads client frames: `q` quits, no probes.
    pub const SERVER: Dialect = Dialect {
        quit: Tag::ClientQuit,
        echo: None,
    };

    /// The client reads server frames: `Q` quits, `E` is echoed as `e`.
    pub const CLIENT: Dialect = Dialect {
        quit: Tag::Quit,
        echo: Some((Tag::Echo, Tag::EchoAck)),
    };
}

/// Concatenate tag and payload into frame bytes.
pub fn encode(tag: Tag, payload: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 1);
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(tag.as_char().encode_utf8(&mut buf).as_bytes());
    bytes.extend_from_slice(payload.as_bytes());
    bytes
}

/// Split frame bytes into the first character and the rest.
pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?;
    let mut chars = text.chars();
    let tag = chars.next().ok_or(CodecError::EmptyFrame)?;
    Ok(Frame {
        tag,
        payload: chars.as_str().to_string(),
    })
}

/// Parse an integer payload.
pub fn parse_integer(payload: &str) -> Result<i64, CodecError> {
    payload
        .trim()
        .parse()
        .map_err(|_| CodecError::MalformedInteger(payload.to_string()))
}

/// A reader/writer pair speaking the tagged protocol.
pub struct Codec<R, W> {
    reader: R,
    writer: W,
    dialect: Dialect,
}

impl<R: Read, W: Write> Codec<R, W> {
    pub fn new(reader: R, writer: W, dialect: Dialect) -> Self {
        Self {
            reader,
            writer,
            dialect,
        }
    }

    /// Send one tagged message as a single frame.
    pub fn send(&mut self, tag: Tag, payload: &str) -> Result<(), CodecError> {
        write_message(&mut self.writer, &encode(tag, payload))?;
        Ok(())
    }

    /// Send an untagged text block (lobby listing, stats, chat, response
    /// codes, the client's name).
    pub fn send_block(&mut self, text: &str) -> Result<(), CodecError> {
        write_message(&mut self.writer, text.as_bytes())?;
        Ok(())
    }

    /// Read an untagged text block verbatim. No tag rules apply.
    pub fn receive_block(&mut self) -> Result<String, CodecError> {
        let bytes = read_message(&mut self.reader)?;
        String::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)
    }

    /// Read the next frame, applying the quit and echo rules.
    pub fn receive_frame(&mut self) -> Result<Frame, CodecError> {
        loop {
            let frame = decode(&read_message(&mut self.reader)?)?;
            if frame.tag == self.dialect.quit.as_char() {
                return Err(CodecError::ConnectionTerminated(self.quit_reason(frame)));
            }
            match self.dialect.echo {
                Some((probe, ack)) if frame.tag == probe.as_char() => {
                    self.send(ack, &frame.payload)?;
                }
                _ => return Ok(frame),
            }
        }
    }

    /// Read the next frame and require it to carry `expected`. Returns the
    /// payload.
    pub fn receive_expecting(&mut self, expected: Tag) -> Result<String, CodecError> {
        let frame = self.receive_frame()?;
        if frame.tag != expected.as_char() {
            return Err(CodecError::UnexpectedTag {
                expected: expected.as_char(),
                found: frame.tag,
            });
        }
        if expected.carries_integer() {
            parse_integer(&frame.payload)?;
        }
        Ok(frame.payload)
    }

    /// Read an integer-carrying message.
    pub fn receive_integer(&mut self, expected: Tag) -> Result<i64, CodecError> {
        let payload = self.receive_expecting(expected)?;
        parse_integer(&payload)
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn quit_reason(&mut self, frame: Frame) -> String {
        if !frame.payload.is_empty() {
            return frame.payload;
        }
        read_message(&mut self.reader)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default()
    }
}
