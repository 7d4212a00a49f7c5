// Test-only helpers: localhost socket pairs and a scripted client end.
//
// `ScriptedPeer` is the client half of a connection, driven synchronously by
// a test. Frames a test writes ahead of time sit in the socket buffer until
// the server side reads them, so most engine and lobby tests can script a
// whole exchange up front and then assert on what the server sent back.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use tictactoe_protocol::{Codec, CodecError, Dialect, Frame, PlayerId, Tag};

use crate::session::{Session, open_link};

/// Create a TCP pair: (client_stream, server_stream) on localhost.
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    (client, server)
}

pub struct ScriptedPeer {
    codec: Codec<BufReader<TcpStream>, BufWriter<TcpStream>>,
}

impl ScriptedPeer {
    pub fn new(stream: TcpStream) -> Self {
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self {
            codec: Codec::new(reader, BufWriter::new(stream), Dialect::CLIENT),
        }
    }

    pub fn send(&mut self, tag: Tag, payload: &str) {
        self.codec.send(tag, payload).unwrap();
    }

    /// Send raw frame text, as lobby requests are sent.
    pub fn send_text(&mut self, text: &str) {
        self.codec.send_block(text).unwrap();
    }

    pub fn expect(&mut self, tag: Tag) -> String {
        self.codec.receive_expecting(tag).unwrap()
    }

    pub fn expect_integer(&mut self, tag: Tag) -> i64 {
        self.codec.receive_integer(tag).unwrap()
    }

    pub fn expect_block(&mut self) -> String {
        self.codec.receive_block().unwrap()
    }

    /// Read the next frame, which must be a `Q` abort. Returns its reason.
    pub fn expect_quit(&mut self) -> String {
        match self.codec.receive_frame() {
            Err(CodecError::ConnectionTerminated(reason)) => reason,
            other => panic!("expected Q, got {other:?}"),
        }
    }

    /// The next frame, or the reason carried by a `Q` abort.
    pub fn next_frame(&mut self) -> Result<Frame, String> {
        match self.codec.receive_frame() {
            Ok(frame) => Ok(frame),
            Err(CodecError::ConnectionTerminated(reason)) => Err(reason),
            Err(other) => panic!("transport failure while reading: {other}"),
        }
    }

    /// Consume one full turn as seen by this peer: board then command.
    pub fn expect_turn(&mut self) -> (String, String) {
        let board = self.expect(Tag::Board);
        let command = self.expect(Tag::Command);
        (board, command)
    }
}

/// A registered session wired to a scripted client.
pub fn connected_session(id: u32, name: &str) -> (Arc<Session>, ScriptedPeer) {
    let (client, server) = tcp_pair();
    let session = Session::register(PlayerId(id), name, open_link(&server).unwrap()).unwrap();
    (Arc::new(session), ScriptedPeer::new(client))
}
