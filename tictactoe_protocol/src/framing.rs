// Length-delimited frame transport over TCP.
//
// Every logical protocol message (a tagged message from `codec.rs` or an
// untagged text block such as the lobby listing) travels as one frame: a
// 4-byte big-endian length prefix followed by the UTF-8 bytes. The frame
// boundary is what keeps "one message per send" intact regardless of how the
// kernel splits or coalesces TCP segments.
//
// `MAX_MESSAGE_SIZE` bounds allocation from a hostile length prefix. The
// largest legitimate frames are the stats and chat blocks, which grow with
// the roster and the chat log.

use std::io::{self, Read, Write};

/// Maximum allowed frame size (64 KiB).
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Write one frame: 4-byte big-endian length, then payload. Flushes so the
/// frame leaves as a single logical write.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = u32::try_from(msg.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame too large: {} bytes (max {MAX_MESSAGE_SIZE})",
                    msg.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(msg)?;
    writer.flush()
}

/// Read one frame.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame and
/// `InvalidData` if the length prefix exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frames_keep_boundaries() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"B   X     ").unwrap();
        write_message(&mut buf, b"CY").unwrap();

        let mut cursor = Cursor::new(&buf);
        assert_eq!(read_message(&mut cursor).unwrap(), b"B   X     ");
        assert_eq!(read_message(&mut cursor).unwrap(), b"CY");
    }

    #[test]
    fn empty_frame_is_allowed_on_the_wire() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"").unwrap();
        assert_eq!(buf.len(), 4);
        let mut cursor = Cursor::new(&buf);
        assert!(read_message(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn rejects_oversized_write() {
        let big = vec![b'x'; MAX_MESSAGE_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_read() {
        let fake_len = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_frame_is_eof() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 5, b'B']);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
