//! Newline-framed text codec for the ingestion listener.
//!
//! Splits the inbound byte stream into lines (LF-terminated, optional
//! trailing CR stripped) and encodes outbound responses the same way.
//! Oversized lines are an error rather than unbounded buffering.

use bytes::{BufMut, BytesMut};
use std::io::{Error as IoError, ErrorKind};
use tokio_util::codec::{Decoder, Encoder};

/// Default cap on a single command line.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

pub struct CommandCodec {
    max_line_len: usize,
}

impl CommandCodec {
    pub fn new() -> Self {
        CommandCodec {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        debug_assert!(max_line_len > 0, "Precondition: max_line_len must be positive");
        CommandCodec { max_line_len }
    }

    fn take_line(src: &mut BytesMut, newline_pos: usize) -> String {
        let line = src.split_to(newline_pos + 1);
        let mut end = line.len() - 1; // drop '\n'
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        String::from_utf8_lossy(&line[..end]).into_owned()
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CommandCodec {
    type Item = String;
    type Error = IoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, IoError> {
        match memchr::memchr(b'\n', src) {
            Some(pos) => Ok(Some(Self::take_line(src, pos))),
            None if src.len() > self.max_line_len => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("command line exceeds {} bytes", self.max_line_len),
            )),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, IoError> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                // Unterminated final line: hand it over as-is.
                let line = src.split_to(src.len());
                let mut end = line.len();
                if end > 0 && line[end - 1] == b'\r' {
                    end -= 1;
                }
                Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()))
            }
        }
    }
}

impl Encoder<String> for CommandCodec {
    type Error = IoError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), IoError> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
