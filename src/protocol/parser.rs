//! Shared parsing helpers
//!
//! Two-phase parsing, the same for every message:
//! 1. Find the first line (up to \r\n) and parse it
//! 2. For value-bearing messages, require exactly the declared number of
//!    bytes followed by \r\n

use crate::protocol::cursor::Cursor;
use crate::protocol::{Decode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::BufRead;
use tracing::trace;

/// Find the end of the first line (the index of its \r).
///
/// Returns `Ok(None)` if no line terminator has arrived yet, and an error if
/// the first \n is not preceded by \r.
pub(crate) fn find_line(buf: &[u8]) -> std::result::Result<Option<usize>, ProtocolError> {
    match memchr::memchr(b'\n', buf) {
        None => Ok(None),
        Some(i) if i > 0 && buf[i - 1] == b'\r' => Ok(Some(i - 1)),
        Some(_) => Err(ProtocolError::ExpectedCrlf),
    }
}

/// Consume the single space that must follow the token named `after`
pub(crate) fn expect_space(
    cur: &mut Cursor<'_>,
    after: &'static str,
) -> std::result::Result<(), ProtocolError> {
    if cur.eat(b' ') {
        Ok(())
    } else {
        Err(ProtocolError::MissingSeparator(after))
    }
}

/// Slice out a length-prefixed payload that starts at `start`.
///
/// Returns the payload and the offset just past its trailing \r\n, `Ok(None)`
/// if more bytes are needed, or an error if the bytes following the payload
/// are not \r\n.
pub(crate) fn payload(
    buf: &[u8],
    start: usize,
    len: usize,
) -> std::result::Result<Option<(&[u8], usize)>, ProtocolError> {
    let overflow = ProtocolError::PayloadLengthMismatch { expected: len };
    let end = start.checked_add(len).ok_or_else(|| overflow.clone())?;
    let total = end.checked_add(2).ok_or(overflow)?;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[end..total] != b"\r\n" {
        return Err(ProtocolError::PayloadLengthMismatch { expected: len });
    }
    Ok(Some((&buf[start..end], total)))
}

/// Map `CLIENT_ERROR` / `SERVER_ERROR` lines to errors carrying the server text
pub(crate) fn server_error(line: &[u8]) -> Option<ProtocolError> {
    let text = |rest: &[u8]| {
        String::from_utf8_lossy(rest.strip_prefix(b" ").unwrap_or(rest)).into_owned()
    };
    if let Some(rest) = line.strip_prefix(b"CLIENT_ERROR") {
        return Some(ProtocolError::ClientError(text(rest)));
    }
    if let Some(rest) = line.strip_prefix(b"SERVER_ERROR") {
        return Some(ProtocolError::ServerError(text(rest)));
    }
    None
}

pub(crate) fn unexpected_reply(line: &[u8]) -> ProtocolError {
    ProtocolError::UnexpectedReply(String::from_utf8_lossy(line).into_owned())
}

/// Keys are printable ASCII without spaces
#[inline]
pub(crate) fn is_key_byte(b: u8) -> bool {
    b > b' ' && b < 127
}

fn is_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

/// Parse bytes as u16
pub(crate) fn parse_u16(bytes: &[u8]) -> Option<u16> {
    parse_u64(bytes)?.try_into().ok()
}

/// Parse bytes as u32
pub(crate) fn parse_u32(bytes: &[u8]) -> Option<u32> {
    parse_u64(bytes)?.try_into().ok()
}

/// Parse bytes as u64 (digits only, no sign)
pub(crate) fn parse_u64(bytes: &[u8]) -> Option<u64> {
    if !is_digits(bytes) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse bytes as usize
pub(crate) fn parse_usize(bytes: &[u8]) -> Option<usize> {
    parse_u64(bytes)?.try_into().ok()
}

/// Parse bytes as i64 (optional leading '-')
pub(crate) fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if !is_digits(digits) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Read one message from a blocking source.
///
/// Reads whole lines until `T::parse` completes. Every message ends in \r\n,
/// so this never consumes bytes belonging to the next message.
pub(crate) fn read_message<T: Decode, R: BufRead>(src: &mut R) -> Result<T> {
    let mut buf = Vec::new();
    loop {
        let n = src.read_until(b'\n', &mut buf)?;
        if n == 0 {
            if buf.is_empty() {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            return Err(ProtocolError::Incomplete.into());
        }
        match T::parse(&buf) {
            ParseResult::Complete(msg, consumed) => {
                if consumed != buf.len() {
                    return Err(ProtocolError::TrailingData(buf.len() - consumed).into());
                }
                trace!(bytes = consumed, "decoded message");
                return Ok(msg);
            }
            ParseResult::NeedMoreData => {}
            ParseResult::Error(e) => return Err(e.into()),
        }
    }
}
