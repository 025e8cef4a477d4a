//! Classic `delete <key>[ noreply]`

use crate::protocol::command::{MAX_KEY_LENGTH, validate_key};
use crate::protocol::cursor::Cursor;
use crate::protocol::parser::{expect_space, find_line, is_key_byte, parse_u64};
use crate::protocol::sink::Sink;
use crate::protocol::{Decode, Encode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::Write;

/// Remove an item. The reply (`DELETED`/`NOT_FOUND`) is not decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommand {
    key: Vec<u8>,
    noreply: bool,
}

impl DeleteCommand {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            noreply: false,
        }
    }

    #[must_use]
    pub fn with_noreply(mut self, noreply: bool) -> Self {
        self.noreply = noreply;
        self
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn is_noreply(&self) -> bool {
        self.noreply
    }
}

impl Encode for DeleteCommand {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        validate_key(&self.key)?;

        let mut sink = Sink::new(dst);
        sink.put(b"delete ")?;
        sink.put(&self.key)?;
        if self.noreply {
            sink.put(b" noreply")?;
        }
        sink.crlf()?;
        Ok(sink.written())
    }
}

impl Decode for DeleteCommand {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_delete(buf).into()
    }
}

fn parse_delete(buf: &[u8]) -> std::result::Result<Option<(DeleteCommand, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let mut cur = Cursor::new(&buf[..line_end]);

    let verb = cur.read_token();
    if verb != b"delete" {
        return Err(ProtocolError::InvalidCommand(
            String::from_utf8_lossy(verb).into_owned(),
        ));
    }
    expect_space(&mut cur, "command")?;

    let key = cur.read_while(is_key_byte);
    if key.is_empty() {
        return Err(ProtocolError::InvalidCommand(
            "delete requires a key".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }

    // Format: [exptime] [noreply]. Servers only accept an exptime of 0, so
    // it is checked for shape and dropped.
    let mut noreply = false;
    while !cur.is_empty() {
        expect_space(&mut cur, "key")?;
        match cur.read_token() {
            b"noreply" if !noreply => noreply = true,
            token if !noreply && parse_u64(token).is_some() => {}
            token => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "unexpected delete argument {:?}",
                    String::from_utf8_lossy(token)
                )));
            }
        }
    }

    Ok(Some((DeleteCommand { key: key.to_vec(), noreply }, line_end + 2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McwireError;

    #[test]
    fn test_encode() {
        assert_eq!(DeleteCommand::new("/foo").to_bytes().unwrap(), b"delete /foo\r\n");
        assert_eq!(
            DeleteCommand::new("/foo").with_noreply(true).to_bytes().unwrap(),
            b"delete /foo noreply\r\n"
        );
    }

    #[test]
    fn test_encode_rejects_empty_key() {
        assert!(matches!(
            DeleteCommand::new("").to_bytes(),
            Err(McwireError::Protocol(ProtocolError::InvalidKey(_)))
        ));
    }

    #[test]
    fn test_decode() {
        let cmd = DeleteCommand::decode(b"delete /foo\r\n").unwrap();
        assert_eq!(cmd, DeleteCommand::new("/foo"));

        let cmd = DeleteCommand::decode(b"delete /foo 0 noreply\r\n").unwrap();
        assert!(cmd.is_noreply());

        let cmd = DeleteCommand::decode(b"delete /foo noreply\r\n").unwrap();
        assert_eq!(cmd.key(), b"/foo");
        assert!(cmd.is_noreply());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            DeleteCommand::parse(b"delete\r\n"),
            ParseResult::Error(ProtocolError::MissingSeparator("command"))
        ));
        assert!(matches!(
            DeleteCommand::parse(b"delete /foo later\r\n"),
            ParseResult::Error(ProtocolError::InvalidCommand(_))
        ));
        assert!(matches!(
            DeleteCommand::parse(b"delete /foo noreply 0\r\n"),
            ParseResult::Error(ProtocolError::InvalidCommand(_))
        ));
        assert_eq!(DeleteCommand::parse(b"delete /fo"), ParseResult::NeedMoreData);
    }
}
