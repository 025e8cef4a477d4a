//! Classic storage commands: set, add, replace, append, prepend and cas
//!
//! All six verbs share one layout:
//! `<verb> <key> <flags> <exptime> <bytes>[ <cas>][ noreply]\r\n<data>\r\n`
//! where the CAS token is only present for `cas`.

use crate::protocol::command::{MAX_KEY_LENGTH, validate_key};
use crate::protocol::cursor::Cursor;
use crate::protocol::parser::{
    expect_space, find_line, is_key_byte, parse_i64, parse_u16, parse_u64, parse_usize, payload,
    server_error, unexpected_reply,
};
use crate::protocol::sink::Sink;
use crate::protocol::{Decode, Encode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::Write;
use tracing::trace;

/// Storage verb, matched against the complete first token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

impl StorageVerb {
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"set" => Some(StorageVerb::Set),
            b"add" => Some(StorageVerb::Add),
            b"replace" => Some(StorageVerb::Replace),
            b"append" => Some(StorageVerb::Append),
            b"prepend" => Some(StorageVerb::Prepend),
            b"cas" => Some(StorageVerb::Cas),
            _ => None,
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            StorageVerb::Set => b"set",
            StorageVerb::Add => b"add",
            StorageVerb::Replace => b"replace",
            StorageVerb::Append => b"append",
            StorageVerb::Prepend => b"prepend",
            StorageVerb::Cas => b"cas",
        }
    }
}

/// A classic storage request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCommand {
    verb: StorageVerb,
    key: Vec<u8>,
    flags: u16,
    exptime: i64,
    data: Vec<u8>,
    noreply: bool,
    cas: u64,
}

impl StorageCommand {
    pub fn new(verb: StorageVerb, key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            verb,
            key: key.into(),
            flags: 0,
            exptime: 0,
            data: data.into(),
            noreply: false,
            cas: 0,
        }
    }

    pub fn set(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(StorageVerb::Set, key, data)
    }

    pub fn add(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(StorageVerb::Add, key, data)
    }

    pub fn replace(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(StorageVerb::Replace, key, data)
    }

    pub fn append(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(StorageVerb::Append, key, data)
    }

    pub fn prepend(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(StorageVerb::Prepend, key, data)
    }

    /// Store only if the item's CAS value still equals `cas`
    pub fn cas(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>, cas: u64) -> Self {
        Self::new(StorageVerb::Cas, key, data).with_cas(cas)
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_exptime(mut self, exptime: i64) -> Self {
        self.exptime = exptime;
        self
    }

    #[must_use]
    pub fn with_noreply(mut self, noreply: bool) -> Self {
        self.noreply = noreply;
        self
    }

    /// Only written for the `cas` verb
    #[must_use]
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn verb(&self) -> StorageVerb {
        self.verb
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn exptime(&self) -> i64 {
        self.exptime
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_noreply(&self) -> bool {
        self.noreply
    }

    pub fn cas_token(&self) -> u64 {
        self.cas
    }
}

impl Encode for StorageCommand {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        validate_key(&self.key)?;

        let mut sink = Sink::new(dst);
        sink.put(self.verb.as_bytes())?;
        sink.put(b" ")?;
        sink.put(&self.key)?;
        sink.put_field(self.flags)?;
        sink.put_field(self.exptime)?;
        sink.put_field(self.data.len())?;
        if self.verb == StorageVerb::Cas {
            sink.put_field(self.cas)?;
        }
        if self.noreply {
            sink.put(b" noreply")?;
        }
        sink.crlf()?;
        sink.put(&self.data)?;
        sink.crlf()?;
        trace!(verb = ?self.verb, bytes = sink.written(), "encoded storage command");
        Ok(sink.written())
    }
}

impl Decode for StorageCommand {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_storage(buf).into()
    }
}

fn parse_storage(buf: &[u8]) -> std::result::Result<Option<(StorageCommand, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let mut cur = Cursor::new(&buf[..line_end]);

    let token = cur.read_token();
    let verb = StorageVerb::from_token(token).ok_or_else(|| {
        ProtocolError::InvalidCommand(String::from_utf8_lossy(token).into_owned())
    })?;
    expect_space(&mut cur, "command")?;

    let key = cur.read_while(is_key_byte);
    if key.is_empty() {
        return Err(ProtocolError::InvalidCommand("missing key".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }
    expect_space(&mut cur, "key")?;

    let token = cur.read_token();
    let flags = parse_u16(token).ok_or_else(|| ProtocolError::invalid_number("flags", token))?;
    expect_space(&mut cur, "flags")?;

    let token = cur.read_token();
    let exptime =
        parse_i64(token).ok_or_else(|| ProtocolError::invalid_number("exptime", token))?;
    expect_space(&mut cur, "exptime")?;

    let token = cur.read_token();
    let bytes = parse_usize(token).ok_or_else(|| ProtocolError::invalid_number("bytes", token))?;

    let mut cas = 0;
    if verb == StorageVerb::Cas {
        expect_space(&mut cur, "bytes")?;
        let token = cur.read_token();
        cas = parse_u64(token).ok_or_else(|| ProtocolError::invalid_number("cas", token))?;
    }

    let mut noreply = false;
    if !cur.is_empty() {
        expect_space(&mut cur, "bytes")?;
        if cur.rest() != b"noreply" {
            return Err(ProtocolError::InvalidCommand(format!(
                "expected noreply, got {:?}",
                String::from_utf8_lossy(cur.rest())
            )));
        }
        noreply = true;
    }

    let Some((data, consumed)) = payload(buf, line_end + 2, bytes)? else {
        return Ok(None);
    };

    let cmd = StorageCommand {
        verb,
        key: key.to_vec(),
        flags,
        exptime,
        data: data.to_vec(),
        noreply,
        cas,
    };
    Ok(Some((cmd, consumed)))
}

/// Outcome of a classic storage command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

impl StorageStatus {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            StorageStatus::Stored => b"STORED",
            StorageStatus::NotStored => b"NOT_STORED",
            StorageStatus::Exists => b"EXISTS",
            StorageStatus::NotFound => b"NOT_FOUND",
        }
    }

    fn from_line(line: &[u8]) -> Option<Self> {
        match line {
            b"STORED" => Some(StorageStatus::Stored),
            b"NOT_STORED" => Some(StorageStatus::NotStored),
            b"EXISTS" => Some(StorageStatus::Exists),
            b"NOT_FOUND" => Some(StorageStatus::NotFound),
            _ => None,
        }
    }
}

/// Reply to a classic storage command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCmdReply {
    status: StorageStatus,
}

impl SetCmdReply {
    pub fn new(status: StorageStatus) -> Self {
        Self { status }
    }

    pub fn status(&self) -> StorageStatus {
        self.status
    }

    pub fn is_stored(&self) -> bool {
        self.status == StorageStatus::Stored
    }
}

impl From<StorageStatus> for SetCmdReply {
    fn from(status: StorageStatus) -> Self {
        Self::new(status)
    }
}

impl Encode for SetCmdReply {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        let mut sink = Sink::new(dst);
        sink.put(self.status.as_bytes())?;
        sink.crlf()?;
        Ok(sink.written())
    }
}

impl Decode for SetCmdReply {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        let line_end = match find_line(buf) {
            Ok(Some(pos)) => pos,
            Ok(None) => return ParseResult::NeedMoreData,
            Err(e) => return ParseResult::Error(e),
        };
        let line = &buf[..line_end];
        match StorageStatus::from_line(line) {
            Some(status) => ParseResult::Complete(SetCmdReply::new(status), line_end + 2),
            None => ParseResult::Error(server_error(line).unwrap_or_else(|| unexpected_reply(line))),
        }
    }
}
