//! Classic retrieval: `get`/`gets` and the `VALUE ... END` reply

use crate::protocol::command::{MAX_KEY_LENGTH, validate_key};
use crate::protocol::cursor::Cursor;
use crate::protocol::parser::{expect_space, find_line, is_key_byte};
use crate::protocol::sink::Sink;
use crate::protocol::{Decode, Encode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::Write;
use tracing::trace;

/// `get <key>*` or, with CAS retrieval, `gets <key>*`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetCommand {
    keys: Vec<Vec<u8>>,
    cas: bool,
}

impl GetCommand {
    pub fn new<K: Into<Vec<u8>>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            cas: false,
        }
    }

    /// A `gets` command
    pub fn gets<K: Into<Vec<u8>>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self::new(keys).with_retrieve_cas(true)
    }

    /// Append keys; duplicates are kept
    pub fn add_keys<K: Into<Vec<u8>>>(&mut self, keys: impl IntoIterator<Item = K>) {
        self.keys.extend(keys.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn with_retrieve_cas(mut self, cas: bool) -> Self {
        self.cas = cas;
        self
    }

    pub fn set_retrieve_cas(&mut self, cas: bool) {
        self.cas = cas;
    }

    pub fn retrieve_cas(&self) -> bool {
        self.cas
    }

    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    fn verb(&self) -> &'static [u8] {
        if self.cas { &b"gets"[..] } else { &b"get"[..] }
    }
}

impl Encode for GetCommand {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        if self.keys.is_empty() {
            return Err(ProtocolError::NoKeys.into());
        }
        for key in &self.keys {
            validate_key(key)?;
        }

        let mut sink = Sink::new(dst);
        sink.put(self.verb())?;
        for key in &self.keys {
            sink.put(b" ")?;
            sink.put(key)?;
        }
        sink.crlf()?;
        trace!(keys = self.keys.len(), cas = self.cas, "encoded get");
        Ok(sink.written())
    }
}

impl Decode for GetCommand {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_get(buf).into()
    }
}

fn parse_get(buf: &[u8]) -> std::result::Result<Option<(GetCommand, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let mut cur = Cursor::new(&buf[..line_end]);

    let cas = match cur.read_token() {
        b"get" => false,
        b"gets" => true,
        other => {
            return Err(ProtocolError::InvalidCommand(
                String::from_utf8_lossy(other).into_owned(),
            ));
        }
    };
    expect_space(&mut cur, "command")?;

    // Any byte that cannot be part of a key ends the current one
    let mut keys = Vec::new();
    while !cur.is_empty() {
        let key = cur.read_while(is_key_byte);
        if key.is_empty() {
            cur.advance();
            continue;
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(ProtocolError::KeyTooLong);
        }
        keys.push(key.to_vec());
    }

    if keys.is_empty() {
        return Err(ProtocolError::NoKeys);
    }
    Ok(Some((GetCommand { keys, cas }, line_end + 2)))
}

/// One `VALUE` block of a retrieval reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReplyItem {
    pub key: Vec<u8>,
    pub flags: u16,
    /// Present when answering `gets`
    pub cas: Option<u64>,
    pub value: Vec<u8>,
}

impl GetReplyItem {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            flags: 0,
            cas: None,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }
}

/// Reply to `get`/`gets`: zero or more hits followed by `END`.
///
/// Encode only. Decoding a reply stream is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetReply {
    items: Vec<GetReplyItem>,
}

impl GetReply {
    pub fn new(items: Vec<GetReplyItem>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: GetReplyItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[GetReplyItem] {
        &self.items
    }
}

impl Encode for GetReply {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        for item in &self.items {
            validate_key(&item.key)?;
        }

        let mut sink = Sink::new(dst);
        for item in &self.items {
            sink.put(b"VALUE ")?;
            sink.put(&item.key)?;
            sink.put_field(item.flags)?;
            sink.put_field(item.value.len())?;
            if let Some(cas) = item.cas {
                sink.put_field(cas)?;
            }
            sink.crlf()?;
            sink.put(&item.value)?;
            sink.crlf()?;
        }
        sink.put(b"END")?;
        sink.crlf()?;
        Ok(sink.written())
    }
}

impl Decode for GetReply {
    fn parse(_buf: &[u8]) -> ParseResult<Self> {
        ParseResult::Error(ProtocolError::NotImplemented("get reply decoding"))
    }
}
