//! Meta set: `ms <key> <datalen> <flags>*\r\n<data>\r\n`

use crate::protocol::command::validate_meta_key;
use crate::protocol::cursor::Cursor;
use crate::protocol::flags::{
    Flag, FlagKind, FlagSet, SetMode, bare, encode_base64, opaque_value, parse_flags, u64_value,
    value, write_flags,
};
use crate::protocol::parser::{find_line, server_error, unexpected_reply};
use crate::protocol::sink::Sink;
use crate::protocol::{Decode, Encode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::Write;
use tracing::trace;

const REQUEST_ORDER: &[FlagKind] = &[
    FlagKind::Base64Key,
    FlagKind::Cas,
    FlagKind::CompareCas,
    FlagKind::SetClientFlags,
    FlagKind::Invalidate,
    FlagKind::Key,
    FlagKind::Mode,
    FlagKind::Vivify,
    FlagKind::Opaque,
    FlagKind::NoReply,
    FlagKind::UpdateTtl,
];

const REPLY_ORDER: &[FlagKind] = &[
    FlagKind::Base64Key,
    FlagKind::Cas,
    FlagKind::Key,
    FlagKind::Opaque,
];

/// Meta set request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSetCommand {
    key: Vec<u8>,
    data: Vec<u8>,
    flags: FlagSet,
}

impl MetaSetCommand {
    pub fn new(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
            flags: FlagSet::new(),
        }
    }

    /// `b`: transport the key base64 encoded
    #[must_use]
    pub fn with_base64_key(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Base64Key, on);
        self
    }

    /// `c`: return the CAS value of the stored item
    #[must_use]
    pub fn with_return_cas(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Cas(None), on);
        self
    }

    /// `C<cas>`: only store if the current CAS matches
    #[must_use]
    pub fn with_compare_cas(mut self, cas: u64) -> Self {
        self.flags.set(Flag::CompareCas(cas));
        self
    }

    /// `F<flags>`: client flags to store with the item
    #[must_use]
    pub fn with_client_flags(mut self, flags: u32) -> Self {
        self.flags.set(Flag::SetClientFlags(flags));
        self
    }

    /// `I`: invalidate; a CAS older than the item's marks it stale
    #[must_use]
    pub fn with_invalidate(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Invalidate, on);
        self
    }

    /// `k`: return the key
    #[must_use]
    pub fn with_key(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Key(None), on);
        self
    }

    /// `M<mode>`
    #[must_use]
    pub fn with_mode(mut self, mode: SetMode) -> Self {
        self.flags.set(Flag::Mode(mode));
        self
    }

    /// `N<ttl>`: in append mode, create the item on a miss with this TTL
    #[must_use]
    pub fn with_vivify(mut self, ttl: u64) -> Self {
        self.flags.set(Flag::Vivify(ttl));
        self
    }

    /// `O<token>`. An empty token clears it.
    #[must_use]
    pub fn with_opaque(mut self, token: impl Into<Vec<u8>>) -> Self {
        let token = token.into();
        let on = !token.is_empty();
        self.flags.toggle(Flag::Opaque(token), on);
        self
    }

    /// `q`: suppress the `HD` reply
    #[must_use]
    pub fn with_noreply(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::NoReply, on);
        self
    }

    /// `T<ttl>`
    #[must_use]
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.flags.set(Flag::UpdateTtl(ttl));
        self
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn mode(&self) -> SetMode {
        match self.flags.get(FlagKind::Mode) {
            Some(Flag::Mode(mode)) => *mode,
            _ => SetMode::Set,
        }
    }

    pub fn is_noreply(&self) -> bool {
        self.flags.contains(FlagKind::NoReply)
    }
}

impl Encode for MetaSetCommand {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        let base64 = self.flags.base64_key();
        validate_meta_key(&self.key, base64)?;
        self.flags.validate()?;

        let mut sink = Sink::new(dst);
        sink.put(b"ms ")?;
        if base64 {
            sink.put(&encode_base64(&self.key))?;
        } else {
            sink.put(&self.key)?;
        }
        sink.put_field(self.data.len())?;
        write_flags(&mut sink, &self.flags, REQUEST_ORDER)?;
        sink.crlf()?;
        sink.put(&self.data)?;
        sink.crlf()?;
        trace!(flags = self.flags.len(), bytes = sink.written(), "encoded ms");
        Ok(sink.written())
    }
}

impl Decode for MetaSetCommand {
    fn parse(_buf: &[u8]) -> ParseResult<Self> {
        ParseResult::Error(ProtocolError::NotImplemented("meta set command decoding"))
    }
}

/// Outcome of a meta set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaSetStatus {
    /// `HD`
    Stored,
    /// `NS`
    NotStored,
    /// `EX`: CAS mismatch
    Exists,
    /// `NF`
    NotFound,
}

impl MetaSetStatus {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            MetaSetStatus::Stored => b"HD",
            MetaSetStatus::NotStored => b"NS",
            MetaSetStatus::Exists => b"EX",
            MetaSetStatus::NotFound => b"NF",
        }
    }

    fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"HD" => Some(MetaSetStatus::Stored),
            b"NS" => Some(MetaSetStatus::NotStored),
            b"EX" => Some(MetaSetStatus::Exists),
            b"NF" => Some(MetaSetStatus::NotFound),
            _ => None,
        }
    }
}

/// Reply to `ms`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSetReply {
    status: MetaSetStatus,
    flags: FlagSet,
}

impl MetaSetReply {
    pub fn new(status: MetaSetStatus) -> Self {
        Self {
            status,
            flags: FlagSet::new(),
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.set(flag);
        self
    }

    pub fn status(&self) -> MetaSetStatus {
        self.status
    }

    pub fn is_stored(&self) -> bool {
        self.status == MetaSetStatus::Stored
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn cas(&self) -> Option<u64> {
        self.flags.cas()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.flags.key()
    }

    pub fn opaque(&self) -> Option<&[u8]> {
        self.flags.opaque()
    }

    pub fn is_base64(&self) -> bool {
        self.flags.base64_key()
    }
}

impl Encode for MetaSetReply {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        if let Some(key) = self.flags.key() {
            validate_meta_key(key, self.flags.base64_key())?;
        }
        self.flags.validate()?;

        let mut sink = Sink::new(dst);
        sink.put(self.status.as_bytes())?;
        write_flags(&mut sink, &self.flags, REPLY_ORDER)?;
        sink.crlf()?;
        Ok(sink.written())
    }
}

impl Decode for MetaSetReply {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_reply(buf).into()
    }
}

fn parse_reply(buf: &[u8]) -> std::result::Result<Option<(MetaSetReply, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let line = &buf[..line_end];
    if let Some(err) = server_error(line) {
        return Err(err);
    }

    let mut cur = Cursor::new(line);
    let status = MetaSetStatus::from_code(cur.read_token()).ok_or_else(|| unexpected_reply(line))?;
    let mut flags = parse_flags(&mut cur, reply_flag)?;
    flags.decode_base64_key()?;

    Ok(Some((MetaSetReply { status, flags }, line_end + 2)))
}

fn reply_flag(token: &[u8]) -> std::result::Result<Flag, ProtocolError> {
    match token[0] {
        b'b' => bare(token).map(|()| Flag::Base64Key),
        b'c' => u64_value(token, "cas").map(|v| Flag::Cas(Some(v))),
        b'k' => value(token).map(|v| Flag::Key(Some(v.to_vec()))),
        b'O' => opaque_value(token).map(Flag::Opaque),
        other => Err(ProtocolError::UnknownFlag(char::from(other))),
    }
}
