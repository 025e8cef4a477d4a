//! Meta get: `mg <key> <flags>*`
//!
//! Replies:
//! - `EN\r\n` on a miss
//! - `HD <flags>*\r\n` on a hit without value
//! - `VA <size> <flags>*\r\n<data>\r\n` on a hit with value

use crate::protocol::command::{MAX_KEY_LENGTH, validate_meta_key};
use crate::protocol::cursor::Cursor;
use crate::protocol::flags::{
    Flag, FlagKind, FlagSet, bare, decode_base64, encode_base64, hit_value, i64_value,
    opaque_value, parse_flags, u32_value, u64_value, value, write_flags,
};
use crate::protocol::parser::{
    expect_space, find_line, is_key_byte, parse_usize, payload, server_error, unexpected_reply,
};
use crate::protocol::sink::Sink;
use crate::protocol::{Decode, Encode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::Write;
use tracing::trace;

/// Request flags in the order they are written
const REQUEST_ORDER: &[FlagKind] = &[
    FlagKind::Base64Key,
    FlagKind::Cas,
    FlagKind::ClientFlags,
    FlagKind::PreviousHit,
    FlagKind::Key,
    FlagKind::LastAccess,
    FlagKind::Vivify,
    FlagKind::Opaque,
    FlagKind::NoReply,
    FlagKind::Recache,
    FlagKind::Size,
    FlagKind::RemainingTtl,
    FlagKind::UpdateTtl,
    FlagKind::SkipLruBump,
    FlagKind::Value,
];

/// Reply flags in the order they are written
const REPLY_ORDER: &[FlagKind] = &[
    FlagKind::Base64Key,
    FlagKind::Cas,
    FlagKind::ClientFlags,
    FlagKind::PreviousHit,
    FlagKind::Key,
    FlagKind::LastAccess,
    FlagKind::Opaque,
    FlagKind::Size,
    FlagKind::RemainingTtl,
    FlagKind::RecacheResult,
    FlagKind::Stale,
];

/// Meta get request. The key is held raw; with `b` set it is base64
/// encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaGetCommand {
    key: Vec<u8>,
    flags: FlagSet,
}

impl MetaGetCommand {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            flags: FlagSet::new(),
        }
    }

    /// `b`: transport the key base64 encoded
    #[must_use]
    pub fn with_base64_key(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Base64Key, on);
        self
    }

    /// `c`: return the CAS value
    #[must_use]
    pub fn with_cas(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Cas(None), on);
        self
    }

    /// `f`: return the client flags
    #[must_use]
    pub fn with_client_flags(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::ClientFlags(None), on);
        self
    }

    /// `h`: return whether the item was fetched before
    #[must_use]
    pub fn with_previous_hit(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::PreviousHit(None), on);
        self
    }

    /// `k`: return the key
    #[must_use]
    pub fn with_key(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Key(None), on);
        self
    }

    /// `l`: return seconds since last access
    #[must_use]
    pub fn with_last_access(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::LastAccess(None), on);
        self
    }

    /// `N<ttl>`: on a miss, create a placeholder item with this TTL
    #[must_use]
    pub fn with_vivify(mut self, ttl: u64) -> Self {
        self.flags.set(Flag::Vivify(ttl));
        self
    }

    /// `O<token>`: echoed back in the reply. An empty token clears it.
    #[must_use]
    pub fn with_opaque(mut self, token: impl Into<Vec<u8>>) -> Self {
        let token = token.into();
        let on = !token.is_empty();
        self.flags.toggle(Flag::Opaque(token), on);
        self
    }

    /// `q`: suppress the `EN` reply on a miss
    #[must_use]
    pub fn with_noreply(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::NoReply, on);
        self
    }

    /// `R<ttl>`: win the recache token if the remaining TTL is below `ttl`
    #[must_use]
    pub fn with_recache(mut self, ttl: u64) -> Self {
        self.flags.set(Flag::Recache(ttl));
        self
    }

    /// `s`: return the item size
    #[must_use]
    pub fn with_size(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Size(None), on);
        self
    }

    /// `t`: return the remaining TTL
    #[must_use]
    pub fn with_ttl(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::RemainingTtl(None), on);
        self
    }

    /// `T<ttl>`: update the item's TTL
    #[must_use]
    pub fn with_update_ttl(mut self, ttl: i64) -> Self {
        self.flags.set(Flag::UpdateTtl(ttl));
        self
    }

    /// `u`: don't bump the item in the LRU
    #[must_use]
    pub fn with_skip_lru_bump(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::SkipLruBump, on);
        self
    }

    /// `v`: return the value
    #[must_use]
    pub fn with_value(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Value, on);
        self
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn is_noreply(&self) -> bool {
        self.flags.contains(FlagKind::NoReply)
    }
}

impl Encode for MetaGetCommand {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        let base64 = self.flags.base64_key();
        validate_meta_key(&self.key, base64)?;
        self.flags.validate()?;

        let mut sink = Sink::new(dst);
        sink.put(b"mg ")?;
        if base64 {
            sink.put(&encode_base64(&self.key))?;
        } else {
            sink.put(&self.key)?;
        }
        write_flags(&mut sink, &self.flags, REQUEST_ORDER)?;
        sink.crlf()?;
        trace!(flags = self.flags.len(), bytes = sink.written(), "encoded mg");
        Ok(sink.written())
    }
}

impl Decode for MetaGetCommand {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_request(buf).into()
    }
}

fn parse_request(buf: &[u8]) -> std::result::Result<Option<(MetaGetCommand, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let mut cur = Cursor::new(&buf[..line_end]);

    let verb = cur.read_token();
    if verb != b"mg" {
        return Err(ProtocolError::InvalidCommand(
            String::from_utf8_lossy(verb).into_owned(),
        ));
    }
    expect_space(&mut cur, "command")?;

    let key = cur.read_while(is_key_byte);
    if key.is_empty() {
        return Err(ProtocolError::InvalidCommand("missing key".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }

    let flags = parse_flags(&mut cur, request_flag)?;

    // The key token is only interpreted once every flag is known
    let key = if flags.base64_key() {
        decode_base64(key)?
    } else {
        key.to_vec()
    };

    Ok(Some((MetaGetCommand { key, flags }, line_end + 2)))
}

fn request_flag(token: &[u8]) -> std::result::Result<Flag, ProtocolError> {
    match token[0] {
        b'b' => bare(token).map(|()| Flag::Base64Key),
        b'c' => bare(token).map(|()| Flag::Cas(None)),
        b'f' => bare(token).map(|()| Flag::ClientFlags(None)),
        b'h' => bare(token).map(|()| Flag::PreviousHit(None)),
        b'k' => bare(token).map(|()| Flag::Key(None)),
        b'l' => bare(token).map(|()| Flag::LastAccess(None)),
        b'N' => u64_value(token, "vivify ttl").map(Flag::Vivify),
        b'O' => opaque_value(token).map(Flag::Opaque),
        b'q' => bare(token).map(|()| Flag::NoReply),
        b'R' => u64_value(token, "recache ttl").map(Flag::Recache),
        b's' => bare(token).map(|()| Flag::Size(None)),
        b't' => bare(token).map(|()| Flag::RemainingTtl(None)),
        b'T' => i64_value(token, "ttl").map(Flag::UpdateTtl),
        b'u' => bare(token).map(|()| Flag::SkipLruBump),
        b'v' => bare(token).map(|()| Flag::Value),
        other => Err(ProtocolError::UnknownFlag(char::from(other))),
    }
}

/// Reply to `mg`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaGetReply {
    miss: bool,
    value: Option<Vec<u8>>,
    flags: FlagSet,
}

impl MetaGetReply {
    /// `EN`
    pub fn miss() -> Self {
        Self {
            miss: true,
            ..Self::default()
        }
    }

    /// `HD`
    pub fn hit() -> Self {
        Self::default()
    }

    /// `VA`
    pub fn with_value(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Attach a reply flag (ignored on a miss)
    #[must_use]
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.set(flag);
        self
    }

    pub fn is_miss(&self) -> bool {
        self.miss
    }

    pub fn is_hit(&self) -> bool {
        !self.miss
    }

    /// The item data, present only for a `VA` reply
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn cas(&self) -> Option<u64> {
        self.flags.cas()
    }

    pub fn client_flags(&self) -> Option<u32> {
        match self.flags.get(FlagKind::ClientFlags) {
            Some(Flag::ClientFlags(v)) => *v,
            _ => None,
        }
    }

    pub fn previous_hit(&self) -> Option<bool> {
        match self.flags.get(FlagKind::PreviousHit) {
            Some(Flag::PreviousHit(v)) => *v,
            _ => None,
        }
    }

    /// Returned key, already base64 decoded
    pub fn key(&self) -> Option<&[u8]> {
        self.flags.key()
    }

    pub fn last_access(&self) -> Option<u64> {
        match self.flags.get(FlagKind::LastAccess) {
            Some(Flag::LastAccess(v)) => *v,
            _ => None,
        }
    }

    pub fn opaque(&self) -> Option<&[u8]> {
        self.flags.opaque()
    }

    pub fn size(&self) -> Option<u64> {
        match self.flags.get(FlagKind::Size) {
            Some(Flag::Size(v)) => *v,
            _ => None,
        }
    }

    /// Remaining TTL in seconds, -1 for items that never expire
    pub fn ttl(&self) -> Option<i64> {
        match self.flags.get(FlagKind::RemainingTtl) {
            Some(Flag::RemainingTtl(v)) => *v,
            _ => None,
        }
    }

    /// `Some(true)` on `W`, `Some(false)` on `Z`
    pub fn recache_won(&self) -> Option<bool> {
        match self.flags.get(FlagKind::RecacheResult) {
            Some(Flag::RecacheResult(won)) => Some(*won),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.flags.contains(FlagKind::Stale)
    }

    pub fn is_base64(&self) -> bool {
        self.flags.base64_key()
    }
}

impl Encode for MetaGetReply {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        let mut sink = Sink::new(dst);
        if self.miss {
            sink.put(b"EN")?;
            sink.crlf()?;
            return Ok(sink.written());
        }

        if let Some(key) = self.flags.key() {
            validate_meta_key(key, self.flags.base64_key())?;
        }
        self.flags.validate()?;

        match &self.value {
            Some(value) => {
                sink.put(b"VA")?;
                sink.put_field(value.len())?;
                write_flags(&mut sink, &self.flags, REPLY_ORDER)?;
                sink.crlf()?;
                sink.put(value)?;
                sink.crlf()?;
            }
            None => {
                sink.put(b"HD")?;
                write_flags(&mut sink, &self.flags, REPLY_ORDER)?;
                sink.crlf()?;
            }
        }
        Ok(sink.written())
    }
}

impl Decode for MetaGetReply {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_reply(buf).into()
    }
}

fn parse_reply(buf: &[u8]) -> std::result::Result<Option<(MetaGetReply, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let line = &buf[..line_end];
    if line == b"EN" {
        return Ok(Some((MetaGetReply::miss(), line_end + 2)));
    }
    if let Some(err) = server_error(line) {
        return Err(err);
    }

    let mut cur = Cursor::new(line);
    let (value, flags, consumed) = match cur.read_token() {
        b"HD" => {
            let flags = parse_flags(&mut cur, reply_flag)?;
            (None, flags, line_end + 2)
        }
        b"VA" => {
            expect_space(&mut cur, "VA")?;
            let token = cur.read_token();
            let size = parse_usize(token)
                .ok_or_else(|| ProtocolError::invalid_number("value size", token))?;
            let flags = parse_flags(&mut cur, reply_flag)?;
            let Some((data, consumed)) = payload(buf, line_end + 2, size)? else {
                return Ok(None);
            };
            (Some(data.to_vec()), flags, consumed)
        }
        _ => return Err(unexpected_reply(line)),
    };

    let mut reply = MetaGetReply {
        miss: false,
        value,
        flags,
    };
    reply.flags.decode_base64_key()?;
    Ok(Some((reply, consumed)))
}

fn reply_flag(token: &[u8]) -> std::result::Result<Flag, ProtocolError> {
    match token[0] {
        b'b' => bare(token).map(|()| Flag::Base64Key),
        b'c' => u64_value(token, "cas").map(|v| Flag::Cas(Some(v))),
        b'f' => u32_value(token, "client flags").map(|v| Flag::ClientFlags(Some(v))),
        b'h' => hit_value(token).map(|v| Flag::PreviousHit(Some(v))),
        b'k' => value(token).map(|v| Flag::Key(Some(v.to_vec()))),
        b'l' => u64_value(token, "last access").map(|v| Flag::LastAccess(Some(v))),
        b'O' => opaque_value(token).map(Flag::Opaque),
        b's' => u64_value(token, "size").map(|v| Flag::Size(Some(v))),
        b't' => i64_value(token, "remaining ttl").map(|v| Flag::RemainingTtl(Some(v))),
        b'W' => bare(token).map(|()| Flag::RecacheResult(true)),
        b'Z' => bare(token).map(|()| Flag::RecacheResult(false)),
        b'X' => bare(token).map(|()| Flag::Stale),
        other => Err(ProtocolError::UnknownFlag(char::from(other))),
    }
}
