//! Meta delete: `md <key> <flags>*`

use crate::protocol::command::{MAX_KEY_LENGTH, validate_meta_key};
use crate::protocol::cursor::Cursor;
use crate::protocol::flags::{
    Flag, FlagKind, FlagSet, bare, decode_base64, encode_base64, i64_value, opaque_value,
    parse_flags, u64_value, value, write_flags,
};
use crate::protocol::parser::{
    expect_space, find_line, is_key_byte, server_error, unexpected_reply,
};
use crate::protocol::sink::Sink;
use crate::protocol::{Decode, Encode, ParseResult};
use crate::{ProtocolError, Result};
use std::io::Write;
use tracing::trace;

const REQUEST_ORDER: &[FlagKind] = &[
    FlagKind::Base64Key,
    FlagKind::CompareCas,
    FlagKind::Invalidate,
    FlagKind::Key,
    FlagKind::Opaque,
    FlagKind::NoReply,
    FlagKind::UpdateTtl,
];

const REPLY_ORDER: &[FlagKind] = &[FlagKind::Base64Key, FlagKind::Key, FlagKind::Opaque];

/// Meta delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDeleteCommand {
    key: Vec<u8>,
    flags: FlagSet,
}

impl MetaDeleteCommand {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            flags: FlagSet::new(),
        }
    }

    #[must_use]
    pub fn with_base64_key(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Base64Key, on);
        self
    }

    /// `C<cas>`: only delete if the current CAS matches
    #[must_use]
    pub fn with_compare_cas(mut self, cas: u64) -> Self {
        self.flags.set(Flag::CompareCas(cas));
        self
    }

    /// `I`: mark the item stale instead of removing it
    #[must_use]
    pub fn with_invalidate(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Invalidate, on);
        self
    }

    #[must_use]
    pub fn with_key(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::Key(None), on);
        self
    }

    #[must_use]
    pub fn with_opaque(mut self, token: impl Into<Vec<u8>>) -> Self {
        let token = token.into();
        let on = !token.is_empty();
        self.flags.toggle(Flag::Opaque(token), on);
        self
    }

    #[must_use]
    pub fn with_noreply(mut self, on: bool) -> Self {
        self.flags.toggle(Flag::NoReply, on);
        self
    }

    /// `T<ttl>`: with `I`, the TTL the stale item keeps
    #[must_use]
    pub fn with_update_ttl(mut self, ttl: i64) -> Self {
        self.flags.set(Flag::UpdateTtl(ttl));
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

impl Encode for MetaDeleteCommand {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        let base64 = self.flags.base64_key();
        validate_meta_key(&self.key, base64)?;
        self.flags.validate()?;

        let mut sink = Sink::new(dst);
        sink.put(b"md ")?;
        if base64 {
            sink.put(&encode_base64(&self.key))?;
        } else {
            sink.put(&self.key)?;
        }
        write_flags(&mut sink, &self.flags, REQUEST_ORDER)?;
        sink.crlf()?;
        trace!(flags = self.flags.len(), bytes = sink.written(), "encoded md");
        Ok(sink.written())
    }
}

impl Decode for MetaDeleteCommand {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_request(buf).into()
    }
}

fn parse_request(
    buf: &[u8],
) -> std::result::Result<Option<(MetaDeleteCommand, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let mut cur = Cursor::new(&buf[..line_end]);

    let verb = cur.read_token();
    if verb != b"md" {
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
    let key = if flags.base64_key() {
        decode_base64(key)?
    } else {
        key.to_vec()
    };

    Ok(Some((MetaDeleteCommand { key, flags }, line_end + 2)))
}

fn request_flag(token: &[u8]) -> std::result::Result<Flag, ProtocolError> {
    match token[0] {
        b'b' => bare(token).map(|()| Flag::Base64Key),
        b'C' => u64_value(token, "compare cas").map(Flag::CompareCas),
        b'I' => bare(token).map(|()| Flag::Invalidate),
        b'k' => bare(token).map(|()| Flag::Key(None)),
        b'O' => opaque_value(token).map(Flag::Opaque),
        b'q' => bare(token).map(|()| Flag::NoReply),
        b'T' => i64_value(token, "ttl").map(Flag::UpdateTtl),
        other => Err(ProtocolError::UnknownFlag(char::from(other))),
    }
}

/// Outcome of a meta delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaDeleteStatus {
    /// `HD`
    Deleted,
    /// `EX`: CAS mismatch
    Exists,
    /// `NF`
    NotFound,
}

impl MetaDeleteStatus {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            MetaDeleteStatus::Deleted => b"HD",
            MetaDeleteStatus::Exists => b"EX",
            MetaDeleteStatus::NotFound => b"NF",
        }
    }

    fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"HD" => Some(MetaDeleteStatus::Deleted),
            b"EX" => Some(MetaDeleteStatus::Exists),
            b"NF" => Some(MetaDeleteStatus::NotFound),
            _ => None,
        }
    }
}

/// Reply to `md`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDeleteReply {
    status: MetaDeleteStatus,
    flags: FlagSet,
}

impl MetaDeleteReply {
    pub fn new(status: MetaDeleteStatus) -> Self {
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

    pub fn status(&self) -> MetaDeleteStatus {
        self.status
    }

    pub fn deleted(&self) -> bool {
        self.status == MetaDeleteStatus::Deleted
    }

    pub fn exists(&self) -> bool {
        self.status == MetaDeleteStatus::Exists
    }

    pub fn not_found(&self) -> bool {
        self.status == MetaDeleteStatus::NotFound
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.flags.key()
    }

    pub fn opaque(&self) -> Option<&[u8]> {
        self.flags.opaque()
    }
}

impl Encode for MetaDeleteReply {
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

impl Decode for MetaDeleteReply {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        parse_reply(buf).into()
    }
}

fn parse_reply(
    buf: &[u8],
) -> std::result::Result<Option<(MetaDeleteReply, usize)>, ProtocolError> {
    let Some(line_end) = find_line(buf)? else {
        return Ok(None);
    };
    let line = &buf[..line_end];
    if let Some(err) = server_error(line) {
        return Err(err);
    }

    let mut cur = Cursor::new(line);
    let status =
        MetaDeleteStatus::from_code(cur.read_token()).ok_or_else(|| unexpected_reply(line))?;
    let mut flags = parse_flags(&mut cur, reply_flag)?;
    flags.decode_base64_key()?;

    Ok(Some((MetaDeleteReply { status, flags }, line_end + 2)))
}

fn reply_flag(token: &[u8]) -> std::result::Result<Flag, ProtocolError> {
    match token[0] {
        b'b' => bare(token).map(|()| Flag::Base64Key),
        b'k' => value(token).map(|v| Flag::Key(Some(v.to_vec()))),
        b'O' => opaque_value(token).map(Flag::Opaque),
        other => Err(ProtocolError::UnknownFlag(char::from(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McwireError;

    #[test]
    fn test_encode() {
        assert_eq!(MetaDeleteCommand::new("/foo").to_bytes().unwrap(), b"md /foo\r\n");

        let cmd = MetaDeleteCommand::new("/foo")
            .with_update_ttl(30)
            .with_noreply(true)
            .with_opaque("x")
            .with_key(true)
            .with_invalidate(true)
            .with_compare_cas(5)
            .with_base64_key(true);
        assert_eq!(
            cmd.to_bytes().unwrap(),
            b"md L2Zvbw== b C5 I k Ox q T30\r\n"
        );
    }

    #[test]
    fn test_encode_rejects_opaque_with_separators() {
        for opaque in ["a b", "x\r\nflush_all"] {
            let mut out = Vec::new();
            let err = MetaDeleteCommand::new("/foo")
                .with_opaque(opaque)
                .write_to(&mut out)
                .unwrap_err();
            assert!(matches!(
                err,
                McwireError::Protocol(ProtocolError::InvalidFlagValue('O'))
            ));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_request_round_trip() {
        let cmd = MetaDeleteCommand::new("a b")
            .with_base64_key(true)
            .with_invalidate(true)
            .with_update_ttl(-1);
        let wire = cmd.to_bytes().unwrap();
        assert_eq!(MetaDeleteCommand::decode(&wire).unwrap(), cmd);
    }

    #[test]
    fn test_decode_request_errors() {
        assert_eq!(
            MetaDeleteCommand::parse(b"md /foo v\r\n"),
            ParseResult::Error(ProtocolError::UnknownFlag('v'))
        );
        assert!(matches!(
            MetaDeleteCommand::parse(b"md /foo Cx\r\n"),
            ParseResult::Error(ProtocolError::InvalidNumber { field: "compare cas", .. })
        ));
    }

    #[test]
    fn test_decode_not_found() {
        let reply = MetaDeleteReply::decode(b"NF\r\n").unwrap();
        assert!(reply.not_found());
        assert!(!reply.deleted());
        assert!(!reply.exists());
    }

    #[test]
    fn test_decode_deleted_with_key() {
        let reply = MetaDeleteReply::decode(b"HD b kL2Zvbw==\r\n").unwrap();
        assert!(reply.deleted());
        assert_eq!(reply.key(), Some(&b"/foo"[..]));

        let reply = MetaDeleteReply::decode(b"EX k/foo\r\n").unwrap();
        assert!(reply.exists());
        assert_eq!(reply.key(), Some(&b"/foo"[..]));
    }

    #[test]
    fn test_decode_reply_errors() {
        assert!(matches!(
            MetaDeleteReply::decode(b"CLIENT_ERROR bad command line format\r\n"),
            Err(McwireError::Protocol(ProtocolError::ClientError(ref msg)))
                if msg == "bad command line format"
        ));
        assert!(matches!(
            MetaDeleteReply::parse(b"NS\r\n"),
            ParseResult::Error(ProtocolError::UnexpectedReply(_))
        ));
        assert_eq!(MetaDeleteReply::parse(b"HD"), ParseResult::NeedMoreData);
    }

    #[test]
    fn test_encode_reply() {
        let reply = MetaDeleteReply::new(MetaDeleteStatus::Deleted)
            .with_flag(Flag::Key(Some(b"/foo".to_vec())));
        assert_eq!(reply.to_bytes().unwrap(), b"HD k/foo\r\n");
        assert_eq!(
            MetaDeleteReply::new(MetaDeleteStatus::NotFound).to_bytes().unwrap(),
            b"NF\r\n"
        );
    }
}
