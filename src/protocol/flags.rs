//! Meta protocol flags
//!
//! A flag is a single ASCII letter, optionally followed (no space) by a value.
//! Every meta command and reply carries a [`FlagSet`]; which letters are legal,
//! and the order they are written in, is decided by the command or reply type.
//!
//! Encoding goes through [`write_flags`], which renders each flag into a
//! scratch buffer and only emits the separating space when the flag produced
//! bytes. Decoding goes through [`parse_flags`], which splits the flag segment
//! on spaces and hands each token to a per-type `decode` function that matches
//! on the leading letter.

use crate::ProtocolError;
use crate::protocol::cursor::Cursor;
use crate::protocol::parser::{is_key_byte, parse_i64, parse_u32, parse_u64};
use crate::protocol::sink::Sink;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::{self, Write};

/// Maximum opaque token length
pub const MAX_OPAQUE_LENGTH: usize = 32;

/// Storage semantics of a meta set (`M` flag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    #[default]
    Set,
    Add,
    Append,
    Prepend,
    Replace,
}

impl SetMode {
    pub fn as_byte(self) -> u8 {
        match self {
            SetMode::Set => b'S',
            SetMode::Add => b'E',
            SetMode::Append => b'A',
            SetMode::Prepend => b'P',
            SetMode::Replace => b'R',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        // memcached accepts the mode token in either case
        match b.to_ascii_uppercase() {
            b'S' => Some(SetMode::Set),
            b'E' => Some(SetMode::Add),
            b'A' => Some(SetMode::Append),
            b'P' => Some(SetMode::Prepend),
            b'R' => Some(SetMode::Replace),
            _ => None,
        }
    }
}

/// One meta protocol flag.
///
/// Flags that are presence-only on a request but carry a value on the reply
/// (`c`, `f`, `h`, `k`, `l`, `s`, `t`) hold an `Option`: `None` renders the
/// bare letter, `Some` renders the letter followed by the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flag {
    /// `b`: key is transported base64 encoded
    Base64Key,
    /// `c`: return CAS / returned CAS value
    Cas(Option<u64>),
    /// `C`: compare CAS before acting
    CompareCas(u64),
    /// `f`: return client flags / returned client flags
    ClientFlags(Option<u32>),
    /// `F`: client flags to store
    SetClientFlags(u32),
    /// `h`: return whether the item was hit before
    PreviousHit(Option<bool>),
    /// `I`: invalidate (mark stale) instead of removing
    Invalidate,
    /// `k`: return key / returned key (always held in raw form)
    Key(Option<Vec<u8>>),
    /// `l`: return seconds since last access
    LastAccess(Option<u64>),
    /// `M`: set mode
    Mode(SetMode),
    /// `N`: vivify on miss with the given TTL
    Vivify(u64),
    /// `O`: opaque token, echoed by the server
    Opaque(Vec<u8>),
    /// `q`: no reply semantics
    NoReply,
    /// `R`: win recache if remaining TTL is below the given value
    Recache(u64),
    /// `s`: return item size
    Size(Option<u64>),
    /// `t`: return remaining TTL (-1 means no expiry)
    RemainingTtl(Option<i64>),
    /// `T`: update TTL
    UpdateTtl(i64),
    /// `u`: don't bump the item in the LRU
    SkipLruBump,
    /// `v`: return the value
    Value,
    /// `W` (won) or `Z` (already sent to another client)
    RecacheResult(bool),
    /// `X`: item is stale
    Stale,
}

/// Identifies a [`Flag`] variant regardless of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Base64Key,
    Cas,
    CompareCas,
    ClientFlags,
    SetClientFlags,
    PreviousHit,
    Invalidate,
    Key,
    LastAccess,
    Mode,
    Vivify,
    Opaque,
    NoReply,
    Recache,
    Size,
    RemainingTtl,
    UpdateTtl,
    SkipLruBump,
    Value,
    RecacheResult,
    Stale,
}

impl Flag {
    pub fn kind(&self) -> FlagKind {
        match self {
            Flag::Base64Key => FlagKind::Base64Key,
            Flag::Cas(_) => FlagKind::Cas,
            Flag::CompareCas(_) => FlagKind::CompareCas,
            Flag::ClientFlags(_) => FlagKind::ClientFlags,
            Flag::SetClientFlags(_) => FlagKind::SetClientFlags,
            Flag::PreviousHit(_) => FlagKind::PreviousHit,
            Flag::Invalidate => FlagKind::Invalidate,
            Flag::Key(_) => FlagKind::Key,
            Flag::LastAccess(_) => FlagKind::LastAccess,
            Flag::Mode(_) => FlagKind::Mode,
            Flag::Vivify(_) => FlagKind::Vivify,
            Flag::Opaque(_) => FlagKind::Opaque,
            Flag::NoReply => FlagKind::NoReply,
            Flag::Recache(_) => FlagKind::Recache,
            Flag::Size(_) => FlagKind::Size,
            Flag::RemainingTtl(_) => FlagKind::RemainingTtl,
            Flag::UpdateTtl(_) => FlagKind::UpdateTtl,
            Flag::SkipLruBump => FlagKind::SkipLruBump,
            Flag::Value => FlagKind::Value,
            Flag::RecacheResult(_) => FlagKind::RecacheResult,
            Flag::Stale => FlagKind::Stale,
        }
    }

    /// Render the flag in its textual form. Renders nothing for a logically
    /// absent flag (an empty opaque).
    pub fn render(&self, out: &mut Vec<u8>, base64_key: bool) {
        match self {
            Flag::Base64Key => out.push(b'b'),
            Flag::Cas(v) => push_opt(out, b'c', *v),
            Flag::CompareCas(v) => push_num(out, b'C', *v),
            Flag::ClientFlags(v) => push_opt(out, b'f', *v),
            Flag::SetClientFlags(v) => push_num(out, b'F', *v),
            Flag::PreviousHit(v) => push_opt(out, b'h', v.map(u8::from)),
            Flag::Invalidate => out.push(b'I'),
            Flag::Key(None) => out.push(b'k'),
            Flag::Key(Some(key)) => {
                out.push(b'k');
                if base64_key {
                    out.extend_from_slice(STANDARD.encode(key).as_bytes());
                } else {
                    out.extend_from_slice(key);
                }
            }
            Flag::LastAccess(v) => push_opt(out, b'l', *v),
            Flag::Mode(mode) => {
                out.push(b'M');
                out.push(mode.as_byte());
            }
            Flag::Vivify(v) => push_num(out, b'N', *v),
            Flag::Opaque(o) => {
                if !o.is_empty() {
                    out.push(b'O');
                    out.extend_from_slice(o);
                }
            }
            Flag::NoReply => out.push(b'q'),
            Flag::Recache(v) => push_num(out, b'R', *v),
            Flag::Size(v) => push_opt(out, b's', *v),
            Flag::RemainingTtl(v) => push_opt(out, b't', *v),
            Flag::UpdateTtl(v) => push_num(out, b'T', *v),
            Flag::SkipLruBump => out.push(b'u'),
            Flag::Value => out.push(b'v'),
            Flag::RecacheResult(true) => out.push(b'W'),
            Flag::RecacheResult(false) => out.push(b'Z'),
            Flag::Stale => out.push(b'X'),
        }
    }
}

fn push_num<I: itoa::Integer>(out: &mut Vec<u8>, letter: u8, v: I) {
    let mut buf = itoa::Buffer::new();
    out.push(letter);
    out.extend_from_slice(buf.format(v).as_bytes());
}

fn push_opt<I: itoa::Integer>(out: &mut Vec<u8>, letter: u8, v: Option<I>) {
    match v {
        Some(v) => push_num(out, letter, v),
        None => out.push(letter),
    }
}

/// At most one flag per [`FlagKind`]. Equality ignores insertion order.
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    flags: Vec<Flag>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a flag, replacing any flag of the same kind
    pub fn set(&mut self, flag: Flag) {
        let kind = flag.kind();
        match self.flags.iter_mut().find(|f| f.kind() == kind) {
            Some(slot) => *slot = flag,
            None => self.flags.push(flag),
        }
    }

    /// Insert `flag` when `on`, otherwise remove its kind
    pub fn toggle(&mut self, flag: Flag, on: bool) {
        if on {
            self.set(flag);
        } else {
            self.remove(flag.kind());
        }
    }

    pub fn remove(&mut self, kind: FlagKind) -> Option<Flag> {
        let pos = self.flags.iter().position(|f| f.kind() == kind)?;
        Some(self.flags.remove(pos))
    }

    pub fn get(&self, kind: FlagKind) -> Option<&Flag> {
        self.flags.iter().find(|f| f.kind() == kind)
    }

    pub fn contains(&self, kind: FlagKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clear(&mut self) {
        self.flags.clear();
    }

    /// Checks value limits that must hold before anything is written
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if let Some(Flag::Opaque(o)) = self.get(FlagKind::Opaque) {
            check_opaque(o)?;
        }
        Ok(())
    }

    /// Reverse the base64 encoding of a returned key once all flags are known
    pub(crate) fn decode_base64_key(&mut self) -> Result<(), ProtocolError> {
        if !self.contains(FlagKind::Base64Key) {
            return Ok(());
        }
        if let Some(Flag::Key(Some(key))) = self.get(FlagKind::Key) {
            let raw = decode_base64(key)?;
            self.set(Flag::Key(Some(raw)));
        }
        Ok(())
    }

    // Typed accessors shared by the reply types

    pub(crate) fn base64_key(&self) -> bool {
        self.contains(FlagKind::Base64Key)
    }

    pub(crate) fn cas(&self) -> Option<u64> {
        match self.get(FlagKind::Cas) {
            Some(Flag::Cas(v)) => *v,
            _ => None,
        }
    }

    pub(crate) fn key(&self) -> Option<&[u8]> {
        match self.get(FlagKind::Key) {
            Some(Flag::Key(Some(k))) => Some(k),
            _ => None,
        }
    }

    pub(crate) fn opaque(&self) -> Option<&[u8]> {
        match self.get(FlagKind::Opaque) {
            Some(Flag::Opaque(o)) if !o.is_empty() => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for FlagSet {
    fn eq(&self, other: &Self) -> bool {
        self.flags.len() == other.flags.len()
            && self
                .flags
                .iter()
                .all(|f| other.get(f.kind()).is_some_and(|o| o == f))
    }
}

impl Eq for FlagSet {}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        let mut set = FlagSet::new();
        for flag in iter {
            set.set(flag);
        }
        set
    }
}

/// Write the flags of `order` that are present in `flags`, each preceded by
/// exactly one space. Flags that render to nothing emit no separator.
pub(crate) fn write_flags<W: Write>(
    sink: &mut Sink<'_, W>,
    flags: &FlagSet,
    order: &[FlagKind],
) -> io::Result<()> {
    let base64_key = flags.base64_key();
    let mut scratch = Vec::with_capacity(64);
    for kind in order {
        let Some(flag) = flags.get(*kind) else {
            continue;
        };
        scratch.clear();
        flag.render(&mut scratch, base64_key);
        if !scratch.is_empty() {
            sink.put(b" ")?;
            sink.put(&scratch)?;
        }
    }
    Ok(())
}

/// Decode a flag segment. Every token is preceded by exactly one space;
/// tokens may arrive in any order.
pub(crate) fn parse_flags(
    cur: &mut Cursor<'_>,
    decode: impl Fn(&[u8]) -> Result<Flag, ProtocolError>,
) -> Result<FlagSet, ProtocolError> {
    let mut flags = FlagSet::new();
    while !cur.is_empty() {
        if !cur.eat(b' ') {
            return Err(ProtocolError::MissingSeparator("flag"));
        }
        let token = cur.read_token();
        if token.is_empty() {
            return Err(ProtocolError::EmptyFlag);
        }
        flags.set(decode(token)?);
    }
    Ok(flags)
}

// Token helpers for the per-type decoders. `token` is never empty.

fn letter(token: &[u8]) -> char {
    char::from(token[0])
}

/// A presence-only flag: the letter must stand alone
pub(crate) fn bare(token: &[u8]) -> Result<(), ProtocolError> {
    if token.len() > 1 {
        return Err(ProtocolError::UnexpectedFlagValue(letter(token)));
    }
    Ok(())
}

/// The value adjacent to the letter; must be non-empty
pub(crate) fn value(token: &[u8]) -> Result<&[u8], ProtocolError> {
    match &token[1..] {
        [] => Err(ProtocolError::MissingFlagValue(letter(token))),
        v => Ok(v),
    }
}

pub(crate) fn u64_value(token: &[u8], field: &'static str) -> Result<u64, ProtocolError> {
    let v = value(token)?;
    parse_u64(v).ok_or_else(|| ProtocolError::invalid_number(field, v))
}

pub(crate) fn u32_value(token: &[u8], field: &'static str) -> Result<u32, ProtocolError> {
    let v = value(token)?;
    parse_u32(v).ok_or_else(|| ProtocolError::invalid_number(field, v))
}

pub(crate) fn i64_value(token: &[u8], field: &'static str) -> Result<i64, ProtocolError> {
    let v = value(token)?;
    parse_i64(v).ok_or_else(|| ProtocolError::invalid_number(field, v))
}

pub(crate) fn opaque_value(token: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let v = value(token)?;
    check_opaque(v)?;
    Ok(v.to_vec())
}

/// The opaque is written raw, so it must fit in a single flag token
fn check_opaque(o: &[u8]) -> Result<(), ProtocolError> {
    if o.len() > MAX_OPAQUE_LENGTH {
        return Err(ProtocolError::OpaqueTooLong(o.len()));
    }
    if !o.iter().all(|&b| is_key_byte(b)) {
        return Err(ProtocolError::InvalidFlagValue('O'));
    }
    Ok(())
}

pub(crate) fn hit_value(token: &[u8]) -> Result<bool, ProtocolError> {
    match value(token)? {
        b"0" => Ok(false),
        b"1" => Ok(true),
        v => Err(ProtocolError::invalid_number("previous hit", v)),
    }
}

pub(crate) fn encode_base64(raw: &[u8]) -> Vec<u8> {
    STANDARD.encode(raw).into_bytes()
}

pub(crate) fn decode_base64(wire: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(wire)
        .map_err(|e| ProtocolError::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(flag: &Flag, base64_key: bool) -> Vec<u8> {
        let mut out = Vec::new();
        flag.render(&mut out, base64_key);
        out
    }

    fn written(flags: &FlagSet, order: &[FlagKind]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        write_flags(&mut sink, flags, order).unwrap();
        out
    }

    #[test]
    fn test_render_presence_and_value() {
        assert_eq!(rendered(&Flag::Cas(None), false), b"c");
        assert_eq!(rendered(&Flag::Cas(Some(42)), false), b"c42");
        assert_eq!(rendered(&Flag::PreviousHit(Some(true)), false), b"h1");
        assert_eq!(rendered(&Flag::PreviousHit(Some(false)), false), b"h0");
        assert_eq!(rendered(&Flag::RemainingTtl(Some(-1)), false), b"t-1");
        assert_eq!(rendered(&Flag::UpdateTtl(-5), false), b"T-5");
        assert_eq!(rendered(&Flag::Mode(SetMode::Add), false), b"ME");
        assert_eq!(rendered(&Flag::RecacheResult(true), false), b"W");
        assert_eq!(rendered(&Flag::RecacheResult(false), false), b"Z");
        assert_eq!(rendered(&Flag::Opaque(Vec::new()), false), b"");
    }

    #[test]
    fn test_render_key_base64() {
        let key = Flag::Key(Some(b"a b".to_vec()));
        assert_eq!(rendered(&key, false), b"ka b");
        assert_eq!(rendered(&key, true), b"kYSBi");
        assert_eq!(rendered(&Flag::Key(None), true), b"k");
    }

    #[test]
    fn test_write_flags_order_and_separators() {
        let order = [FlagKind::Base64Key, FlagKind::Cas, FlagKind::Opaque, FlagKind::Value];
        let flags: FlagSet = [Flag::Value, Flag::Cas(None), Flag::Base64Key]
            .into_iter()
            .collect();
        assert_eq!(written(&flags, &order), b" b c v");

        // absent and empty flags produce nothing at all
        let flags: FlagSet = [Flag::Opaque(Vec::new())].into_iter().collect();
        assert_eq!(written(&flags, &order), b"");
        assert_eq!(written(&FlagSet::new(), &order), b"");
    }

    #[test]
    fn test_write_flags_skips_kinds_outside_order() {
        let flags: FlagSet = [Flag::Stale, Flag::Value].into_iter().collect();
        assert_eq!(written(&flags, &[FlagKind::Value]), b" v");
    }

    #[test]
    fn test_flag_set_replace_and_eq() {
        let mut a = FlagSet::new();
        a.set(Flag::Cas(None));
        a.set(Flag::Value);
        a.set(Flag::Cas(Some(7)));
        assert_eq!(a.len(), 2);
        assert_eq!(a.cas(), Some(7));

        let b: FlagSet = [Flag::Value, Flag::Cas(Some(7))].into_iter().collect();
        assert_eq!(a, b);

        a.toggle(Flag::Value, false);
        assert_ne!(a, b);
        assert!(!a.contains(FlagKind::Value));
    }

    #[test]
    fn test_validate_opaque() {
        let ok: FlagSet = [Flag::Opaque(vec![b'x'; 32])].into_iter().collect();
        assert!(ok.validate().is_ok());
        let too_long: FlagSet = [Flag::Opaque(vec![b'x'; 33])].into_iter().collect();
        assert_eq!(too_long.validate(), Err(ProtocolError::OpaqueTooLong(33)));
        for bad in [&b"a b"[..], b"x\r\nmn", b"\t"] {
            let flags: FlagSet = [Flag::Opaque(bad.to_vec())].into_iter().collect();
            assert_eq!(flags.validate(), Err(ProtocolError::InvalidFlagValue('O')));
        }
        assert_eq!(opaque_value(b"Ox\ry"), Err(ProtocolError::InvalidFlagValue('O')));
    }

    #[test]
    fn test_token_helpers() {
        assert!(bare(b"v").is_ok());
        assert_eq!(bare(b"vx"), Err(ProtocolError::UnexpectedFlagValue('v')));
        assert_eq!(value(b"O"), Err(ProtocolError::MissingFlagValue('O')));
        assert_eq!(u64_value(b"N30", "vivify ttl"), Ok(30));
        assert!(matches!(
            u64_value(b"Nabc", "vivify ttl"),
            Err(ProtocolError::InvalidNumber { field: "vivify ttl", .. })
        ));
        assert_eq!(i64_value(b"t-1", "remaining ttl"), Ok(-1));
        assert_eq!(hit_value(b"h1"), Ok(true));
        assert!(hit_value(b"h2").is_err());
        assert_eq!(SetMode::from_byte(b'a'), Some(SetMode::Append));
        assert_eq!(SetMode::from_byte(b'Q'), None);
        assert_eq!(opaque_value(&[b'O'; 34]), Err(ProtocolError::OpaqueTooLong(33)));
    }

    #[test]
    fn test_parse_flags_any_order() {
        let decode = |token: &[u8]| -> Result<Flag, ProtocolError> {
            match token[0] {
                b'c' => Ok(Flag::Cas(Some(u64_value(token, "cas")?))),
                b'v' => bare(token).map(|()| Flag::Value),
                other => Err(ProtocolError::UnknownFlag(char::from(other))),
            }
        };
        let mut cur = Cursor::new(b" v c99");
        let flags = parse_flags(&mut cur, decode).unwrap();
        assert_eq!(flags.cas(), Some(99));
        assert!(flags.contains(FlagKind::Value));

        let mut cur = Cursor::new(b" v j");
        assert_eq!(parse_flags(&mut cur, decode), Err(ProtocolError::UnknownFlag('j')));
    }

    #[test]
    fn test_parse_flags_single_space() {
        let decode = |token: &[u8]| bare(token).map(|()| Flag::Value);
        for segment in [&b" v  v"[..], b"  v", b" v "] {
            let mut cur = Cursor::new(segment);
            assert_eq!(parse_flags(&mut cur, decode), Err(ProtocolError::EmptyFlag));
        }
        let mut cur = Cursor::new(b"\tv");
        assert_eq!(
            parse_flags(&mut cur, decode),
            Err(ProtocolError::MissingSeparator("flag"))
        );
    }

    #[test]
    fn test_decode_base64_key() {
        let mut flags: FlagSet = [Flag::Base64Key, Flag::Key(Some(b"L2Zvbw==".to_vec()))]
            .into_iter()
            .collect();
        flags.decode_base64_key().unwrap();
        assert_eq!(flags.key(), Some(&b"/foo"[..]));

        let mut bad: FlagSet = [Flag::Base64Key, Flag::Key(Some(b"!!".to_vec()))]
            .into_iter()
            .collect();
        assert!(matches!(
            bad.decode_base64_key(),
            Err(ProtocolError::InvalidBase64(_))
        ));
    }
}
