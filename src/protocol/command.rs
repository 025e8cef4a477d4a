//! Request types, dispatched on the verb

use crate::protocol::parser::{find_line, is_key_byte};
use crate::protocol::{
    Decode, DeleteCommand, Encode, GetCommand, MetaDeleteCommand, MetaGetCommand, MetaSetCommand,
    ParseResult, StorageCommand, StorageVerb,
};
use crate::{ProtocolError, Result};
use std::io::Write;

/// Maximum key length accepted by memcached
pub const MAX_KEY_LENGTH: usize = 250;

/// Any request the codec can serialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// get|gets <key>*
    Get(GetCommand),
    /// delete <key> [noreply]
    Delete(DeleteCommand),
    /// set|add|replace|append|prepend|cas <key> <flags> <exptime> <bytes> [cas] [noreply]
    Storage(StorageCommand),
    /// mg <key> <flags>*
    MetaGet(MetaGetCommand),
    /// ms <key> <bytes> <flags>*
    MetaSet(MetaSetCommand),
    /// md <key> <flags>*
    MetaDelete(MetaDeleteCommand),
}

impl Command {
    /// Key used for server selection (the first key of a multi-get)
    pub fn key(&self) -> &[u8] {
        match self {
            Command::Get(cmd) => cmd.keys().first().map_or(&[][..], Vec::as_slice),
            Command::Delete(cmd) => cmd.key(),
            Command::Storage(cmd) => cmd.key(),
            Command::MetaGet(cmd) => cmd.key(),
            Command::MetaSet(cmd) => cmd.key(),
            Command::MetaDelete(cmd) => cmd.key(),
        }
    }

    /// Returns true if the server will not answer this command
    pub fn is_noreply(&self) -> bool {
        match self {
            Command::Get(_) => false,
            Command::Delete(cmd) => cmd.is_noreply(),
            Command::Storage(cmd) => cmd.is_noreply(),
            Command::MetaGet(cmd) => cmd.is_noreply(),
            Command::MetaSet(cmd) => cmd.is_noreply(),
            Command::MetaDelete(cmd) => cmd.is_noreply(),
        }
    }
}

impl Encode for Command {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        match self {
            Command::Get(cmd) => cmd.write_to(dst),
            Command::Delete(cmd) => cmd.write_to(dst),
            Command::Storage(cmd) => cmd.write_to(dst),
            Command::MetaGet(cmd) => cmd.write_to(dst),
            Command::MetaSet(cmd) => cmd.write_to(dst),
            Command::MetaDelete(cmd) => cmd.write_to(dst),
        }
    }
}

impl Decode for Command {
    fn parse(buf: &[u8]) -> ParseResult<Self> {
        let line_end = match find_line(buf) {
            Ok(Some(pos)) => pos,
            Ok(None) => return ParseResult::NeedMoreData,
            Err(e) => return ParseResult::Error(e),
        };
        let line = &buf[..line_end];
        let verb = line.split(|&b| b == b' ').next().unwrap_or_default();

        match verb {
            b"get" | b"gets" => GetCommand::parse(buf).map(Command::Get),
            b"delete" => DeleteCommand::parse(buf).map(Command::Delete),
            b"mg" => MetaGetCommand::parse(buf).map(Command::MetaGet),
            b"ms" => MetaSetCommand::parse(buf).map(Command::MetaSet),
            b"md" => MetaDeleteCommand::parse(buf).map(Command::MetaDelete),
            _ if StorageVerb::from_token(verb).is_some() => {
                StorageCommand::parse(buf).map(Command::Storage)
            }
            _ => ParseResult::Error(ProtocolError::InvalidCommand(
                String::from_utf8_lossy(verb).into_owned(),
            )),
        }
    }
}

impl From<GetCommand> for Command {
    fn from(cmd: GetCommand) -> Self {
        Command::Get(cmd)
    }
}

impl From<DeleteCommand> for Command {
    fn from(cmd: DeleteCommand) -> Self {
        Command::Delete(cmd)
    }
}

impl From<StorageCommand> for Command {
    fn from(cmd: StorageCommand) -> Self {
        Command::Storage(cmd)
    }
}

impl From<MetaGetCommand> for Command {
    fn from(cmd: MetaGetCommand) -> Self {
        Command::MetaGet(cmd)
    }
}

impl From<MetaSetCommand> for Command {
    fn from(cmd: MetaSetCommand) -> Self {
        Command::MetaSet(cmd)
    }
}

impl From<MetaDeleteCommand> for Command {
    fn from(cmd: MetaDeleteCommand) -> Self {
        Command::MetaDelete(cmd)
    }
}

/// Check if a key is valid
pub fn is_valid_key(key: &[u8]) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    // Keys cannot contain control characters or whitespace
    key.iter().all(|&b| is_key_byte(b))
}

/// Validate a key that goes on the wire as-is
pub(crate) fn validate_key(key: &[u8]) -> std::result::Result<(), ProtocolError> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }
    if !is_valid_key(key) {
        return Err(ProtocolError::InvalidKey(
            String::from_utf8_lossy(key).into_owned(),
        ));
    }
    Ok(())
}

/// Validate a meta command key. A base64-transported key may hold any bytes;
/// the length limit applies to its encoded form.
pub(crate) fn validate_meta_key(key: &[u8], base64: bool) -> std::result::Result<(), ProtocolError> {
    if !base64 {
        return validate_key(key);
    }
    if key.is_empty() {
        return Err(ProtocolError::InvalidKey(String::new()));
    }
    match base64::encoded_len(key.len(), true) {
        Some(len) if len <= MAX_KEY_LENGTH => Ok(()),
        _ => Err(ProtocolError::KeyTooLong),
    }
}
