//! Memcached wire protocol: classic ASCII commands and the meta protocol
//!
//! Every message type implements [`Encode`]; the ones that can be read back
//! implement [`Decode`]. Encoders validate first and write second, so a
//! validation error never leaves a partial message on the sink.

pub mod command;
pub mod cursor;
pub mod delete;
pub mod flags;
pub mod get;
pub mod meta_delete;
pub mod meta_get;
pub mod meta_set;
pub(crate) mod parser;
pub mod response;
pub(crate) mod sink;
pub mod storage;

pub use command::{Command, MAX_KEY_LENGTH, is_valid_key};
pub use cursor::Cursor;
pub use delete::DeleteCommand;
pub use flags::{Flag, FlagKind, FlagSet, MAX_OPAQUE_LENGTH, SetMode};
pub use get::{GetCommand, GetReply, GetReplyItem};
pub use meta_delete::{MetaDeleteCommand, MetaDeleteReply, MetaDeleteStatus};
pub use meta_get::{MetaGetCommand, MetaGetReply};
pub use meta_set::{MetaSetCommand, MetaSetReply, MetaSetStatus};
pub use response::Reply;
pub use storage::{SetCmdReply, StorageCommand, StorageStatus, StorageVerb};

use crate::{ProtocolError, Result};
use std::io::{BufRead, Write};

/// Result of parsing a buffer
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult<T> {
    /// Message fully parsed, with the number of bytes it occupied
    Complete(T, usize),
    /// Need more data to complete parsing
    NeedMoreData,
    /// Parse error
    Error(ProtocolError),
}

impl<T> From<std::result::Result<Option<(T, usize)>, ProtocolError>> for ParseResult<T> {
    fn from(r: std::result::Result<Option<(T, usize)>, ProtocolError>) -> Self {
        match r {
            Ok(Some((msg, consumed))) => ParseResult::Complete(msg, consumed),
            Ok(None) => ParseResult::NeedMoreData,
            Err(e) => ParseResult::Error(e),
        }
    }
}

impl<T> ParseResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        match self {
            ParseResult::Complete(msg, consumed) => ParseResult::Complete(f(msg), consumed),
            ParseResult::NeedMoreData => ParseResult::NeedMoreData,
            ParseResult::Error(e) => ParseResult::Error(e),
        }
    }
}

/// Serialize to wire bytes
pub trait Encode {
    /// Write the message to `dst`, returning the number of bytes written
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// Parse from wire bytes
pub trait Decode: Sized {
    /// Parse one message from the front of `buf`
    fn parse(buf: &[u8]) -> ParseResult<Self>;

    /// Parse a buffer holding exactly one message
    fn decode(data: &[u8]) -> Result<Self> {
        match Self::parse(data) {
            ParseResult::Complete(msg, consumed) if consumed == data.len() => Ok(msg),
            ParseResult::Complete(_, consumed) => {
                Err(ProtocolError::TrailingData(data.len() - consumed).into())
            }
            ParseResult::NeedMoreData => Err(ProtocolError::Incomplete.into()),
            ParseResult::Error(e) => Err(e.into()),
        }
    }

    /// Read one message from a blocking source
    fn read_from<R: BufRead>(src: &mut R) -> Result<Self> {
        parser::read_message(src)
    }
}
