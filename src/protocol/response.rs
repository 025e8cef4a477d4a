//! Server replies

use crate::protocol::{
    Command, Decode, Encode, GetReply, MetaDeleteReply, MetaGetReply, MetaSetReply, ParseResult,
    SetCmdReply,
};
use crate::{ProtocolError, Result};
use std::io::Write;

/// Any reply the codec can serialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Get(GetReply),
    Storage(SetCmdReply),
    MetaGet(MetaGetReply),
    MetaSet(MetaSetReply),
    MetaDelete(MetaDeleteReply),
}

impl Reply {
    /// Parse the reply to `cmd`.
    ///
    /// Status lines such as `HD` or `NF` mean different things for
    /// different commands, so the command picks the grammar.
    pub fn parse_for(cmd: &Command, buf: &[u8]) -> ParseResult<Reply> {
        match cmd {
            Command::Get(_) => GetReply::parse(buf).map(Reply::Get),
            Command::Delete(_) => {
                ParseResult::Error(ProtocolError::NotImplemented("delete reply decoding"))
            }
            Command::Storage(_) => SetCmdReply::parse(buf).map(Reply::Storage),
            Command::MetaGet(_) => MetaGetReply::parse(buf).map(Reply::MetaGet),
            Command::MetaSet(_) => MetaSetReply::parse(buf).map(Reply::MetaSet),
            Command::MetaDelete(_) => MetaDeleteReply::parse(buf).map(Reply::MetaDelete),
        }
    }
}

impl Encode for Reply {
    fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize> {
        match self {
            Reply::Get(reply) => reply.write_to(dst),
            Reply::Storage(reply) => reply.write_to(dst),
            Reply::MetaGet(reply) => reply.write_to(dst),
            Reply::MetaSet(reply) => reply.write_to(dst),
            Reply::MetaDelete(reply) => reply.write_to(dst),
        }
    }
}

impl From<GetReply> for Reply {
    fn from(reply: GetReply) -> Self {
        Reply::Get(reply)
    }
}

impl From<SetCmdReply> for Reply {
    fn from(reply: SetCmdReply) -> Self {
        Reply::Storage(reply)
    }
}

impl From<MetaGetReply> for Reply {
    fn from(reply: MetaGetReply) -> Self {
        Reply::MetaGet(reply)
    }
}

impl From<MetaSetReply> for Reply {
    fn from(reply: MetaSetReply) -> Self {
        Reply::MetaSet(reply)
    }
}

impl From<MetaDeleteReply> for Reply {
    fn from(reply: MetaDeleteReply) -> Self {
        Reply::MetaDelete(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        DeleteCommand, GetReplyItem, MetaDeleteCommand, MetaDeleteStatus, MetaGetCommand,
        StorageCommand, StorageStatus,
    };

    #[test]
    fn test_encode_through_enum() {
        let reply: Reply = GetReply::new(vec![GetReplyItem::new("k", "v")]).into();
        assert_eq!(reply.to_bytes().unwrap(), b"VALUE k 0 1\r\nv\r\nEND\r\n");

        let reply: Reply = SetCmdReply::new(StorageStatus::Stored).into();
        assert_eq!(reply.to_bytes().unwrap(), b"STORED\r\n");

        let reply: Reply = MetaGetReply::miss().into();
        assert_eq!(reply.to_bytes().unwrap(), b"EN\r\n");
    }

    #[test]
    fn test_parse_for_picks_grammar() {
        // HD is a hit for mg and a successful delete for md
        let mg: Command = MetaGetCommand::new("k").into();
        assert!(matches!(
            Reply::parse_for(&mg, b"HD\r\n"),
            ParseResult::Complete(Reply::MetaGet(ref r), 4) if r.is_hit()
        ));

        let md: Command = MetaDeleteCommand::new("k").into();
        assert_eq!(
            Reply::parse_for(&md, b"HD\r\n"),
            ParseResult::Complete(
                Reply::MetaDelete(MetaDeleteReply::new(MetaDeleteStatus::Deleted)),
                4
            )
        );

        let set: Command = StorageCommand::set("k", "v").into();
        assert!(matches!(
            Reply::parse_for(&set, b"HD\r\n"),
            ParseResult::Error(ProtocolError::UnexpectedReply(_))
        ));

        let del: Command = DeleteCommand::new("k").into();
        assert!(matches!(
            Reply::parse_for(&del, b"DELETED\r\n"),
            ParseResult::Error(ProtocolError::NotImplemented(_))
        ));
    }
}
