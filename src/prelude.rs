//! Prelude module for common imports.
//!
//! # Usage
//!
//! ```
//! use mcwire::prelude::*;
//! ```

// Error types
pub use crate::error::{McwireError, ProtocolError, Result};

// Configuration
pub use crate::config::{ClientConfig, Config};

// Protocol
pub use crate::protocol::{
    Command, Decode, DeleteCommand, Encode, Flag, FlagKind, FlagSet, GetCommand, GetReply,
    GetReplyItem, MetaDeleteCommand, MetaDeleteReply, MetaDeleteStatus, MetaGetCommand,
    MetaGetReply, MetaSetCommand, MetaSetReply, MetaSetStatus, ParseResult, Reply, SetCmdReply,
    SetMode, StorageCommand, StorageStatus, StorageVerb,
};

// Client
pub use crate::client::{Client, ModulusSelector, ServerSelector};
