//! # mcwire
//!
//! Codec for the memcached text protocol: the classic commands
//! (`get`/`gets`, `set`/`add`/`replace`/`append`/`prepend`/`cas`, `delete`)
//! and the meta commands (`mg`/`ms`/`md`) with their single-letter flags.
//!
//! ## Features
//!
//! - Exact wire encoding for every command and reply
//! - Incremental decoding (`ParseResult`) over byte buffers, or blocking
//!   decoding from any `BufRead`
//! - Order-insensitive meta flag parsing with typed values
//! - Strict payload framing: a short or overlong value is an error
//! - Base64 key transport for binary keys
//! - A small async sample client (`client::Client`)
//!
//! ## Example
//!
//! ```
//! use mcwire::protocol::{Decode, Encode, MetaGetCommand, MetaGetReply};
//!
//! let cmd = MetaGetCommand::new("/foo").with_value(true).with_cas(true);
//! assert_eq!(cmd.to_bytes().unwrap(), b"mg /foo c v\r\n");
//!
//! let reply = MetaGetReply::decode(b"VA 3 c42\r\nbar\r\n").unwrap();
//! assert_eq!(reply.value(), Some(&b"bar"[..]));
//! assert_eq!(reply.cas(), Some(42));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌───────────┐
//! │ application  │────▶│ client               │────▶│ memcached │
//! │              │     │  ├─ ServerSelector   │     │           │
//! └──────────────┘     │  └─ Connection       │     └───────────┘
//!                      │      │ Encode/Decode │
//!                      │ protocol             │
//!                      │  ├─ Cursor, flags    │
//!                      │  ├─ classic commands │
//!                      │  └─ meta commands    │
//!                      └──────────────────────┘
//! ```

// Modules
pub mod client;
pub mod config;
pub mod error;
pub mod prelude;
pub mod protocol;

// Re-exports for convenience
pub use error::{McwireError, ProtocolError, Result};
