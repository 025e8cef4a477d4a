//! Sample async client built on the codec
//!
//! One lazily dialed connection per server, one request in flight per
//! connection. Each round trip encodes exactly one command and decodes
//! exactly one reply. There are no retries: a connection that fails with an
//! I/O, framing or timeout error is dropped and redialed on next use.

mod selector;

pub use selector::{ModulusSelector, ServerSelector};

use crate::config::ClientConfig;
use crate::protocol::parser::unexpected_reply;
use crate::protocol::{
    Command, Encode, MetaDeleteCommand, MetaDeleteReply, MetaDeleteStatus, MetaGetCommand,
    MetaGetReply, MetaSetCommand, MetaSetReply, MetaSetStatus, ParseResult, Reply, SetCmdReply,
    StorageCommand,
};
use crate::{McwireError, ProtocolError, Result};
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace, warn};

/// Meta no-op, sent after a quiet meta command to mark the end of its reply
const NOOP: &[u8] = b"mn\r\n";
const NOOP_REPLY: &[u8] = b"MN\r\n";

type Slot = Arc<AsyncMutex<Option<Connection>>>;

pub struct Client {
    config: ClientConfig,
    selector: Box<dyn ServerSelector>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(McwireError::NoServers);
        }
        Ok(Self {
            config,
            selector: Box::new(ModulusSelector),
            slots: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn with_selector(mut self, selector: impl ServerSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.config.servers
    }

    /// Send `cmd` to the server owning its key and read the reply.
    ///
    /// Returns `None` when the command asked the server to stay silent and
    /// it did: classic `noreply`, or a quiet (`q`) meta command whose reply
    /// was suppressed.
    pub async fn round_trip(&self, cmd: &Command) -> Result<Option<Reply>> {
        let addr = self
            .selector
            .select(&self.config.servers, cmd.key())?
            .to_string();
        let slot = self.slot(&addr);
        let mut conn = slot.lock().await;

        let exchange = self.exchange(&addr, &mut conn, cmd);
        let result = match self.config.io_timeout() {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or_else(|_| Err(McwireError::Timeout(self.config.io_timeout_ms))),
            None => exchange.await,
        };

        // A server-reported error consumed its whole line; the stream is still usable
        if let Err(e) = &result
            && !e.as_protocol().is_some_and(ProtocolError::is_server_reported)
            && conn.take().is_some()
        {
            warn!("Dropping connection to {}: {}", addr, e);
        }
        result
    }

    pub async fn meta_get(&self, cmd: MetaGetCommand) -> Result<MetaGetReply> {
        match self.round_trip(&cmd.into()).await? {
            Some(Reply::MetaGet(reply)) => Ok(reply),
            // quiet mode hides EN
            None => Ok(MetaGetReply::miss()),
            Some(other) => Err(mismatched(&other)),
        }
    }

    pub async fn meta_set(&self, cmd: MetaSetCommand) -> Result<MetaSetReply> {
        match self.round_trip(&cmd.into()).await? {
            Some(Reply::MetaSet(reply)) => Ok(reply),
            // quiet mode hides HD
            None => Ok(MetaSetReply::new(MetaSetStatus::Stored)),
            Some(other) => Err(mismatched(&other)),
        }
    }

    pub async fn meta_delete(&self, cmd: MetaDeleteCommand) -> Result<MetaDeleteReply> {
        match self.round_trip(&cmd.into()).await? {
            Some(Reply::MetaDelete(reply)) => Ok(reply),
            // quiet mode hides HD
            None => Ok(MetaDeleteReply::new(MetaDeleteStatus::Deleted)),
            Some(other) => Err(mismatched(&other)),
        }
    }

    /// Run a classic storage command. `None` for `noreply` commands.
    pub async fn store(&self, cmd: StorageCommand) -> Result<Option<SetCmdReply>> {
        match self.round_trip(&cmd.into()).await? {
            Some(Reply::Storage(reply)) => Ok(Some(reply)),
            None => Ok(None),
            Some(other) => Err(mismatched(&other)),
        }
    }

    fn slot(&self, addr: &str) -> Slot {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(addr.to_string()).or_default())
    }

    async fn exchange(
        &self,
        addr: &str,
        slot: &mut Option<Connection>,
        cmd: &Command,
    ) -> Result<Option<Reply>> {
        let conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect(addr).await?,
        };
        slot.insert(conn).exchange(cmd).await
    }

    async fn connect(&self, addr: &str) -> Result<Connection> {
        let connect = TcpStream::connect(addr);
        let stream = match self.config.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| McwireError::Timeout(self.config.connect_timeout_ms))??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;
        debug!("Connected to {}", addr);
        Ok(Connection::new(stream, self.config.read_buffer_size))
    }
}

fn mismatched(reply: &Reply) -> McwireError {
    ProtocolError::UnexpectedReply(format!("{reply:?}")).into()
}

struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream, read_buffer_size: usize) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(read_buffer_size),
            write_buf: BytesMut::with_capacity(256),
        }
    }

    async fn exchange(&mut self, cmd: &Command) -> Result<Option<Reply>> {
        let quiet_meta = cmd.is_noreply()
            && matches!(
                cmd,
                Command::MetaGet(_) | Command::MetaSet(_) | Command::MetaDelete(_)
            );

        self.write_buf.clear();
        cmd.write_to(&mut (&mut self.write_buf).writer())?;
        if quiet_meta {
            self.write_buf.extend_from_slice(NOOP);
        }
        self.stream.write_all(&self.write_buf).await?;
        trace!("Sent {} bytes", self.write_buf.len());

        if cmd.is_noreply() && !quiet_meta {
            return Ok(None);
        }
        self.read_reply(cmd, quiet_meta).await
    }

    async fn read_reply(&mut self, cmd: &Command, quiet: bool) -> Result<Option<Reply>> {
        self.read_buf.clear();
        let mut reply = None;
        let mut start = 0;

        loop {
            let pending = &self.read_buf[start..];
            if reply.is_none() && !(quiet && pending.starts_with(b"MN")) {
                match Reply::parse_for(cmd, pending) {
                    ParseResult::Complete(parsed, consumed) => {
                        reply = Some(parsed);
                        start += consumed;
                        if !quiet {
                            break;
                        }
                        continue;
                    }
                    ParseResult::NeedMoreData => {}
                    ParseResult::Error(e) => return Err(e.into()),
                }
            } else if pending.len() >= NOOP_REPLY.len() {
                if !pending.starts_with(NOOP_REPLY) {
                    return Err(unexpected_reply(pending).into());
                }
                start += NOOP_REPLY.len();
                break;
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(if self.read_buf.is_empty() {
                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()
                } else {
                    ProtocolError::Incomplete.into()
                });
            }
        }

        // Nothing was pipelined, so anything left over means the stream is out of sync
        if start != self.read_buf.len() {
            return Err(ProtocolError::TrailingData(self.read_buf.len() - start).into());
        }
        trace!("Received {} bytes", start);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GetCommand, StorageStatus};
    use tokio::net::TcpListener;

    /// Accepts one connection and answers each expected request with a canned reply
    async fn fake_server(script: Vec<(&'static [u8], &'static [u8])>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for (request, reply) in script {
                let mut buf = vec![0u8; request.len()];
                stream.read_exact(&mut buf).await.unwrap();
                assert_eq!(buf, request);
                stream.write_all(reply).await.unwrap();
            }
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });
        addr
    }

    fn client(addr: String) -> Client {
        Client::new(ClientConfig {
            servers: vec![addr],
            io_timeout_ms: 500,
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_servers() {
        let config = ClientConfig {
            servers: Vec::new(),
            ..ClientConfig::default()
        };
        assert!(matches!(Client::new(config), Err(McwireError::NoServers)));
    }

    #[tokio::test]
    async fn test_meta_round_trips() {
        let addr = fake_server(vec![
            (b"mg /foo v\r\n", b"EN\r\n"),
            (b"ms /foo 3\r\nbar\r\n", b"HD\r\n"),
            (b"mg /foo v\r\n", b"VA 3\r\nbar\r\n"),
            (b"md /foo\r\n", b"HD\r\n"),
        ])
        .await;
        let client = client(addr);

        let reply = client.meta_get(MetaGetCommand::new("/foo").with_value(true)).await.unwrap();
        assert!(reply.is_miss());

        let reply = client.meta_set(MetaSetCommand::new("/foo", "bar")).await.unwrap();
        assert!(reply.is_stored());

        let reply = client.meta_get(MetaGetCommand::new("/foo").with_value(true)).await.unwrap();
        assert_eq!(reply.value(), Some(&b"bar"[..]));

        let reply = client.meta_delete(MetaDeleteCommand::new("/foo")).await.unwrap();
        assert!(reply.deleted());
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        let addr = fake_server(vec![(b"mg k v\r\n", b"VA 10\r\n0123456789\r\n")]).await;
        let client = client(addr);
        let reply = client.meta_get(MetaGetCommand::new("k").with_value(true)).await.unwrap();
        assert_eq!(reply.value(), Some(&b"0123456789"[..]));
    }

    #[tokio::test]
    async fn test_quiet_meta_commands() {
        let addr = fake_server(vec![
            (b"mg k v q\r\nmn\r\n", b"MN\r\n"),
            (b"mg k v q\r\nmn\r\n", b"VA 1\r\nx\r\nMN\r\n"),
            (b"ms k 1 q\r\nx\r\nmn\r\n", b"NS\r\nMN\r\n"),
        ])
        .await;
        let client = client(addr);

        let cmd = MetaGetCommand::new("k").with_value(true).with_noreply(true);
        assert!(client.meta_get(cmd.clone()).await.unwrap().is_miss());
        assert_eq!(client.meta_get(cmd).await.unwrap().value(), Some(&b"x"[..]));

        let reply = client
            .meta_set(MetaSetCommand::new("k", "x").with_noreply(true))
            .await
            .unwrap();
        assert_eq!(reply.status(), MetaSetStatus::NotStored);
    }

    #[tokio::test]
    async fn test_quiet_bad_noop_terminator() {
        let addr = fake_server(vec![(b"md k q\r\nmn\r\n", b"MNX\r\n")]).await;
        let client = client(addr);
        let err = client
            .meta_delete(MetaDeleteCommand::new("k").with_noreply(true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            McwireError::Protocol(ProtocolError::UnexpectedReply(ref line)) if line == "MNX\r\n"
        ));
    }

    #[tokio::test]
    async fn test_classic_store() {
        let addr = fake_server(vec![
            (b"set k 0 0 1\r\nv\r\n", b"STORED\r\n"),
            (b"set k 0 0 1 noreply\r\nv\r\n", b""),
            (b"add k 0 0 1\r\nv\r\n", b"NOT_STORED\r\n"),
        ])
        .await;
        let client = client(addr);

        let reply = client.store(StorageCommand::set("k", "v")).await.unwrap();
        assert_eq!(reply.map(|r| r.status()), Some(StorageStatus::Stored));

        let reply = client
            .store(StorageCommand::set("k", "v").with_noreply(true))
            .await
            .unwrap();
        assert!(reply.is_none());

        let reply = client.store(StorageCommand::add("k", "v")).await.unwrap();
        assert_eq!(reply.map(|r| r.status()), Some(StorageStatus::NotStored));
    }

    #[tokio::test]
    async fn test_server_error_keeps_connection() {
        // the fake server accepts a single connection, so the second call
        // only succeeds if the first one did not drop it
        let addr = fake_server(vec![
            (b"md k\r\n", b"CLIENT_ERROR bad command line format\r\n"),
            (b"md k\r\n", b"NF\r\n"),
        ])
        .await;
        let client = client(addr);

        let err = client.meta_delete(MetaDeleteCommand::new("k")).await.unwrap_err();
        assert!(matches!(
            err,
            McwireError::Protocol(ProtocolError::ClientError(ref msg)) if msg == "bad command line format"
        ));
        assert!(client.meta_delete(MetaDeleteCommand::new("k")).await.unwrap().not_found());
    }

    #[tokio::test]
    async fn test_timeout() {
        let addr = fake_server(vec![(b"mg k\r\n", b"")]).await;
        let client = Client::new(ClientConfig {
            servers: vec![addr],
            io_timeout_ms: 50,
            ..ClientConfig::default()
        })
        .unwrap();

        let err = client.meta_get(MetaGetCommand::new("k")).await.unwrap_err();
        assert!(matches!(err, McwireError::Timeout(50)));
    }

    #[tokio::test]
    async fn test_trailing_bytes_are_an_error() {
        let addr = fake_server(vec![(b"mg k\r\n", b"HD\r\nHD\r\n")]).await;
        let client = client(addr);
        let err = client.meta_get(MetaGetCommand::new("k")).await.unwrap_err();
        assert!(matches!(
            err,
            McwireError::Protocol(ProtocolError::TrailingData(_))
        ));
    }

    #[tokio::test]
    async fn test_get_reply_decoding_not_implemented() {
        let addr = fake_server(vec![(b"get k\r\n", b"END\r\n")]).await;
        let client = client(addr);
        let err = client
            .round_trip(&GetCommand::new(["k"]).into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            McwireError::Protocol(ProtocolError::NotImplemented(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = client(addr).meta_get(MetaGetCommand::new("k")).await.unwrap_err();
        assert!(matches!(err, McwireError::Io(_)));
    }
}
