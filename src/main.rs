//! mcwire - issue a single meta command against a memcached server
//!
//! ```text
//! mcwire [--config <file>] mg <key>
//! mcwire [--config <file>] ms <key> <value>
//! mcwire [--config <file>] md <key>
//! ```

use anyhow::{Context, bail};
use mcwire::client::Client;
use mcwire::config::Config;
use mcwire::protocol::{MetaDeleteCommand, MetaGetCommand, MetaSetCommand};
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: mcwire [--config <file>] <mg|ms|md> <key> [value]";

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    // Load configuration
    let config = if args.first().is_some_and(|a| a == "--config") {
        let Some(path) = args.get(1).cloned() else {
            bail!(USAGE);
        };
        args.drain(..2);
        info!("Loading configuration from {}", path);
        Config::from_file(&path)?
    } else {
        Config::from_env()
    };

    let runtime = Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(run(config, &args))
}

async fn run(config: Config, args: &[String]) -> anyhow::Result<()> {
    let client = Client::new(config.client).context("failed to create client")?;

    match args {
        [op, key] if op == "mg" => {
            let cmd = MetaGetCommand::new(key.as_str())
                .with_value(true)
                .with_cas(true)
                .with_client_flags(true)
                .with_ttl(true);
            let reply = client.meta_get(cmd).await?;
            if reply.is_miss() {
                println!("miss");
                return Ok(());
            }
            println!(
                "hit cas={:?} flags={:?} ttl={:?}",
                reply.cas(),
                reply.client_flags(),
                reply.ttl()
            );
            if let Some(value) = reply.value() {
                println!("{}", String::from_utf8_lossy(value));
            }
        }
        [op, key, value] if op == "ms" => {
            let reply = client
                .meta_set(MetaSetCommand::new(key.as_str(), value.as_str()))
                .await?;
            println!("{:?}", reply.status());
        }
        [op, key] if op == "md" => {
            let reply = client.meta_delete(MetaDeleteCommand::new(key.as_str())).await?;
            println!("{:?}", reply.status());
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
