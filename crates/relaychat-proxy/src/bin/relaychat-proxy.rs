//! Standalone relaychat proxy.
//!
//! ```text
//! relaychat-proxy --bind 0.0.0.0:25580 --log-filter relaychat=debug
//! ```

use clap::Parser;
use relaychat_proxy::{ProxyConfig, ProxyError, ProxyServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relaychat-proxy")]
#[command(about = "Routes cross-server chat and whispers between game servers")]
struct Args {
    /// Address to accept game-server connections on.
    #[arg(long, default_value = "127.0.0.1:25580")]
    bind: String,

    /// Tracing filter, e.g. `info` or `relaychat_proxy=debug`.
    /// `RUST_LOG` takes precedence when set.
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Seconds a new connection has to send SERVER_HELLO.
    #[arg(long, default_value_t = 5)]
    hello_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_filter)),
        )
        .with_target(true)
        .init();

    let config = ProxyConfig {
        bind_addr: args.bind,
        hello_timeout_ms: args.hello_timeout_secs.saturating_mul(1_000),
    };

    let server = ProxyServer::bind(config).await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
