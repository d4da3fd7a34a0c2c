//! 文本中继服务端
//!
//! 基于 Tokio 的异步 TCP 服务器

use anyhow::Result;
use clap::Parser;
use protocol::SERVER_VERSION;
use relay_server::{Cli, RelayServer, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relay_server=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .init();

    let config = ServerConfig::from(Cli::parse());

    info!("Starting server version {} on {}", SERVER_VERSION, config.listen);
    info!("Press Ctrl+C to quit the server");

    let server = RelayServer::new(config);
    server.run().await?;

    Ok(())
}
