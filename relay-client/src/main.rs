//! 文本中继客户端
//!
//! 基于终端的交互式客户端

mod client;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::client::ClientArgs;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志（输出到 stderr，不干扰聊天内容）
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay_client=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = ClientArgs::parse();
    client::run(args).await
}
