//! 服务端配置与命令行参数

use std::time::Duration;

use clap::Parser;
use protocol::{
    DEFAULT_ADDR, HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL_SECS, HEARTBEAT_TIMEOUT,
    HEARTBEAT_TIMEOUT_SECS,
};

/// 心跳时序
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatTiming {
    /// 两次 PING 之间的空闲等待
    pub interval: Duration,
    /// PING 之后等待 PONG 的时间
    pub timeout: Duration,
}

impl Default for HeartbeatTiming {
    fn default() -> Self {
        Self {
            interval: HEARTBEAT_INTERVAL,
            timeout: HEARTBEAT_TIMEOUT,
        }
    }
}

/// 服务端配置
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// 监听地址，格式为 "host:port"
    pub listen: String,
    /// 心跳配置，`None` 表示关闭心跳探测
    pub heartbeat: Option<HeartbeatTiming>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_ADDR.to_string(),
            heartbeat: Some(HeartbeatTiming::default()),
        }
    }
}

/// 命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about = "Line-oriented text relay server", long_about = None)]
pub struct Cli {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub listen: String,

    /// Disable PING/PONG liveness probing.
    #[arg(long)]
    pub no_heartbeat: bool,

    /// Idle seconds between heartbeat probes.
    #[arg(long, default_value_t = HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,

    /// Seconds a client has to answer PING with PONG.
    #[arg(long, default_value_t = HEARTBEAT_TIMEOUT_SECS)]
    pub heartbeat_timeout_secs: u64,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let heartbeat = (!cli.no_heartbeat).then(|| HeartbeatTiming {
            interval: Duration::from_secs(cli.heartbeat_interval_secs),
            timeout: Duration::from_secs(cli.heartbeat_timeout_secs),
        });
        Self {
            listen: cli.listen,
            heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let cli = Cli::parse_from(["relay-server"]);
        let config = ServerConfig::from(cli);
        assert_eq!(config.listen, "127.0.0.1:1337");
        assert_eq!(config.heartbeat, Some(HeartbeatTiming::default()));
        assert_eq!(
            HeartbeatTiming::default().interval,
            Duration::from_secs(10)
        );
        assert_eq!(HeartbeatTiming::default().timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_no_heartbeat_flag() {
        let cli = Cli::parse_from(["relay-server", "--listen", "0.0.0.0:9000", "--no-heartbeat"]);
        let config = ServerConfig::from(cli);
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert!(config.heartbeat.is_none());
    }

    #[test]
    fn test_custom_heartbeat_timing() {
        let cli = Cli::parse_from([
            "relay-server",
            "--heartbeat-interval-secs",
            "30",
            "--heartbeat-timeout-secs",
            "5",
        ]);
        let config = ServerConfig::from(cli);
        assert_eq!(
            config.heartbeat,
            Some(HeartbeatTiming {
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(5),
            })
        );
    }
}
