//! 协议常量定义

use std::time::Duration;

/// 服务端版本号（出现在欢迎消息中）
pub const SERVER_VERSION: &str = "1.3";

/// 默认监听地址
pub const DEFAULT_ADDR: &str = "127.0.0.1:1337";

/// 行终止符
pub const LINE_TERMINATOR: u8 = b'\n';

/// 用户名最小长度
pub const MIN_USERNAME_LEN: usize = 3;

/// 用户名最大长度
pub const MAX_USERNAME_LEN: usize = 14;

/// 单次读取的字节块大小
pub const READ_CHUNK_SIZE: usize = 4096;

/// 心跳空闲间隔（秒）- 认证后等待多久发送 PING
pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// 心跳响应超时（秒）- PING 之后等待 PONG 的时间
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 3;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 心跳间隔 Duration
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);

/// 心跳超时 Duration
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(HEARTBEAT_TIMEOUT_SECS);

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
