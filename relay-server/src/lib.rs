//! 文本中继服务端
//!
//! 客户端通过 TCP 连接，用户名登录后互相广播消息；心跳检测无响应的客户端并断开。
//!
//! - [`config`] 命令行参数与服务端配置
//! - [`handle`] 单个连接的句柄：会话状态、写队列、关闭信号
//! - [`registry`] 存活连接注册表
//! - [`session`] 每个连接的登录/命令分发状态机
//! - [`broadcast`] 广播分发
//! - [`heartbeat`] PING/PONG 存活检测
//! - [`server`] 监听与连接生命周期

pub mod broadcast;
pub mod config;
pub mod handle;
pub mod heartbeat;
pub mod registry;
pub mod server;
pub mod session;

pub use config::{Cli, HeartbeatTiming, ServerConfig};
pub use handle::{ClientHandle, ConnectionId, SessionState};
pub use registry::{AuthError, Registry, RegistryStats};
pub use server::RelayServer;
