//! 文本中继共享协议库
//!
//! 包含:
//! - 行分帧 (LineFramer)
//! - 命令解析 (Command, Verb)
//! - 服务端消息 (ServerMessage, ErrorCode)
//! - 行编解码 (LineReader, LineWriter)
//! - 传输层抽象 (Transport trait)
//! - 连接封装 (Connection)

mod codec;
mod command;
mod connection;
mod constants;
mod error;
mod framer;
mod message;
mod transport;

pub use codec::{LineReader, LineWriter};
pub use command::{is_valid_username, Command, Verb};
pub use connection::Connection;
pub use constants::*;
pub use error::{ProtocolError, Result};
pub use framer::LineFramer;
pub use message::{ErrorCode, ServerMessage};
pub use transport::{TcpListener, TcpTransport, Transport, TransportConfig, TransportListener};
