//! 服务端消息类型定义
//!
//! 每条消息对应线上的一行：`<空格分隔的字段>\n`。

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// 协议错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 已登录状态下的未知命令
    UnknownCommand,
    /// 用户名已被占用
    UserAlreadyLoggedIn,
    /// 用户名格式不合法
    InvalidUsername,
    /// 未登录就发送了 CONN 以外的命令
    NotLoggedIn,
}

impl ErrorCode {
    /// 线上格式的错误码
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::UnknownCommand => "ER00",
            ErrorCode::UserAlreadyLoggedIn => "ER01",
            ErrorCode::InvalidUsername => "ER02",
            ErrorCode::NotLoggedIn => "ER03",
        }
    }

    /// 服务端默认附带的描述
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::UnknownCommand => "Unknown command",
            ErrorCode::UserAlreadyLoggedIn => "User already logged in",
            ErrorCode::InvalidUsername => {
                "Username has an invalid format (only characters, numbers and underscores are allowed)"
            }
            ErrorCode::NotLoggedIn => "Please log in first",
        }
    }
}

impl FromStr for ErrorCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ER00" => Ok(ErrorCode::UnknownCommand),
            "ER01" => Ok(ErrorCode::UserAlreadyLoggedIn),
            "ER02" => Ok(ErrorCode::InvalidUsername),
            "ER03" => Ok(ErrorCode::NotLoggedIn),
            other => Err(ProtocolError::UnknownErrorCode(other.to_string())),
        }
    }
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// 服务端通知（连接时的欢迎语）
    Info(String),
    /// 成功应答，文本可能为空
    Ok(String),
    /// 错误应答
    Error { code: ErrorCode, description: String },
    /// 心跳请求
    Ping,
    /// 断开通知（心跳超时）
    Disconnect,
    /// 其他用户的广播
    Broadcast { username: String, text: String },
}

impl ServerMessage {
    /// 连接建立后的欢迎消息
    pub fn welcome(version: &str) -> Self {
        ServerMessage::Info(format!("Welcome to the server {version}"))
    }

    /// 带默认描述的错误应答
    pub fn error(code: ErrorCode) -> Self {
        ServerMessage::Error {
            code,
            description: code.description().to_string(),
        }
    }

    /// 登出应答 `OK Goodbye`
    pub fn goodbye() -> Self {
        ServerMessage::Ok("Goodbye".to_string())
    }

    /// 广播发送者收到的确认 `OK BCST <text>`
    pub fn broadcast_ack(text: &str) -> Self {
        ServerMessage::Ok(format!("BCST {text}"))
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Info(text) => write!(f, "INFO {text}"),
            ServerMessage::Ok(text) => write!(f, "OK {text}"),
            ServerMessage::Error { code, description } => {
                write!(f, "{} {}", code.code(), description)
            }
            ServerMessage::Ping => f.write_str("PING"),
            ServerMessage::Disconnect => f.write_str("DCSN"),
            ServerMessage::Broadcast { username, text } => {
                write!(f, "BCST {username} {text}")
            }
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    /// 解析服务端发来的一行（客户端使用）
    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (kind, rest) = line.split_once(' ').unwrap_or((line, ""));

        let message = match kind {
            "INFO" => ServerMessage::Info(rest.to_string()),
            "OK" => ServerMessage::Ok(rest.to_string()),
            "PING" => ServerMessage::Ping,
            "DCSN" => ServerMessage::Disconnect,
            "BCST" => {
                let (username, text) = rest.split_once(' ').unwrap_or((rest, ""));
                if username.is_empty() {
                    return Err(ProtocolError::MalformedMessage {
                        line: line.to_string(),
                    });
                }
                ServerMessage::Broadcast {
                    username: username.to_string(),
                    text: text.to_string(),
                }
            }
            code if code.starts_with("ER") => ServerMessage::Error {
                code: code.parse()?,
                description: rest.to_string(),
            },
            _ => {
                return Err(ProtocolError::MalformedMessage {
                    line: line.to_string(),
                })
            }
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            ServerMessage::welcome("1.3").to_string(),
            "INFO Welcome to the server 1.3"
        );
        assert_eq!(ServerMessage::Ok("bob".into()).to_string(), "OK bob");
        assert_eq!(ServerMessage::goodbye().to_string(), "OK Goodbye");
        assert_eq!(
            ServerMessage::broadcast_ack("hello").to_string(),
            "OK BCST hello"
        );
        assert_eq!(ServerMessage::Ping.to_string(), "PING");
        assert_eq!(ServerMessage::Disconnect.to_string(), "DCSN");
        assert_eq!(
            ServerMessage::Broadcast {
                username: "alice".into(),
                text: "hello".into()
            }
            .to_string(),
            "BCST alice hello"
        );
    }

    #[test]
    fn test_error_wire_format() {
        assert_eq!(
            ServerMessage::error(ErrorCode::UnknownCommand).to_string(),
            "ER00 Unknown command"
        );
        assert_eq!(
            ServerMessage::error(ErrorCode::UserAlreadyLoggedIn).to_string(),
            "ER01 User already logged in"
        );
        assert!(ServerMessage::error(ErrorCode::InvalidUsername)
            .to_string()
            .starts_with("ER02 "));
        assert_eq!(
            ServerMessage::error(ErrorCode::NotLoggedIn).to_string(),
            "ER03 Please log in first"
        );
    }

    #[test]
    fn test_parse_broadcast_keeps_text_spaces() {
        let msg: ServerMessage = "BCST alice hello  there".parse().unwrap();
        assert_eq!(
            msg,
            ServerMessage::Broadcast {
                username: "alice".into(),
                text: "hello  there".into()
            }
        );
    }

    #[test]
    fn test_parse_error_line() {
        let msg: ServerMessage = "ER01 User already logged in\n".parse().unwrap();
        assert_eq!(msg, ServerMessage::error(ErrorCode::UserAlreadyLoggedIn));
    }

    #[test]
    fn test_parse_unknown_error_code() {
        let err = "ER99 nope".parse::<ServerMessage>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownErrorCode(code) if code == "ER99"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("HELLO world".parse::<ServerMessage>().is_err());
        assert!("BCST".parse::<ServerMessage>().is_err());
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!("PING".parse::<ServerMessage>().unwrap(), ServerMessage::Ping);
        assert_eq!(
            "DCSN".parse::<ServerMessage>().unwrap(),
            ServerMessage::Disconnect
        );
        assert_eq!(
            "OK Goodbye".parse::<ServerMessage>().unwrap(),
            ServerMessage::goodbye()
        );
    }
}
