//! 客户端命令解析
//!
//! 一行文本 -> `Command { verb, payload }`。解析器只负责切分，
//! 不校验动词是否合法，未知动词由会话状态机处理。

use std::fmt;

use crate::{MAX_USERNAME_LEN, MIN_USERNAME_LEN};

/// 命令动词
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// 登录
    Conn,
    /// 广播
    Bcst,
    /// 心跳响应
    Pong,
    /// 退出
    Quit,
    /// 其他未识别的动词（原样保留）
    Other(String),
}

impl Verb {
    fn from_token(token: &str) -> Self {
        match token {
            "CONN" => Verb::Conn,
            "BCST" => Verb::Bcst,
            "PONG" => Verb::Pong,
            "QUIT" => Verb::Quit,
            other => Verb::Other(other.to_string()),
        }
    }

    /// 线上格式的动词文本
    pub fn as_str(&self) -> &str {
        match self {
            Verb::Conn => "CONN",
            Verb::Bcst => "BCST",
            Verb::Pong => "PONG",
            Verb::Quit => "QUIT",
            Verb::Other(token) => token,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 客户端发送给服务端的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    /// 动词之后的剩余内容，可能为空
    pub payload: String,
}

impl Command {
    /// 解析一行（终止符已去掉）
    ///
    /// 先去掉首尾空白，再按第一个空格切分。
    pub fn parse(line: &str) -> Self {
        let clean = line.trim();
        let (verb, payload) = match clean.split_once(' ') {
            Some((verb, payload)) => (verb, payload),
            None => (clean, ""),
        };
        Self {
            verb: Verb::from_token(verb),
            payload: payload.to_string(),
        }
    }

    pub fn new(verb: Verb, payload: impl Into<String>) -> Self {
        Self {
            verb,
            payload: payload.into(),
        }
    }

    /// `CONN <username>`
    pub fn conn(username: impl Into<String>) -> Self {
        Self::new(Verb::Conn, username)
    }

    /// `BCST <text>`
    pub fn bcst(text: impl Into<String>) -> Self {
        Self::new(Verb::Bcst, text)
    }

    /// `PONG`
    pub fn pong() -> Self {
        Self::new(Verb::Pong, "")
    }

    /// `QUIT`
    pub fn quit() -> Self {
        Self::new(Verb::Quit, "")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{}", self.verb)
        } else {
            write!(f, "{} {}", self.verb, self.payload)
        }
    }
}

/// 用户名格式校验：3 到 14 个字符，只允许 ASCII 字母、数字和下划线
pub fn is_valid_username(username: &str) -> bool {
    (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verb_and_payload() {
        let cmd = Command::parse("BCST hello world");
        assert_eq!(cmd.verb, Verb::Bcst);
        assert_eq!(cmd.payload, "hello world");
    }

    #[test]
    fn test_parse_without_payload() {
        let cmd = Command::parse("QUIT");
        assert_eq!(cmd.verb, Verb::Quit);
        assert_eq!(cmd.payload, "");
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        let cmd = Command::parse("  PONG \r");
        assert_eq!(cmd.verb, Verb::Pong);
        assert_eq!(cmd.payload, "");

        let cmd = Command::parse("CONN bob\r");
        assert_eq!(cmd.payload, "bob");
    }

    #[test]
    fn test_parse_keeps_inner_spaces() {
        // 只切第一个空格，后续空格属于 payload
        let cmd = Command::parse("BCST  two  spaces");
        assert_eq!(cmd.verb, Verb::Bcst);
        assert_eq!(cmd.payload, " two  spaces");
    }

    #[test]
    fn test_parse_unknown_verb() {
        let cmd = Command::parse("HELLO there");
        assert_eq!(cmd.verb, Verb::Other("HELLO".to_string()));
        assert_eq!(cmd.payload, "there");
    }

    #[test]
    fn test_verbs_are_case_sensitive() {
        assert_eq!(Command::parse("conn bob").verb, Verb::Other("conn".to_string()));
    }

    #[test]
    fn test_parse_empty_line() {
        let cmd = Command::parse("");
        assert_eq!(cmd.verb, Verb::Other(String::new()));
        assert_eq!(cmd.payload, "");
    }

    #[test]
    fn test_display_encodes_wire_line() {
        assert_eq!(Command::conn("bob").to_string(), "CONN bob");
        assert_eq!(Command::bcst("hi all").to_string(), "BCST hi all");
        assert_eq!(Command::pong().to_string(), "PONG");
        assert_eq!(Command::quit().to_string(), "QUIT");
    }

    #[test]
    fn test_username_accepts_valid_names() {
        for name in ["bob", "Alice_01", "abcdefghijklmn", "___", "A1_"] {
            assert!(is_valid_username(name), "{name} should be valid");
        }
    }

    #[test]
    fn test_username_rejects_invalid_names() {
        for name in [
            "",
            "ab",
            "abcdefghijklmno",
            "bob smith",
            "bob-smith",
            "bób",
            "bob!",
            " bob",
        ] {
            assert!(!is_valid_username(name), "{name:?} should be invalid");
        }
    }
}
