//! 行分帧器
//!
//! 按连接累积原始字节，每遇到一个 `\n` 就切出一行。
//! 未结束的半行会保留到下一个数据块，缓冲区不设上限。

use crate::LINE_TERMINATOR;

/// 行分帧器
#[derive(Debug, Default)]
pub struct LineFramer {
    /// 尚未遇到终止符的字节
    pending: Vec<u8>,
}

impl LineFramer {
    /// 创建空的分帧器
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个数据块，按顺序返回其中所有完整的行（不含终止符）
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == LINE_TERMINATOR) {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
            rest = &rest[pos + 1..];
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// 当前缓冲的半行
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
