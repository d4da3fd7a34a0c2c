//! 行编解码
//!
//! 帧格式:
//! ```text
//! ┌──────────────────────────────────┬──────┐
//! │      UTF-8 文本（空格分隔字段）      │  \n  │
//! └──────────────────────────────────┴──────┘
//! ```

use std::collections::VecDeque;
use std::fmt::Display;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::framer::LineFramer;
use crate::READ_CHUNK_SIZE;

/// 行读取器
///
/// 按块读取字节，交给 [`LineFramer`] 切分，逐行返回。
pub struct LineReader<R> {
    reader: R,
    framer: LineFramer,
    ready: VecDeque<String>,
    buffer: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// 创建新的行读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            ready: VecDeque::new(),
            buffer: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// 读取下一行（不含终止符）
    ///
    /// 对端关闭时返回 [`ProtocolError::ConnectionClosed`]，未结束的半行被丢弃。
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(line);
            }

            let n = self.reader.read(&mut self.buffer).await?;
            if n == 0 {
                if !self.framer.pending().is_empty() {
                    tracing::debug!(
                        bytes = self.framer.pending().len(),
                        "discarding unterminated input on close"
                    );
                }
                return Err(ProtocolError::ConnectionClosed);
            }

            self.ready.extend(self.framer.push(&self.buffer[..n]));
        }
    }

    /// 接收一行（read_line 的别名）
    pub async fn recv(&mut self) -> Result<String> {
        self.read_line().await
    }
}

/// 行写入器
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// 创建新的行写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一行并追加终止符
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut encoded = Vec::with_capacity(line.len() + 1);
        encoded.extend_from_slice(line.as_bytes());
        encoded.push(b'\n');

        self.writer.write_all(&encoded).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 编码并发送一条消息（`Command` 或 `ServerMessage`）
    pub async fn send<M: Display>(&mut self, msg: &M) -> Result<()> {
        self.write_line(&msg.to_string()).await
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
