//! 连接封装
//!
//! 把传输层和行编解码绑在一起，提供按行收发的接口。

use std::fmt::Display;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{LineReader, LineWriter};
use crate::error::Result;
use crate::message::ServerMessage;
use crate::transport::Transport;

/// 连接封装
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: LineReader<R>,
    writer: LineWriter<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self::from_parts(reader, writer)
    }

    /// 从读写端直接创建连接
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader: LineReader::new(reader),
            writer: LineWriter::new(writer),
        }
    }

    /// 分离为读取端和写入端
    ///
    /// 服务端用写入端单独起一个写任务
    pub fn split(self) -> (LineReader<R>, LineWriter<W>) {
        (self.reader, self.writer)
    }

    /// 接收一行原始文本
    pub async fn recv_line(&mut self) -> Result<String> {
        self.reader.read_line().await
    }

    /// 接收并解析一条服务端消息
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        let line = self.reader.read_line().await?;
        line.parse()
    }

    /// 发送一条消息
    pub async fn send<M: Display>(&mut self, msg: &M) -> Result<()> {
        self.writer.send(msg).await
    }

    /// 发送一行原始文本
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_line(line).await
    }
}
