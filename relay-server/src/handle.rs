//! 连接句柄
//!
//! 每个已接受的连接对应一个 [`ClientHandle`]，由 [`Registry`](crate::registry::Registry)
//! 持有强引用。写出的行经 mpsc 交给该连接的写任务，关闭通过 watch 通知读循环和心跳。

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use protocol::ServerMessage;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// 连接唯一标识
pub type ConnectionId = u64;

/// 会话状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// 初始状态，尚未登录
    #[default]
    Unauthenticated,
    /// 已登录
    Connected { username: String },
}

impl SessionState {
    pub fn username(&self) -> Option<&str> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::Connected { username } => Some(username),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }
}

/// 写任务收到的指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 写出一行（不含终止符）
    Line(String),
    /// 写完队列中已有的行后关闭连接
    Close,
}

/// 连接句柄
#[derive(Debug)]
pub struct ClientHandle {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    /// 会话状态，只在 Registry 写锁内切换到 Connected
    state: Mutex<SessionState>,
    /// 最近一轮心跳是否收到了 PONG
    pong_received: AtomicBool,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: watch::Sender<bool>,
}

impl ClientHandle {
    pub fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            state: Mutex::new(SessionState::Unauthenticated),
            pong_received: AtomicBool::new(false),
            outbound,
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// 当前会话状态的快照
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn username(&self) -> Option<String> {
        self.state().username().map(str::to_string)
    }

    /// 日志里使用的名字，未登录时为 `-`
    pub fn label(&self) -> String {
        self.username().unwrap_or_else(|| "-".to_string())
    }

    /// 排队发送一条消息
    ///
    /// 连接已关闭或写任务已退出时静默丢弃，返回 false。
    pub fn send(&self, message: &ServerMessage) -> bool {
        if self.is_closed() {
            debug!(
                id = self.id,
                "Skipped send ({}): client not active any more", message
            );
            return false;
        }

        debug!(id = self.id, ">> [{}] {}", self.label(), message);
        if self
            .outbound
            .send(Outbound::Line(message.to_string()))
            .is_err()
        {
            debug!(id = self.id, "writer gone, dropping message");
            return false;
        }
        true
    }

    /// 关闭连接（幂等）
    ///
    /// 已排队的行仍会被写出，之后写任务关闭 socket。
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        debug!(id = self.id, "closing connection [{}]", self.label());
        let _ = self.outbound.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// 返回一个在连接关闭时完成的 future
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closed.subscribe();
        async move {
            // 发送端被丢弃也视为关闭
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    /// 记录收到 PONG
    pub fn confirm_pong(&self) {
        self.pong_received.store(true, Ordering::SeqCst);
    }

    /// 新一轮心跳开始前清除标记
    pub fn reset_pong(&self) {
        self.pong_received.store(false, Ordering::SeqCst);
    }

    pub fn pong_received(&self) -> bool {
        self.pong_received.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ClientHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientHandle::new(1, None, tx), rx)
    }

    #[test]
    fn test_send_queues_wire_line() {
        let (handle, mut rx) = handle();
        assert!(handle.send(&ServerMessage::Ping));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Line("PING".into()));
    }

    #[test]
    fn test_close_is_idempotent_and_flushes_first() {
        let (handle, mut rx) = handle();
        handle.send(&ServerMessage::Disconnect);
        handle.close();
        handle.close();

        assert!(handle.is_closed());
        assert_eq!(rx.try_recv().unwrap(), Outbound::Line("DCSN".into()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (handle, mut rx) = handle();
        handle.close();
        assert!(!handle.send(&ServerMessage::Ping));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_without_writer_does_not_panic() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(!handle.send(&ServerMessage::Ping));
    }

    #[tokio::test]
    async fn test_closed_future_resolves() {
        let (handle, _rx) = handle();
        let closed = handle.closed();
        handle.close();
        closed.await;

        // 关闭之后再订阅也立即完成
        handle.closed().await;
    }

    #[test]
    fn test_pong_flag() {
        let (handle, _rx) = handle();
        assert!(!handle.pong_received());
        handle.confirm_pong();
        assert!(handle.pong_received());
        handle.reset_pong();
        assert!(!handle.pong_received());
    }

    #[test]
    fn test_session_state_accessors() {
        let (handle, _rx) = handle();
        assert_eq!(handle.state(), SessionState::Unauthenticated);
        assert_eq!(handle.label(), "-");

        handle.set_state(SessionState::Connected {
            username: "bob".into(),
        });
        assert!(handle.state().is_connected());
        assert_eq!(handle.username().as_deref(), Some("bob"));
    }
}
