//! 心跳监测
//!
//! 每个已登录连接一个独立任务：
//! 空闲 `interval` -> 清除 PONG 标记并发送 PING -> 等待 `timeout`
//! -> 收到 PONG 则进入下一轮，否则发送 DCSN 并强制断开。
//!
//! 任务只持有连接的弱引用，每次等待结束都重新查找；连接关闭后任务立即退出。

use std::future::Future;
use std::sync::{Arc, Weak};

use protocol::ServerMessage;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::HeartbeatTiming;
use crate::handle::ClientHandle;
use crate::registry::Registry;

/// 心跳结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// 连接已关闭或被释放
    ConnectionGone,
    /// 超时未收到 PONG，连接被断开
    Expired,
}

/// 为连接启动心跳任务
///
/// 返回的 `JoinHandle` 由会话持有，会话结束时 abort。
pub fn spawn(
    registry: Arc<Registry>,
    handle: &Arc<ClientHandle>,
    timing: HeartbeatTiming,
) -> JoinHandle<HeartbeatOutcome> {
    let weak = Arc::downgrade(handle);
    let closed = handle.closed();
    debug!(id = handle.id(), "~~ [{}] Heartbeat initiated", handle.label());

    tokio::spawn(run(registry, weak, timing, closed))
}

async fn run(
    registry: Arc<Registry>,
    weak: Weak<ClientHandle>,
    timing: HeartbeatTiming,
    closed: impl Future<Output = ()>,
) -> HeartbeatOutcome {
    tokio::pin!(closed);

    loop {
        tokio::select! {
            _ = sleep(timing.interval) => {}
            _ = &mut closed => return HeartbeatOutcome::ConnectionGone,
        }
        {
            let Some(handle) = live(&weak) else {
                return HeartbeatOutcome::ConnectionGone;
            };
            handle.reset_pong();
            handle.send(&ServerMessage::Ping);
        }

        tokio::select! {
            _ = sleep(timing.timeout) => {}
            _ = &mut closed => return HeartbeatOutcome::ConnectionGone,
        }
        let Some(handle) = live(&weak) else {
            return HeartbeatOutcome::ConnectionGone;
        };

        if handle.pong_received() {
            debug!(id = handle.id(), "~~ [{}] Heartbeat expired - SUCCESS", handle.label());
            continue;
        }

        info!(id = handle.id(), "~~ [{}] Heartbeat expired - FAILED", handle.label());
        handle.send(&ServerMessage::Disconnect);
        handle.close();
        registry.unregister(handle.id()).await;
        return HeartbeatOutcome::Expired;
    }
}

fn live(weak: &Weak<ClientHandle>) -> Option<Arc<ClientHandle>> {
    weak.upgrade().filter(|handle| !handle.is_closed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Outbound;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::advance;

    fn timing() -> HeartbeatTiming {
        HeartbeatTiming {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(3),
        }
    }

    async fn connected(
        registry: &Arc<Registry>,
    ) -> (Arc<ClientHandle>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ClientHandle::new(registry.next_id(), None, tx));
        registry.register(Arc::clone(&handle)).await;
        registry.try_authenticate(handle.id(), "bob").await.unwrap();
        // 欢迎消息
        rx.recv().await.unwrap();
        (handle, rx)
    }

    /// 让出执行权，保证被唤醒的任务跑完
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_is_disconnected_between_10_and_13() {
        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = connected(&registry).await;
        let task = spawn(Arc::clone(&registry), &handle, timing());
        settle().await;

        advance(Duration::from_millis(9_999)).await;
        settle().await;
        assert!(rx.try_recv().is_err(), "no PING before the idle interval");

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), Outbound::Line("PING".into()));
        assert!(!handle.is_closed());

        advance(Duration::from_millis(2_999)).await;
        settle().await;
        assert!(!handle.is_closed(), "still inside the response window");

        advance(Duration::from_millis(1)).await;
        assert_eq!(task.await.unwrap(), HeartbeatOutcome::Expired);

        assert_eq!(rx.try_recv().unwrap(), Outbound::Line("DCSN".into()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(handle.is_closed());
        assert!(registry.get(handle.id()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_keeps_connection_alive() {
        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = connected(&registry).await;
        let task = spawn(Arc::clone(&registry), &handle, timing());
        settle().await;

        for _ in 0..3 {
            advance(Duration::from_secs(10)).await;
            settle().await;
            assert_eq!(rx.try_recv().unwrap(), Outbound::Line("PING".into()));

            advance(Duration::from_secs(1)).await;
            handle.confirm_pong();

            advance(Duration::from_secs(2)).await;
            settle().await;
            assert!(!handle.is_closed());
        }

        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_before_ping_does_not_count() {
        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = connected(&registry).await;
        let task = spawn(Arc::clone(&registry), &handle, timing());
        settle().await;

        // PING 发出时标记被清除
        handle.confirm_pong();
        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), Outbound::Line("PING".into()));

        advance(Duration::from_secs(3)).await;
        assert_eq!(task.await.unwrap(), HeartbeatOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_when_connection_closes() {
        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = connected(&registry).await;
        let task = spawn(Arc::clone(&registry), &handle, timing());
        settle().await;

        advance(Duration::from_secs(5)).await;
        registry.unregister(handle.id()).await;

        assert_eq!(task.await.unwrap(), HeartbeatOutcome::ConnectionGone);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);

        advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(rx.try_recv().is_err(), "no PING after close");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_when_handle_dropped() {
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        // 不进注册表，丢弃唯一的强引用
        let handle = Arc::new(ClientHandle::new(registry.next_id(), None, tx));
        let task = spawn(Arc::clone(&registry), &handle, timing());
        settle().await;
        drop(handle);

        advance(Duration::from_secs(10)).await;
        assert_eq!(task.await.unwrap(), HeartbeatOutcome::ConnectionGone);
    }
}
