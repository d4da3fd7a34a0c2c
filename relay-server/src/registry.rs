//! 连接注册表
//!
//! 所有存活连接的唯一来源：谁连着、谁以什么名字登录。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use protocol::{ServerMessage, SERVER_VERSION};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::handle::{ClientHandle, ConnectionId, SessionState};

/// 登录失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("username {0:?} is already in use")]
    UsernameTaken(String),

    #[error("connection {0} is already logged in")]
    AlreadyAuthenticated(ConnectionId),

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// 连接计数（仅用于诊断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub authenticated: usize,
}

/// 连接注册表
#[derive(Debug)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientHandle>>>,
    next_id: AtomicU64,
    /// `close_all` 之后不再接收新连接
    closing: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closing: AtomicBool::new(false),
        }
    }

    /// 分配下一个连接 ID
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 加入存活集合，并发送欢迎消息
    ///
    /// 注册表已关闭时直接关闭连接并返回 false。
    pub async fn register(&self, handle: Arc<ClientHandle>) -> bool {
        let stats = {
            let mut connections = self.connections.write().await;
            if self.closing.load(Ordering::Acquire) {
                drop(connections);
                handle.close();
                info!(id = handle.id(), peer = ?handle.peer(), "Connection refused: shutting down");
                return false;
            }
            connections.insert(handle.id(), Arc::clone(&handle));
            Self::count(&connections)
        };
        info!(
            id = handle.id(),
            peer = ?handle.peer(),
            total = stats.total,
            connected = stats.authenticated,
            "Connection registered"
        );

        handle.send(&ServerMessage::welcome(SERVER_VERSION));
        true
    }

    /// 从存活集合移除并关闭连接
    ///
    /// 幂等：连接已不在集合中时什么也不做，返回 false。
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let (removed, stats) = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(&id);
            (removed, Self::count(&connections))
        };

        match removed {
            Some(handle) => {
                handle.close();
                info!(
                    id,
                    user = %handle.label(),
                    total = stats.total,
                    connected = stats.authenticated,
                    "Connection closed"
                );
                true
            }
            None => {
                debug!(id, "unregister: connection already gone");
                false
            }
        }
    }

    /// 是否有已登录连接使用该用户名
    pub async fn is_username_taken(&self, username: &str) -> bool {
        let connections = self.connections.read().await;
        Self::username_in_use(&connections, username)
    }

    /// 原子地检查并占用用户名，成功后连接进入 Connected
    pub async fn try_authenticate(
        &self,
        id: ConnectionId,
        username: &str,
    ) -> Result<(), AuthError> {
        let connections = self.connections.write().await;

        let handle = connections
            .get(&id)
            .ok_or(AuthError::UnknownConnection(id))?;
        if handle.state().is_connected() {
            return Err(AuthError::AlreadyAuthenticated(id));
        }
        if Self::username_in_use(&connections, username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        handle.set_state(SessionState::Connected {
            username: username.to_string(),
        });
        Ok(())
    }

    /// 除 `excluding` 外所有已登录连接的快照，顺序不定
    pub async fn authenticated_peers(&self, excluding: ConnectionId) -> Vec<Arc<ClientHandle>> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|handle| handle.id() != excluding && handle.state().is_connected())
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<ClientHandle>> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn stats(&self) -> RegistryStats {
        Self::count(&*self.connections.read().await)
    }

    /// 输出当前计数
    pub async fn log_stats(&self) {
        let stats = self.stats().await;
        info!(
            total = stats.total,
            connected = stats.authenticated,
            "Number of clients"
        );
    }

    /// 关闭所有连接（服务器停止时使用），之后的注册都会被拒绝
    pub async fn close_all(&self) {
        let connections = self.connections.write().await;
        self.closing.store(true, Ordering::Release);
        for handle in connections.values() {
            handle.close();
        }
    }

    fn username_in_use(
        connections: &HashMap<ConnectionId, Arc<ClientHandle>>,
        username: &str,
    ) -> bool {
        connections
            .values()
            .any(|handle| handle.state().username() == Some(username))
    }

    fn count(connections: &HashMap<ConnectionId, Arc<ClientHandle>>) -> RegistryStats {
        RegistryStats {
            total: connections.len(),
            authenticated: connections
                .values()
                .filter(|handle| handle.state().is_connected())
                .count(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
