//! 会话状态机
//!
//! | 状态 | 命令 | 动作 |
//! |---|---|---|
//! | Unauthenticated | CONN（格式错误） | ER02 |
//! | Unauthenticated | CONN（重名） | ER01 |
//! | Unauthenticated | CONN | OK，进入 Connected，启动心跳 |
//! | Unauthenticated | 其他 | ER03 |
//! | Connected | QUIT | OK Goodbye，关闭连接 |
//! | Connected | BCST | 广播给其他人，OK BCST 回给发送者 |
//! | Connected | PONG | 记录心跳响应 |
//! | Connected | 其他 | ER00 |

use std::sync::Arc;

use protocol::{is_valid_username, Command, ErrorCode, ServerMessage, Verb};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broadcast;
use crate::config::HeartbeatTiming;
use crate::handle::{ClientHandle, SessionState};
use crate::heartbeat::{self, HeartbeatOutcome};
use crate::registry::{AuthError, Registry};

/// 处理完一行之后连接的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// 单个连接的会话
pub struct Session {
    handle: Arc<ClientHandle>,
    registry: Arc<Registry>,
    heartbeat: Option<HeartbeatTiming>,
    heartbeat_task: Option<JoinHandle<HeartbeatOutcome>>,
}

impl Session {
    pub fn new(
        handle: Arc<ClientHandle>,
        registry: Arc<Registry>,
        heartbeat: Option<HeartbeatTiming>,
    ) -> Self {
        Self {
            handle,
            registry,
            heartbeat,
            heartbeat_task: None,
        }
    }

    pub fn handle(&self) -> &Arc<ClientHandle> {
        &self.handle
    }

    /// 处理一行输入
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let command = Command::parse(line);
        debug!(
            id = self.handle.id(),
            "<< [{}] {} {}",
            self.handle.label(),
            command.verb,
            command.payload
        );
        self.dispatch(command).await
    }

    /// 按当前状态分发命令
    pub async fn dispatch(&mut self, command: Command) -> Flow {
        match self.handle.state() {
            SessionState::Unauthenticated => self.unauthenticated(command).await,
            SessionState::Connected { username } => self.connected(&username, command).await,
        }
    }

    async fn unauthenticated(&mut self, command: Command) -> Flow {
        if command.verb != Verb::Conn {
            self.reply(ServerMessage::error(ErrorCode::NotLoggedIn));
            return Flow::Continue;
        }

        let username = command.payload;
        if !is_valid_username(&username) {
            self.reply(ServerMessage::error(ErrorCode::InvalidUsername));
            return Flow::Continue;
        }

        match self.registry.try_authenticate(self.handle.id(), &username).await {
            Ok(()) => {
                self.reply(ServerMessage::Ok(username));
                self.registry.log_stats().await;
                self.start_heartbeat();
                Flow::Continue
            }
            Err(AuthError::UsernameTaken(_)) => {
                self.reply(ServerMessage::error(ErrorCode::UserAlreadyLoggedIn));
                Flow::Continue
            }
            Err(e) => {
                // 连接已被移除（如心跳或关闭抢先一步）
                warn!(id = self.handle.id(), error = %e, "authentication aborted");
                Flow::Close
            }
        }
    }

    async fn connected(&mut self, username: &str, command: Command) -> Flow {
        match command.verb {
            Verb::Quit => {
                self.reply(ServerMessage::goodbye());
                self.handle.close();
                Flow::Close
            }
            Verb::Bcst => {
                let peers = broadcast::fan_out(&self.registry, &self.handle, &command.payload).await;
                debug!(id = self.handle.id(), user = username, peers, "broadcast");
                self.reply(ServerMessage::broadcast_ack(&command.payload));
                Flow::Continue
            }
            Verb::Pong => {
                self.handle.confirm_pong();
                Flow::Continue
            }
            Verb::Conn | Verb::Other(_) => {
                self.reply(ServerMessage::error(ErrorCode::UnknownCommand));
                Flow::Continue
            }
        }
    }

    fn start_heartbeat(&mut self) {
        let Some(timing) = self.heartbeat else {
            return;
        };
        if self.heartbeat_task.is_some() {
            return;
        }
        self.heartbeat_task = Some(heartbeat::spawn(
            Arc::clone(&self.registry),
            &self.handle,
            timing,
        ));
    }

    fn reply(&self, message: ServerMessage) {
        self.handle.send(&message);
    }

    /// 心跳任务是否在运行
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }
}
