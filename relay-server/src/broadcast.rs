//! 广播分发

use protocol::ServerMessage;
use tracing::debug;

use crate::handle::ClientHandle;
use crate::registry::Registry;

/// 把 `BCST <sender> <text>` 投递给除发送者外所有已登录连接
///
/// 在调用时刻对注册表取快照。单个连接投递失败不影响其他连接，也不会
/// 反馈给发送者。返回尝试投递的连接数。
pub async fn fan_out(registry: &Registry, sender: &ClientHandle, text: &str) -> usize {
    let Some(username) = sender.username() else {
        debug!(id = sender.id(), "fan_out from unauthenticated connection ignored");
        return 0;
    };

    let message = ServerMessage::Broadcast {
        username,
        text: text.to_string(),
    };

    let peers = registry.authenticated_peers(sender.id()).await;
    let mut delivered = 0;
    for peer in &peers {
        if peer.send(&message) {
            delivered += 1;
        }
    }
    debug!(
        id = sender.id(),
        peers = peers.len(),
        delivered,
        "broadcast fanned out"
    );
    peers.len()
}
