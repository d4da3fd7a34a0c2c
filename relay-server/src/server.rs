//! 中继服务器核心实现

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use protocol::{
    Connection, LineWriter, ProtocolError, TcpListener, TcpTransport, Transport,
    TransportListener,
};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{HeartbeatTiming, ServerConfig};
use crate::handle::{ClientHandle, ConnectionId, Outbound};
use crate::registry::Registry;
use crate::session::{Flow, Session};

/// 关闭时等待连接退出的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 中继服务器
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<Registry>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// 绑定配置中的地址并运行，直到收到 Ctrl+C
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = ?e, "failed to install ctrl-c handler");
            }
        })
        .await
    }

    /// 绑定配置中的地址并运行，直到 `shutdown` 完成
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(&self.config.listen).await?;
        self.serve(listener, shutdown).await
    }

    /// 在已绑定的监听器上接受连接
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Server listening on {}", listener.local_addr()?);
        match self.config.heartbeat {
            Some(timing) => info!(
                interval = ?timing.interval,
                timeout = ?timing.timeout,
                "Heartbeat enabled"
            ),
            None => info!("Heartbeat disabled"),
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(transport) => self.spawn_client(transport),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }

                _ = &mut shutdown => {
                    info!("Received shutdown signal, closing all connections...");
                    self.shutdown().await;
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_client(&self, transport: TcpTransport) {
        let registry = Arc::clone(&self.registry);
        let heartbeat = self.config.heartbeat;
        let peer = transport.peer_addr();

        tokio::spawn(async move {
            if let Err(e) = handle_client(transport, registry, heartbeat).await {
                debug!(?peer, "Client handler error: {}", e);
            }
        });
    }

    /// 关闭所有连接并等待它们从注册表移除
    async fn shutdown(&self) {
        self.registry.close_all().await;

        let start = Instant::now();
        loop {
            let remaining = self.registry.stats().await.total;
            if remaining == 0 {
                break;
            }
            if start.elapsed() > SHUTDOWN_GRACE {
                warn!("Shutdown timeout, {} connections still active", remaining);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        info!("Server shutdown complete");
    }
}

/// 处理单个客户端连接
///
/// 读循环在本任务内按序处理每一行；写出由独立的写任务完成。
/// 无论以何种方式结束，连接都会从注册表移除。
async fn handle_client(
    transport: TcpTransport,
    registry: Arc<Registry>,
    heartbeat: Option<HeartbeatTiming>,
) -> Result<(), ProtocolError> {
    let peer = transport.peer_addr();
    let (mut reader, writer) = Connection::new(transport).split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let handle = Arc::new(ClientHandle::new(registry.next_id(), peer, outbound_tx));
    let id = handle.id();
    let writer_task = tokio::spawn(write_loop(
        writer,
        outbound_rx,
        Arc::downgrade(&handle),
        id,
    ));

    if !registry.register(Arc::clone(&handle)).await {
        // 服务器正在关闭
        if let Err(e) = writer_task.await {
            debug!(id, "writer task ended abnormally: {}", e);
        }
        return Ok(());
    }

    let mut session = Session::new(Arc::clone(&handle), Arc::clone(&registry), heartbeat);
    let closed = handle.closed();
    tokio::pin!(closed);

    let result = loop {
        tokio::select! {
            line = reader.read_line() => {
                match line {
                    Ok(line) => {
                        if session.handle_line(&line).await == Flow::Close {
                            break Ok(());
                        }
                    }
                    Err(ProtocolError::ConnectionClosed) => {
                        info!(id, user = %handle.label(), "Client disconnected");
                        break Ok(());
                    }
                    Err(e) => {
                        warn!(id, user = %handle.label(), "Read error: {}", e);
                        break Err(e);
                    }
                }
            }

            // QUIT、心跳失败、写错误或服务器关闭
            _ = &mut closed => break Ok(()),
        }
    };

    drop(session);
    registry.unregister(id).await;
    handle.close();
    if let Err(e) = writer_task.await {
        debug!(id, "writer task ended abnormally: {}", e);
    }

    result
}

/// 写任务：按序写出队列中的行，收到 Close 或写失败后关闭写入端
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: LineWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    handle: Weak<ClientHandle>,
    id: ConnectionId,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Line(line) => {
                if let Err(e) = writer.write_line(&line).await {
                    debug!(id, "Write failed: {}", e);
                    if let Some(handle) = handle.upgrade() {
                        handle.close();
                    }
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(id, "Failed to shutdown writer: {}", e);
    }
}
