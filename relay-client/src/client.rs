//! 终端客户端核心实现

use anyhow::{Context, Result};
use chrono::Local;
use protocol::{
    Command, ErrorCode, LineReader, LineWriter, ProtocolError, ServerMessage, TcpTransport,
    Transport, TransportConfig, DEFAULT_ADDR,
};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
};
use tracing::{debug, info, warn};

/// 命令行参数
#[derive(clap::Parser, Debug, Clone)]
#[command(author, version, about = "Terminal client for the text relay", long_about = None)]
pub struct ClientArgs {
    /// Address of the relay server.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub server: String,

    /// Log in with this username right after connecting.
    #[arg(long)]
    pub username: Option<String>,

    /// Do not answer PING automatically (lets the server evict this client).
    #[arg(long)]
    pub no_auto_pong: bool,
}

/// 客户端状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// 已连接但未登录
    Guest,
    /// 已登录
    LoggedIn { username: String },
}

/// 服务端消息解读后的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// 服务端通知
    Info(String),
    /// 登录成功
    LoggedIn { username: String },
    /// 广播已被服务端接收
    BroadcastAck { text: String },
    /// 登出确认
    LoggedOut,
    /// 其他用户的消息
    Chat { username: String, text: String },
    /// 心跳请求
    Ping,
    /// 被服务端断开
    Evicted,
    /// 错误应答
    Error { code: ErrorCode, description: String },
}

/// 用户在终端输入的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// 发送一条命令
    Send(Command),
    /// 原样发送（用于调试协议）
    Raw(String),
    /// 空行
    Nothing,
}

/// 解析终端输入
///
/// - `/conn <name>` 登录
/// - `/quit` 退出
/// - `/raw <line>` 原样发送
/// - 其他非空行作为广播发送
pub fn parse_input(line: &str) -> UserInput {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return UserInput::Nothing;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return UserInput::Send(Command::bcst(line));
    };
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    match name {
        "conn" => UserInput::Send(Command::conn(arg.trim())),
        "quit" => UserInput::Send(Command::quit()),
        "raw" => UserInput::Raw(arg.to_string()),
        _ => UserInput::Send(Command::bcst(line)),
    }
}

/// 终端客户端
pub struct RelayClient {
    pub state: ConnectionState,
    auto_pong: bool,
}

impl RelayClient {
    pub fn new(auto_pong: bool) -> Self {
        Self {
            state: ConnectionState::Guest,
            auto_pong,
        }
    }

    /// 结合当前状态解读服务端消息
    ///
    /// `OK` 的含义取决于状态：未登录时只可能是登录应答，
    /// 已登录时才会是广播确认或登出。用户名本身可以是 `Goodbye` 或 `BCST`。
    pub fn interpret(&self, message: ServerMessage) -> NetworkEvent {
        match message {
            ServerMessage::Info(text) => NetworkEvent::Info(text),
            ServerMessage::Ok(text) => match &self.state {
                ConnectionState::Guest => NetworkEvent::LoggedIn { username: text },
                ConnectionState::LoggedIn { .. } => match text.split_once(' ') {
                    Some(("BCST", rest)) => NetworkEvent::BroadcastAck {
                        text: rest.to_string(),
                    },
                    _ if text == "BCST" => NetworkEvent::BroadcastAck {
                        text: String::new(),
                    },
                    _ if text == "Goodbye" => NetworkEvent::LoggedOut,
                    _ => NetworkEvent::Info(text),
                },
            },
            ServerMessage::Error { code, description } => {
                NetworkEvent::Error { code, description }
            }
            ServerMessage::Ping => NetworkEvent::Ping,
            ServerMessage::Disconnect => NetworkEvent::Evicted,
            ServerMessage::Broadcast { username, text } => NetworkEvent::Chat { username, text },
        }
    }

    /// 根据事件更新状态，返回需要回给服务端的命令（自动 PONG）以及连接是否结束
    pub fn handle_event(&mut self, event: &NetworkEvent) -> (Option<Command>, bool) {
        match event {
            NetworkEvent::LoggedIn { username } => {
                self.state = ConnectionState::LoggedIn {
                    username: username.clone(),
                };
                (None, false)
            }
            NetworkEvent::Ping if self.auto_pong => (Some(Command::pong()), false),
            NetworkEvent::LoggedOut | NetworkEvent::Evicted => {
                self.state = ConnectionState::Guest;
                (None, true)
            }
            _ => (None, false),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, ConnectionState::LoggedIn { .. })
    }
}

/// 把事件渲染成一行终端输出
pub fn render(event: &NetworkEvent) -> String {
    let time = Local::now().format("%H:%M:%S");
    match event {
        NetworkEvent::Info(text) => format!("[{time}] *** {text}"),
        NetworkEvent::LoggedIn { username } => format!("[{time}] *** logged in as {username}"),
        NetworkEvent::BroadcastAck { text } => format!("[{time}] <me> {text}"),
        NetworkEvent::LoggedOut => format!("[{time}] *** goodbye"),
        NetworkEvent::Chat { username, text } => format!("[{time}] <{username}> {text}"),
        NetworkEvent::Ping => format!("[{time}] ~~ ping"),
        NetworkEvent::Evicted => format!("[{time}] !!! disconnected by server (heartbeat)"),
        NetworkEvent::Error { code, description } => {
            format!("[{time}] !!! {} {}", code.code(), description)
        }
    }
}

/// 连接服务器并运行，直到登出、被断开或标准输入结束
pub async fn run(args: ClientArgs) -> Result<()> {
    let transport = TcpTransport::connect(&args.server, &TransportConfig::default())
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("Connected to {}", args.server);

    let (reader, writer) = transport.split();
    let stdin = BufReader::new(tokio::io::stdin()).lines();

    let mut client = RelayClient::new(!args.no_auto_pong);
    let mut writer = LineWriter::new(writer);
    if let Some(username) = &args.username {
        writer.send(&Command::conn(username)).await?;
    }

    run_loop(&mut client, LineReader::new(reader), &mut writer, stdin).await?;

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shutdown writer: {}", e);
    }
    Ok(())
}

async fn run_loop<R, W, I>(
    client: &mut RelayClient,
    mut reader: LineReader<R>,
    writer: &mut LineWriter<W>,
    mut stdin: Lines<I>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
{
    loop {
        // 两个读分支都是取消安全的，半行输入会保留到下一轮
        tokio::select! {
            line = reader.read_line() => {
                let line = match line {
                    Ok(line) => line,
                    Err(ProtocolError::ConnectionClosed) => {
                        write_stdout("*** server closed the connection").await?;
                        break;
                    }
                    Err(e) => return Err(e).context("failed to read from server"),
                };

                let event = match line.parse::<ServerMessage>() {
                    Ok(message) => client.interpret(message),
                    Err(e) => {
                        warn!("Ignoring unexpected line {:?}: {}", line, e);
                        continue;
                    }
                };

                write_stdout(&render(&event)).await?;
                let (reply, done) = client.handle_event(&event);
                if let Some(reply) = reply {
                    writer.send(&reply).await?;
                    debug!("Sent {}", reply);
                }
                if done {
                    break;
                }
            }

            input = stdin.next_line() => {
                let Some(input) = input? else {
                    // 标准输入结束，礼貌地退出
                    if client.is_logged_in() {
                        writer.send(&Command::quit()).await?;
                    }
                    break;
                };
                match parse_input(&input) {
                    UserInput::Send(command) => writer.send(&command).await?,
                    UserInput::Raw(line) => writer.write_line(&line).await?,
                    UserInput::Nothing => {}
                }
            }

            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(e) = ctrl_c {
                    warn!(error = ?e, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    Ok(())
}

async fn write_stdout(line: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
