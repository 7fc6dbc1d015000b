use tracing::debug;

use crate::{
    error::{self, AnetError, attempt_error},
    platform::SocketErrorKind,
    resolve::{Candidate, Intent, resolve},
    socket::{TcpSocket, create_socket},
};

/// 建连方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectMode {
    /// 阻塞直至连接建立或失败。
    Blocking,
    /// 连接前切换为非阻塞；返回的套接字可能仍在握手中。
    NonBlocking,
}

/// 阻塞建连。
pub fn connect(host: &str, service: &str) -> Result<TcpSocket, AnetError> {
    generic_connect(Some(host), service, ConnectMode::Blocking)
}

/// 非阻塞建连；调用方需自行等待套接字可写以确认握手完成。
pub fn connect_nonblocking(host: &str, service: &str) -> Result<TcpSocket, AnetError> {
    generic_connect(Some(host), service, ConnectMode::NonBlocking)
}

/// 按解析顺序逐个尝试候选地址，首个成功者胜出。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 双栈主机常同时解析出 IPv4/IPv6 地址，而其中某些并不可达；顺序尝试
///   即可获得鲁棒性；不做并行的 happy-eyeballs。
///
/// ## 逻辑（How）
/// 1. 以主动意图解析候选；
/// 2. 对每个候选：创建套接字（失败则跳过）→ 非阻塞模式下先切换模式 →
///    `connect`；
/// 3. `connect` 成功，或非阻塞模式下错误为 `InProgress`/`WouldBlock`，立即返回该
///    套接字，剩余候选被丢弃；
/// 4. 其他错误：记录诊断、关闭该套接字、继续下一个候选。
///
/// ## 契约（What）
/// - 返回的套接字已连接（或在非阻塞模式下正在连接）；
/// - 中途创建但未返回的套接字在函数返回前全部关闭；
/// - 全部失败时返回 [`AnetError::Connect`]，其文本为最后一次记录的诊断。
pub fn generic_connect(
    host: Option<&str>,
    service: &str,
    mode: ConnectMode,
) -> Result<TcpSocket, AnetError> {
    let candidates = resolve(host, service, Intent::Active)?;
    let mut attempts = 0;
    let mut last = None;
    for candidate in &candidates {
        attempts += 1;
        match try_candidate(candidate, mode) {
            Ok(socket) => {
                debug!(addr = %candidate.addr(), ?mode, attempts, "connect candidate accepted");
                return Ok(socket);
            }
            Err(err) => {
                debug!(addr = %candidate.addr(), error = %err, "connect candidate failed");
                last = Some(Box::new(err));
            }
        }
    }
    Err(AnetError::Connect { attempts, last })
}

fn try_candidate(candidate: &Candidate, mode: ConnectMode) -> Result<TcpSocket, AnetError> {
    let socket = create_socket(candidate.domain())?;
    if mode == ConnectMode::NonBlocking {
        socket.set_nonblocking()?;
    }
    match socket.connect_to(candidate.addr()) {
        Ok(()) => Ok(socket),
        // 两种错误都表示握手已交给内核继续推进。
        Err(err)
            if mode == ConnectMode::NonBlocking
                && matches!(
                    SocketErrorKind::classify(&err),
                    SocketErrorKind::InProgress | SocketErrorKind::WouldBlock
                ) =>
        {
            Ok(socket)
        }
        Err(err) => {
            socket.close();
            Err(attempt_error(error::CONNECT, candidate.addr(), err))
        }
    }
}
