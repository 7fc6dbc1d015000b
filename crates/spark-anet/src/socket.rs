use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr};

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, trace, warn};

use crate::{
    error::{self, AnetError, create_error, io_error, option_error},
    listener,
    platform::{self, SocketErrorKind},
};

/// 调用方独占的 TCP 套接字句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以单一句柄类型承载“已连接/建连中/监听中”三种状态，调用方按需组合
///   读写、选项与关闭，而不必接触 `socket2` 或平台常量；
/// - 所有 IO 方法都以 `&self` 调用，与 `std::net::TcpStream` 的使用方式一致，
///   读写两个方向可以分别在不同线程进行。
///
/// ## 契约（What）
/// - 本层返回的句柄已经完成配置（已绑定并监听，或已连接/正在连接），此后
///   所有权完全归调用方；
/// - `drop` 释放描述符；[`TcpSocket::close`] 额外先执行写方向半关闭；
/// - **并发约束**：同一句柄上不得并发调用 [`TcpSocket::write`]，其阻塞回退
///   的模式切换不是原子的。
#[derive(Debug)]
pub struct TcpSocket {
    inner: Socket,
}

/// 为给定协议族创建流式套接字，并立即开启 `SO_REUSEADDR`。
///
/// 失败返回 [`AnetError::SocketCreate`]；在多候选迭代中应视为“跳过此候选”，
/// 而不是整个操作失败。
pub fn create_socket(domain: Domain) -> Result<TcpSocket, AnetError> {
    let inner =
        Socket::new(domain, Type::STREAM, None).map_err(|err| create_error(error::SOCKET, err))?;
    // 连接密集的场景下反复关闭/重开同一端口不应因 TIME_WAIT 失败。
    inner
        .set_reuse_address(true)
        .map_err(|err| create_error(error::REUSE_ADDR, err))?;
    Ok(TcpSocket { inner })
}

impl TcpSocket {
    /// 读取一次数据，不循环、不重试。
    ///
    /// `Ok(0)` 表示对端已关闭；非阻塞套接字无数据时返回
    /// [`AnetError::Io`]，其 OS 错误分类为 [`SocketErrorKind::WouldBlock`]。
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, AnetError> {
        (&self.inner)
            .read(buf)
            .map_err(|err| io_error(error::READ, err))
    }

    /// 写出整个缓冲区。
    ///
    /// # 教案级注释
    ///
    /// ## 意图（Why）
    /// - 非阻塞套接字在发送缓冲已满时会截断写入；调用方通常没有现成的
    ///   “阻塞回退写循环”，本方法替其兜底，同时保证写完后套接字仍处于
    ///   原先的非阻塞模式，不影响两次写之间的轮询。
    ///
    /// ## 逻辑（How）
    /// 1. 先以完整长度执行一次 `send`，全部写出则直接返回；
    /// 2. 若错误不是 `WouldBlock`，立即返回，不做任何模式切换；
    /// 3. 若为 `WouldBlock` 或部分写出，借助 [`BlockingModeGuard`] 临时切换为
    ///    阻塞模式，写完剩余字节后恢复原模式；失败路径同样由守卫恢复。
    ///
    /// ## 契约（What）
    /// - 成功时返回值恒等于 `buf.len()`；空缓冲直接返回 `Ok(0)`；
    /// - 剩余部分写入失败则整个操作失败；
    /// - **注意**：阻塞阶段没有超时，耗时取决于对端排空接收缓冲的速度。
    pub fn write(&self, buf: &[u8]) -> Result<usize, AnetError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sent = match self.inner.send(buf) {
            Ok(n) if n >= buf.len() => return Ok(n),
            Ok(n) => n,
            Err(err) if SocketErrorKind::classify(&err) == SocketErrorKind::WouldBlock => 0,
            Err(err) => return Err(io_error(error::WRITE, err)),
        };

        debug!(
            sent,
            remaining = buf.len() - sent,
            "send buffer saturated, finishing write in blocking mode"
        );
        let guard = BlockingModeGuard::enter(&self.inner)?;
        send_all(&self.inner, &buf[sent..]).map_err(|err| io_error(error::WRITE, err))?;
        guard.restore()?;
        Ok(buf.len())
    }

    /// 接受一个入站连接，等价于 [`crate::accept`]。
    pub fn accept(&self) -> Result<TcpSocket, AnetError> {
        listener::accept(self)
    }

    /// 切换为非阻塞模式。
    pub fn set_nonblocking(&self) -> Result<(), AnetError> {
        self.inner
            .set_nonblocking(true)
            .map_err(|err| option_error(error::SET_NONBLOCK, err))
    }

    /// 切换回阻塞模式。
    pub fn set_blocking(&self) -> Result<(), AnetError> {
        self.inner
            .set_nonblocking(false)
            .map_err(|err| option_error(error::CLEAR_NONBLOCK, err))
    }

    /// 查询当前是否为非阻塞模式；平台不支持查询时返回 `Ok(None)`。
    pub fn is_nonblocking(&self) -> Result<Option<bool>, AnetError> {
        platform::is_nonblocking(&self.inner).map_err(|err| option_error(error::QUERY_MODE, err))
    }

    /// 开启 `TCP_NODELAY`。
    pub fn set_nodelay(&self) -> Result<(), AnetError> {
        self.inner
            .set_tcp_nodelay(true)
            .map_err(|err| option_error(error::TCP_NODELAY, err))
    }

    /// 开启 `SO_KEEPALIVE`。
    pub fn set_keepalive(&self) -> Result<(), AnetError> {
        self.inner
            .set_keepalive(true)
            .map_err(|err| option_error(error::SO_KEEPALIVE, err))
    }

    /// 设置 `SO_SNDBUF`。内核可能按自身规则放大或取整该值。
    pub fn set_send_buffer_size(&self, bytes: usize) -> Result<(), AnetError> {
        self.inner
            .set_send_buffer_size(bytes)
            .map_err(|err| option_error(error::SO_SNDBUF, err))
    }

    /// 读取内核实际生效的 `SO_SNDBUF`。
    pub fn send_buffer_size(&self) -> Result<usize, AnetError> {
        self.inner
            .send_buffer_size()
            .map_err(|err| option_error(error::GET_SO_SNDBUF, err))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AnetError> {
        socket_addr(self.inner.local_addr(), error::LOCAL_ADDR)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, AnetError> {
        socket_addr(self.inner.peer_addr(), error::PEER_ADDR)
    }

    /// 先半关闭写方向，再释放描述符。
    ///
    /// 半关闭失败（例如监听套接字或对端已断开）不影响描述符释放。
    pub fn close(self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Write) {
            trace!(error = %err, "half-close skipped before release");
        }
    }

    /// 借出底层 `socket2` 套接字，用于本层未封装的选项。
    pub fn as_socket(&self) -> &Socket {
        &self.inner
    }

    /// 交出底层 `socket2` 套接字的所有权。
    pub fn into_socket(self) -> Socket {
        self.inner
    }

    pub(crate) fn connect_to(&self, addr: SocketAddr) -> io::Result<()> {
        self.inner.connect(&SockAddr::from(addr))
    }

    pub(crate) fn bind_and_listen(
        &self,
        addr: SocketAddr,
        backlog: i32,
    ) -> Result<(), AnetError> {
        self.inner
            .bind(&SockAddr::from(addr))
            .map_err(|err| error::attempt_error(error::BIND, addr, err))?;
        self.inner
            .listen(backlog)
            .map_err(|err| error::attempt_error(error::LISTEN, addr, err))
    }
}

impl From<Socket> for TcpSocket {
    fn from(inner: Socket) -> Self {
        Self { inner }
    }
}

impl From<TcpSocket> for Socket {
    fn from(socket: TcpSocket) -> Self {
        socket.inner
    }
}

fn socket_addr(
    addr: io::Result<SockAddr>,
    kind: error::OperationKind,
) -> Result<SocketAddr, AnetError> {
    let addr = addr.map_err(|err| io_error(kind, err))?;
    addr.as_socket().ok_or_else(|| {
        io_error(
            kind,
            io::Error::new(io::ErrorKind::InvalidData, "not an inet socket address"),
        )
    })
}

/// 以阻塞方式写完全部字节，`EINTR` 时自动重试。
fn send_all(socket: &Socket, mut rest: &[u8]) -> io::Result<()> {
    while !rest.is_empty() {
        match socket.send(rest) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => rest = &rest[n..],
            Err(err) if SocketErrorKind::classify(&err) == SocketErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// 写回退期间的阻塞模式守卫。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 写回退需要“非阻塞 → 阻塞 → 非阻塞”三步切换；若中途出错提前返回，
///   套接字不能被遗留在阻塞模式，否则调用方的轮询循环会被意外卡住。
///
/// ## 逻辑 (How)
/// - `enter`：记录进入前的模式（unix 通过 `Socket::nonblocking` 查询；无法查询的平台按
///   “触发回退即说明处于非阻塞”处理），随后清除非阻塞标志；
/// - `restore`：成功路径上显式恢复并上报恢复失败；
/// - `Drop`：失败路径上兜底恢复，只能记录 `warn` 日志。
///
/// ## 契约 (What)
/// - 进入前本就是阻塞模式时，守卫既不切换也不恢复；
/// - 任一退出路径结束后，套接字模式与进入前一致（恢复调用本身失败除外）。
#[derive(Debug)]
struct BlockingModeGuard<'a> {
    socket: &'a Socket,
    restore_nonblocking: bool,
}

impl<'a> BlockingModeGuard<'a> {
    fn enter(socket: &'a Socket) -> Result<Self, AnetError> {
        let was_nonblocking = platform::is_nonblocking(socket)
            .map_err(|err| option_error(error::QUERY_MODE, err))?
            .unwrap_or(true);
        if was_nonblocking {
            socket
                .set_nonblocking(false)
                .map_err(|err| option_error(error::CLEAR_NONBLOCK, err))?;
        }
        Ok(Self {
            socket,
            restore_nonblocking: was_nonblocking,
        })
    }

    fn restore(mut self) -> Result<(), AnetError> {
        let restore = std::mem::replace(&mut self.restore_nonblocking, false);
        if restore {
            self.socket
                .set_nonblocking(true)
                .map_err(|err| option_error(error::SET_NONBLOCK, err))?;
        }
        Ok(())
    }
}

impl Drop for BlockingModeGuard<'_> {
    fn drop(&mut self) {
        if self.restore_nonblocking
            && let Err(err) = self.socket.set_nonblocking(true)
        {
            warn!(error = %err, "failed to restore non-blocking mode after write fallback");
        }
    }
}
