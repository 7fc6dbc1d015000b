#![doc = r#"
# spark-anet

## 设计动机（Why）
- **定位**：该 crate 提供同步、跨平台的 TCP 套接字工具层，封装地址解析、
  多候选建连、多协议族监听以及带容错的读写，供上层事件循环直接复用。
- **架构角色**：位于传输实现之下、系统调用之上。上层只关心“拿到一个已配置好的
  套接字”，不必处理 `getaddrinfo` 候选迭代、`IPV6_V6ONLY`、阻塞模式切换等细节。
- **设计理念**：每个操作只做一次系统层面的尝试，失败时返回带稳定错误码的
  [`AnetError`]，其 `Display` 文本即面向运维的一行诊断。

## 核心契约（What）
- **输入条件**：主机可以是名字或数字地址，服务可以是数字端口或（unix 下）服务名；
- **输出保障**：返回的 [`TcpSocket`] 已完成配置，所有权完全归调用方；中途创建但未
  返回的套接字在函数返回前全部关闭；
- **前置约束**：同一套接字上不得并发调用 [`TcpSocket::write`]。

## 实现策略（How）
- **解析**：unix 使用系统 `getaddrinfo`（`AF_UNSPEC` + `SOCK_STREAM`），其他平台退化为
  `ToSocketAddrs`；
- **建连/监听**：按解析顺序逐个尝试候选，建连首个成功者胜出，监听则尽量覆盖每个
  协议族直至上限；
- **写回退**：非阻塞写遇到 `WouldBlock` 或短写时，临时切换到阻塞模式写完剩余字节，
  再由 RAII 守卫恢复原模式。

## 风险与考量（Trade-offs）
- **阻塞回退**：非阻塞套接字上的 [`TcpSocket::write`] 可能阻塞调用线程，换取
  “要么全部写出、要么报错”的简单语义；
- **可观测性**：本 crate 只发出 `tracing` 事件，不安装任何订阅器。
"#]

mod config;
mod connect;
mod error;
mod listener;
mod platform;
mod resolve;
mod socket;

pub use config::{DEFAULT_BACKLOG, DEFAULT_MAX_LISTENERS, ListenConfig, SocketOptions};
pub use connect::{ConnectMode, connect, connect_nonblocking, generic_connect};
pub use error::{ANET_ERR_LEN, AnetError, ErrorBuffer, OperationKind, ReportExt};
pub use listener::{accept, listen, listen_into, listen_with_config};
pub use platform::SocketErrorKind;
pub use resolve::{Candidate, CandidateList, Intent, resolve};
pub use socket::{TcpSocket, create_socket};
pub use socket2::Domain;

/// 从套接字读取一次，等价于 [`TcpSocket::read`]。
pub fn read(socket: &TcpSocket, buf: &mut [u8]) -> Result<usize, AnetError> {
    socket.read(buf)
}

/// 写出整个缓冲区，等价于 [`TcpSocket::write`]。
pub fn write(socket: &TcpSocket, buf: &[u8]) -> Result<usize, AnetError> {
    socket.write(buf)
}

/// 半关闭写方向并释放套接字，等价于 [`TcpSocket::close`]。
pub fn close(socket: TcpSocket) {
    socket.close();
}
