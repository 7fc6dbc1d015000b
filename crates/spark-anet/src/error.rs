//! spark-anet 的错误分类与诊断文本出口。
//!
//! # 教案式注释
//!
//! ## 意图 (Why)
//! - 每个失败操作只产出**一条**人类可读诊断，格式固定为
//!   `操作: 系统错误文本`（如 `connect: Connection refused`），便于运维日志与告警规则匹配；
//! - 同时为每类失败附带稳定错误码（`spark.anet.*`），供指标与告警按类别聚合。
//!
//! ## 契约 (What)
//! - [`AnetError`]：七类终端错误 + 多候选迭代时的单次尝试失败 [`AnetError::Attempt`]；
//! - [`ErrorBuffer`]：定长（[`ANET_ERR_LEN`] 字节）诊断缓冲，每次写入覆盖旧值；
//! - [`ReportExt::report`]：把 `Result` 中的错误文本投递到可选缓冲，结果原样透传。

use std::fmt::{self, Write as _};
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// 诊断缓冲的容量（字节），包含 C 风格终止位，因此最多保存 `ANET_ERR_LEN - 1` 字节文本。
pub const ANET_ERR_LEN: usize = 1024;

/// 描述一次底层操作对应的稳定错误码与诊断前缀。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    code: &'static str,
    message: &'static str,
}

impl OperationKind {
    const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 诊断前缀，例如 `"setsockopt TCP_NODELAY"`。
    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

pub(crate) const SOCKET: OperationKind =
    OperationKind::new("spark.anet.socket_create_failed", "creating socket");
pub(crate) const REUSE_ADDR: OperationKind =
    OperationKind::new("spark.anet.socket_create_failed", "setsockopt SO_REUSEADDR");
pub(crate) const CONNECT: OperationKind =
    OperationKind::new("spark.anet.connect_failed", "connect");
pub(crate) const BIND: OperationKind = OperationKind::new("spark.anet.bind_failed", "bind");
pub(crate) const LISTEN: OperationKind = OperationKind::new("spark.anet.listen_failed", "listen");
pub(crate) const READ: OperationKind = OperationKind::new("spark.anet.read_failed", "read");
pub(crate) const WRITE: OperationKind = OperationKind::new("spark.anet.write_failed", "write");
pub(crate) const LOCAL_ADDR: OperationKind =
    OperationKind::new("spark.anet.io_failed", "getsockname");
pub(crate) const PEER_ADDR: OperationKind =
    OperationKind::new("spark.anet.io_failed", "getpeername");
pub(crate) const TCP_NODELAY: OperationKind =
    OperationKind::new("spark.anet.option_failed", "setsockopt TCP_NODELAY");
pub(crate) const SO_KEEPALIVE: OperationKind =
    OperationKind::new("spark.anet.option_failed", "setsockopt SO_KEEPALIVE");
pub(crate) const SO_SNDBUF: OperationKind =
    OperationKind::new("spark.anet.option_failed", "setsockopt SO_SNDBUF");
pub(crate) const GET_SO_SNDBUF: OperationKind =
    OperationKind::new("spark.anet.option_failed", "getsockopt SO_SNDBUF");
pub(crate) const QUERY_MODE: OperationKind =
    OperationKind::new("spark.anet.option_failed", "query O_NONBLOCK");

#[cfg(not(windows))]
pub(crate) const SET_NONBLOCK: OperationKind =
    OperationKind::new("spark.anet.option_failed", "fcntl(F_SETFL,O_NONBLOCK)");
#[cfg(windows)]
pub(crate) const SET_NONBLOCK: OperationKind =
    OperationKind::new("spark.anet.option_failed", "ioctlsocket(FIONBIO, 1)");

#[cfg(not(windows))]
pub(crate) const CLEAR_NONBLOCK: OperationKind =
    OperationKind::new("spark.anet.option_failed", "fcntl(F_SETFL,~O_NONBLOCK)");
#[cfg(windows)]
pub(crate) const CLEAR_NONBLOCK: OperationKind =
    OperationKind::new("spark.anet.option_failed", "ioctlsocket(FIONBIO, 0)");

const RESOLVE_CODE: &str = "spark.anet.resolve_failed";
const ACCEPT_CODE: &str = "spark.anet.accept_failed";
const NO_LISTENER_CODE: &str = "spark.anet.no_listener";

/// spark-anet 全部可观察的失败。
///
/// `Display` 即对外的唯一诊断文本；`source()` 链保留原始 [`io::Error`]，
/// 其 `raw_os_error()` 可供调用方做 errno 级判断。
#[derive(Debug, Error)]
pub enum AnetError {
    /// 主机/服务无法解析出任何候选地址。
    #[error("can't resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    /// 创建套接字或开启 `SO_REUSEADDR` 失败。
    #[error("{kind}: {source}")]
    SocketCreate {
        kind: OperationKind,
        #[source]
        source: io::Error,
    },

    /// 多候选迭代中单个地址的 `connect`/`bind`/`listen` 失败。
    ///
    /// 仅作为 [`AnetError::Connect`] / [`AnetError::NoListener`] 的“最近一次诊断”出现。
    #[error("{kind}: {source}")]
    Attempt {
        kind: OperationKind,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 全部候选地址均未能建立连接。
    #[error("{}", last_diagnostic(.last))]
    Connect {
        attempts: usize,
        #[source]
        last: Option<Box<AnetError>>,
    },

    /// 一个监听套接字都没有创建成功。
    #[error("{}", last_diagnostic(.last))]
    NoListener {
        attempts: usize,
        #[source]
        last: Option<Box<AnetError>>,
    },

    /// `accept` 以非 `EINTR` 原因失败。
    #[error("accept: {source}")]
    Accept {
        #[source]
        source: io::Error,
    },

    /// 单个套接字选项设置/查询失败。
    #[error("{kind}: {source}")]
    Option {
        kind: OperationKind,
        #[source]
        source: io::Error,
    },

    /// 读写等 OS 级 IO 失败。
    #[error("{kind}: {source}")]
    Io {
        kind: OperationKind,
        #[source]
        source: io::Error,
    },
}

fn last_diagnostic(last: &Option<Box<AnetError>>) -> String {
    match last {
        Some(err) => err.to_string(),
        None => "no address candidates".to_owned(),
    }
}

impl AnetError {
    /// 稳定错误码，便于指标与告警聚合。
    pub fn code(&self) -> &'static str {
        match self {
            AnetError::Resolution { .. } => RESOLVE_CODE,
            AnetError::SocketCreate { kind, .. }
            | AnetError::Attempt { kind, .. }
            | AnetError::Option { kind, .. }
            | AnetError::Io { kind, .. } => kind.code,
            AnetError::Connect { .. } => CONNECT.code,
            AnetError::NoListener { .. } => NO_LISTENER_CODE,
            AnetError::Accept { .. } => ACCEPT_CODE,
        }
    }

    /// 返回导致失败的底层 OS 错误；聚合错误返回最近一次尝试的 OS 错误。
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            AnetError::Resolution { .. } => None,
            AnetError::SocketCreate { source, .. }
            | AnetError::Attempt { source, .. }
            | AnetError::Accept { source }
            | AnetError::Option { source, .. }
            | AnetError::Io { source, .. } => Some(source),
            AnetError::Connect { last, .. } | AnetError::NoListener { last, .. } => {
                last.as_deref().and_then(AnetError::os_error)
            }
        }
    }

    pub(crate) fn resolution(host: Option<&str>, reason: impl Into<String>) -> Self {
        AnetError::Resolution {
            host: host.unwrap_or("*").to_owned(),
            reason: reason.into(),
        }
    }
}

/// 将 IO 错误映射为套接字创建错误。
pub(crate) fn create_error(kind: OperationKind, source: io::Error) -> AnetError {
    AnetError::SocketCreate { kind, source }
}

/// 将 IO 错误映射为选项错误。
pub(crate) fn option_error(kind: OperationKind, source: io::Error) -> AnetError {
    AnetError::Option { kind, source }
}

/// 将 IO 错误映射为读写错误。
pub(crate) fn io_error(kind: OperationKind, source: io::Error) -> AnetError {
    AnetError::Io { kind, source }
}

/// 记录某个候选地址上的失败。
pub(crate) fn attempt_error(kind: OperationKind, addr: SocketAddr, source: io::Error) -> AnetError {
    AnetError::Attempt { kind, addr, source }
}

/// 定长诊断缓冲。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 兼容“调用方传入固定缓冲、失败时写入一条诊断”的传统约定，
///   让仍以字符串日志为主的宿主无需理解 [`AnetError`] 的结构即可落盘；
///
/// ## 契约（What）
/// - 最多保存 `ANET_ERR_LEN - 1` 字节，截断永远落在 UTF-8 字符边界；
/// - 每次 [`ErrorBuffer::set`] 覆盖上一条诊断；
/// - **后置条件**：`as_str().len() < ANET_ERR_LEN`。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorBuffer {
    text: String,
}

impl ErrorBuffer {
    /// 创建空缓冲。
    pub fn new() -> Self {
        Self {
            text: String::with_capacity(ANET_ERR_LEN),
        }
    }

    /// 写入一条诊断，超长部分被截断。
    pub fn set(&mut self, message: impl fmt::Display) {
        self.text.clear();
        // 写入 String 不会失败。
        let _ = write!(self.text, "{message}");
        let cut = floor_char_boundary(&self.text, ANET_ERR_LEN - 1);
        self.text.truncate(cut);
    }

    /// 当前诊断文本。
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

impl fmt::Display for ErrorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// 将错误文本投递到可选的 [`ErrorBuffer`]。
///
/// `None` 表示调用方不关心诊断文本，只观察成功/失败。
pub trait ReportExt<T> {
    fn report(self, sink: Option<&mut ErrorBuffer>) -> Result<T, AnetError>;
}

impl<T> ReportExt<T> for Result<T, AnetError> {
    fn report(self, sink: Option<&mut ErrorBuffer>) -> Result<T, AnetError> {
        if let (Err(err), Some(buffer)) = (&self, sink) {
            buffer.set(err);
        }
        self
    }
}
