//! 声明式套接字配置。
//!
//! 两个结构都实现了 `serde::Deserialize` 并带 `#[serde(default)]`，宿主可以直接把它们
//! 嵌入自己的 TOML/JSON 配置；缺省值与直接调用 [`crate::listen`] 的行为完全一致。

use serde::Deserialize;

use crate::{error::AnetError, socket::TcpSocket};

/// 传递给 `listen(2)` 的默认积压队列长度。
///
/// 内核按 `roundup_pow_of_two(backlog + 1)` 取整，511 实际得到 512 个槽位。
pub const DEFAULT_BACKLOG: i32 = 511;

/// 未显式指定时最多创建的监听套接字数量。
pub const DEFAULT_MAX_LISTENERS: usize = 16;

/// 单个套接字上要落地的选项集合。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把 `TCP_NODELAY`、`SO_KEEPALIVE`、`SO_SNDBUF` 与非阻塞模式显式建模，避免宿主层
///   逐个调用选项函数并各自处理错误；
///
/// ## 契约（What）
/// - 缺省值全部关闭，`send_buffer_size = None` 表示沿用内核默认；
/// - [`SocketOptions::apply`] 按 nodelay → keepalive → sndbuf → nonblocking 顺序设置，
///   遇到首个失败即返回 [`AnetError::Option`]，已设置的选项不回滚。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocketOptions {
    nonblocking: bool,
    nodelay: bool,
    keepalive: bool,
    send_buffer_size: Option<usize>,
}

impl SocketOptions {
    pub const fn new() -> Self {
        Self {
            nonblocking: false,
            nodelay: false,
            keepalive: false,
            send_buffer_size: None,
        }
    }

    pub fn with_nonblocking(mut self, enabled: bool) -> Self {
        self.nonblocking = enabled;
        self
    }

    pub fn with_nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    pub fn with_send_buffer_size(mut self, bytes: Option<usize>) -> Self {
        self.send_buffer_size = bytes;
        self
    }

    pub fn nonblocking(&self) -> bool {
        self.nonblocking
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    pub fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer_size
    }

    /// 将选项写入套接字。
    pub fn apply(&self, socket: &TcpSocket) -> Result<(), AnetError> {
        if self.nodelay {
            socket.set_nodelay()?;
        }
        if self.keepalive {
            socket.set_keepalive()?;
        }
        if let Some(bytes) = self.send_buffer_size {
            socket.set_send_buffer_size(bytes)?;
        }
        if self.nonblocking {
            socket.set_nonblocking()?;
        }
        Ok(())
    }
}

/// 监听建立的参数。
///
/// - `backlog`：传给 `listen(2)` 的积压长度，默认 [`DEFAULT_BACKLOG`]；
/// - `v6_only`：IPv6 候选绑定前设置 `IPV6_V6ONLY`，使同端口的 IPv4 监听互不冲突；
/// - `max_listeners`：最多创建的监听套接字数；
/// - `listener`：每个监听套接字成功 `listen` 后应用的 [`SocketOptions`]。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    backlog: i32,
    v6_only: bool,
    max_listeners: usize,
    listener: SocketOptions,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenConfig {
    pub const fn new() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            v6_only: true,
            max_listeners: DEFAULT_MAX_LISTENERS,
            listener: SocketOptions::new(),
        }
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_v6_only(mut self, enabled: bool) -> Self {
        self.v6_only = enabled;
        self
    }

    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    pub fn with_listener_options(mut self, options: SocketOptions) -> Self {
        self.listener = options;
        self
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn v6_only(&self) -> bool {
        self.v6_only
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    pub fn listener_options(&self) -> &SocketOptions {
        &self.listener
    }
}
