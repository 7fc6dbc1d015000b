use tracing::{debug, trace, warn};

use crate::{
    config::ListenConfig,
    error::AnetError,
    platform::SocketErrorKind,
    resolve::{Candidate, Intent, resolve},
    socket::{TcpSocket, create_socket},
};

/// 在每个可解析的地址族上建立监听，最多 `max_listeners` 个。
///
/// `bind_addr = None` 表示通配地址。等价于以默认 [`ListenConfig`] 调用
/// [`listen_with_config`]。
pub fn listen(
    bind_addr: Option<&str>,
    service: &str,
    max_listeners: usize,
) -> Result<Vec<TcpSocket>, AnetError> {
    let config = ListenConfig::default().with_max_listeners(max_listeners);
    listen_with_config(bind_addr, service, &config)
}

/// 以调用方提供的定长槽位接收监听套接字，返回填充数量。
///
/// 槽位长度即上限；失败时槽位保持原样。
pub fn listen_into(
    bind_addr: Option<&str>,
    service: &str,
    slots: &mut [Option<TcpSocket>],
) -> Result<usize, AnetError> {
    let config = ListenConfig::default().with_max_listeners(slots.len());
    let sockets = listen_with_config(bind_addr, service, &config)?;
    let count = sockets.len();
    for (slot, socket) in slots.iter_mut().zip(sockets) {
        *slot = Some(socket);
    }
    Ok(count)
}

/// 按配置建立监听套接字集合。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 让服务端以一次调用同时覆盖 IPv4 与 IPv6（双栈/多族绑定），且其中一族不可用时
///   仍能以另一族对外服务。
///
/// ## 逻辑（How）
/// - 以被动意图解析候选，按解析顺序逐个处理，直至成功数量达到上限：
///   1. 创建套接字，失败则跳过；
///   2. IPv6 候选在绑定前设置 `IPV6_V6ONLY`，避免与同端口的 IPv4 监听冲突；
///   3. `bind` + `listen(backlog)`，失败则关闭该套接字并继续；
///   4. 应用 [`ListenConfig::listener_options`]，失败同样视为该候选失败。
///
/// ## 契约（What）
/// - 部分成功（例如只有 IPv6 成功）不是错误；
/// - 成功数为零时返回 [`AnetError::NoListener`]，其文本为最后一次记录的诊断；
/// - 未返回给调用方的套接字都已关闭。
pub fn listen_with_config(
    bind_addr: Option<&str>,
    service: &str,
    config: &ListenConfig,
) -> Result<Vec<TcpSocket>, AnetError> {
    if config.max_listeners() == 0 {
        return Err(AnetError::NoListener {
            attempts: 0,
            last: None,
        });
    }

    let candidates = resolve(bind_addr, service, Intent::Passive)?;
    let mut listeners = Vec::with_capacity(config.max_listeners().min(candidates.len()));
    let mut attempts = 0;
    let mut last = None;
    for candidate in &candidates {
        if listeners.len() >= config.max_listeners() {
            break;
        }
        attempts += 1;
        match bind_candidate(candidate, config) {
            Ok(socket) => {
                debug!(addr = %candidate.addr(), backlog = config.backlog(), "listening");
                listeners.push(socket);
            }
            Err(err) => {
                debug!(addr = %candidate.addr(), error = %err, "listen candidate failed");
                last = Some(Box::new(err));
            }
        }
    }

    if listeners.is_empty() {
        return Err(AnetError::NoListener { attempts, last });
    }
    Ok(listeners)
}

fn bind_candidate(candidate: &Candidate, config: &ListenConfig) -> Result<TcpSocket, AnetError> {
    let socket = create_socket(candidate.domain())?;
    if candidate.is_ipv6()
        && config.v6_only()
        && let Err(err) = socket.as_socket().set_only_v6(true)
    {
        warn!(addr = %candidate.addr(), error = %err, "IPV6_V6ONLY not applied");
    }
    if let Err(err) = socket.bind_and_listen(candidate.addr(), config.backlog()) {
        socket.close();
        return Err(err);
    }
    if let Err(err) = config.listener_options().apply(&socket) {
        socket.close();
        return Err(err);
    }
    Ok(socket)
}

/// 接受一个入站连接。
///
/// 被信号打断（`EINTR`）时透明地无限重试，这是本层唯一自动重试的情形；其他失败
/// 立即返回 [`AnetError::Accept`]。对端地址只用于日志，不返回给调用方。
pub fn accept(listener: &TcpSocket) -> Result<TcpSocket, AnetError> {
    loop {
        match listener.as_socket().accept() {
            Ok((socket, peer)) => {
                debug!(peer = ?peer.as_socket(), "accepted connection");
                return Ok(TcpSocket::from(socket));
            }
            Err(err) if SocketErrorKind::classify(&err) == SocketErrorKind::Interrupted => {
                trace!("accept interrupted by signal, retrying");
            }
            Err(source) => return Err(AnetError::Accept { source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SocketOptions, connect::connect};
    use std::net::{SocketAddr, TcpListener as StdListener};
    use tracing_test::traced_test;

    #[test]
    fn loopback_listener_accepts_connections() {
        let mut listeners = listen(Some("127.0.0.1"), "0", 4).expect("listen");
        assert_eq!(listeners.len(), 1);
        let listener = listeners.remove(0);
        let addr = listener.local_addr().expect("local addr");

        let client = connect("127.0.0.1", &addr.port().to_string()).expect("connect");
        let server = accept(&listener).expect("accept");
        assert_eq!(server.peer_addr().expect("peer"), client.local_addr().expect("local"));
    }

    // Windows 上 SO_REUSEADDR 允许抢占已监听端口。
    #[cfg(unix)]
    #[test]
    #[traced_test]
    fn occupied_port_yields_no_listener() {
        let holder = StdListener::bind("127.0.0.1:0").expect("hold port");
        let port = holder.local_addr().expect("addr").port().to_string();

        let err = listen(Some("127.0.0.1"), &port, 2).expect_err("port is taken");
        assert!(matches!(err, AnetError::NoListener { attempts: 1, .. }));
        assert!(err.to_string().starts_with("bind: "), "{err}");
        assert!(logs_contain("listen candidate failed"));
    }

    #[test]
    fn zero_capacity_creates_nothing() {
        let err = listen(None, "0", 0).expect_err("no capacity");
        assert!(matches!(err, AnetError::NoListener { attempts: 0, .. }));
    }

    #[test]
    fn listen_into_fills_slots_up_to_capacity() {
        let mut slots: [Option<TcpSocket>; 1] = [None];
        let count = listen_into(None, "0", &mut slots).expect("listen");
        assert_eq!(count, 1);
        assert!(slots[0].is_some());
    }

    #[test]
    fn listener_options_are_applied() {
        let config = ListenConfig::default()
            .with_max_listeners(1)
            .with_listener_options(SocketOptions::new().with_nonblocking(true));
        let listeners = listen_with_config(Some("127.0.0.1"), "0", &config).expect("listen");

        // 非阻塞监听套接字在没有待接受连接时立即返回 WouldBlock。
        let err = accept(&listeners[0]).expect_err("nothing pending");
        assert!(matches!(err, AnetError::Accept { .. }));
        assert_eq!(
            err.os_error().map(SocketErrorKind::classify),
            Some(SocketErrorKind::WouldBlock)
        );
    }

    #[test]
    fn ipv6_listener_is_v6_only() {
        let Ok(listeners) = listen(Some("::1"), "0", 1) else {
            // 宿主未启用 IPv6。
            return;
        };
        let listener = &listeners[0];
        assert!(listener.as_socket().only_v6().expect("query IPV6_V6ONLY"));
        assert!(matches!(listener.local_addr(), Ok(SocketAddr::V6(_))));
    }
}
