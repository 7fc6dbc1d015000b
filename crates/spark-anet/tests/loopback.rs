//! 环回网卡上的端到端行为：解析回退、多族监听、端口冲突与写回退。

use std::net::{SocketAddr, TcpListener as StdListener};
use std::thread;

use spark_anet::{
    AnetError, SocketErrorKind, SocketOptions, TcpSocket, accept, close, connect, listen,
    listen_into, read, write,
};

fn read_exact(socket: &TcpSocket, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 64 * 1024];
    while out.len() < len {
        let n = read(socket, &mut buf).expect("read");
        assert_ne!(n, 0, "peer closed after {} of {len} bytes", out.len());
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn port_of(socket: &TcpSocket) -> String {
    socket.local_addr().expect("local addr").port().to_string()
}

#[test]
fn hostname_connect_falls_back_across_candidates() {
    let listeners = listen(Some("127.0.0.1"), "0", 1).expect("listen");
    let port = port_of(&listeners[0]);

    // `localhost` 常先解析出 `::1`，该候选被拒后应回退到 127.0.0.1。
    let client = connect("localhost", &port).expect("connect via hostname");
    let server = accept(&listeners[0]).expect("accept");

    assert_eq!(write(&client, b"ping").expect("write"), 4);
    assert_eq!(read_exact(&server, 4), b"ping");
    close(client);
}

#[test]
fn wildcard_listen_covers_each_family_once() {
    let listeners = listen(None, "0", 2).expect("listen");
    assert!(!listeners.is_empty() && listeners.len() <= 2);

    let families: Vec<bool> = listeners
        .iter()
        .map(|l| l.local_addr().expect("local addr").is_ipv6())
        .collect();
    if families.len() == 2 {
        assert_ne!(families[0], families[1], "one listener per family");
    }

    for listener in &listeners {
        let host = match listener.local_addr().expect("local addr") {
            SocketAddr::V4(_) => "127.0.0.1",
            SocketAddr::V6(_) => "::1",
        };
        let Ok(client) = connect(host, &port_of(listener)) else {
            // 宿主允许绑定 `::` 却没有配置 `::1` 时跳过。
            continue;
        };
        let server = accept(listener).expect("accept");
        assert_eq!(
            server.peer_addr().expect("peer"),
            client.local_addr().expect("local")
        );
    }
}

// 同一端口上 IPv4 与 IPv6 通配监听共存依赖 `IPV6_V6ONLY`。
#[cfg(unix)]
#[test]
fn wildcard_listen_shares_one_port_across_families() {
    let Ok(reserved) = StdListener::bind("[::]:0") else {
        // 宿主未启用 IPv6。
        return;
    };
    let port = reserved.local_addr().expect("reserved addr").port();
    drop(reserved);

    let listeners = listen(None, &port.to_string(), 2).expect("listen");
    assert_eq!(listeners.len(), 2, "one listener per family");
    let addrs: Vec<SocketAddr> = listeners
        .iter()
        .map(|l| l.local_addr().expect("local addr"))
        .collect();
    assert_ne!(addrs[0].is_ipv6(), addrs[1].is_ipv6());
    assert!(addrs.iter().all(|addr| addr.port() == port));
    assert!(addrs.iter().all(|addr| addr.ip().is_unspecified()));

    let err = listen(None, &port.to_string(), 2).expect_err("port already held");
    assert!(matches!(err, AnetError::NoListener { attempts: 2, .. }));
    assert!(err.to_string().starts_with("bind: "), "{err}");
}

// Windows 上 SO_REUSEADDR 允许抢占已监听端口。
#[cfg(unix)]
#[test]
fn occupied_port_leaves_slots_empty() {
    let holder = StdListener::bind("127.0.0.1:0").expect("hold port");
    let port = holder.local_addr().expect("addr").port().to_string();

    let mut slots: [Option<TcpSocket>; 2] = [None, None];
    let err = listen_into(Some("127.0.0.1"), &port, &mut slots).expect_err("port is taken");

    assert!(matches!(err, AnetError::NoListener { .. }));
    assert_eq!(err.code(), "spark.anet.no_listener");
    assert!(err.to_string().starts_with("bind: "), "{err}");
    assert!(slots.iter().all(Option::is_none));
}

#[test]
fn nonblocking_write_falls_back_and_restores_mode() {
    const PAYLOAD: usize = 4 * 1024 * 1024;

    let listeners = listen(Some("127.0.0.1"), "0", 1).expect("listen");
    let client = connect("127.0.0.1", &port_of(&listeners[0])).expect("connect");
    let server = accept(&listeners[0]).expect("accept");

    SocketOptions::new()
        .with_send_buffer_size(Some(4096))
        .with_nonblocking(true)
        .apply(&client)
        .expect("apply options");

    // 读端把套接字交还主线程，避免提前关闭触发对端 RST。
    let reader = thread::spawn(move || {
        let data = read_exact(&server, PAYLOAD);
        (data, server)
    });

    let payload: Vec<u8> = (0..PAYLOAD).map(|i| (i % 251) as u8).collect();
    assert_eq!(write(&client, &payload).expect("write"), PAYLOAD);

    let (received, _server) = reader.join().expect("reader thread");
    assert!(received == payload, "payload corrupted in transit");

    #[cfg(unix)]
    assert_eq!(client.is_nonblocking().expect("query"), Some(true));
    let err = read(&client, &mut [0u8; 16]).expect_err("no inbound data");
    assert_eq!(
        err.os_error().map(SocketErrorKind::classify),
        Some(SocketErrorKind::WouldBlock)
    );
}

#[test]
fn echo_round_trip_then_orderly_close() {
    let listeners = listen(Some("127.0.0.1"), "0", 1).expect("listen");
    let client = connect("127.0.0.1", &port_of(&listeners[0])).expect("connect");
    client.set_nodelay().expect("TCP_NODELAY");
    let server = listeners[0].accept().expect("accept");

    let echo = thread::spawn(move || {
        let mut buf = [0u8; 256];
        loop {
            let n = server.read(&mut buf).expect("server read");
            if n == 0 {
                break;
            }
            server.write(&buf[..n]).expect("server write");
        }
        server.close();
    });

    for message in [&b"hello"[..], b"spark", b"anet"] {
        assert_eq!(client.write(message).expect("write"), message.len());
        assert_eq!(read_exact(&client, message.len()), message);
    }
    client
        .as_socket()
        .shutdown(std::net::Shutdown::Write)
        .expect("half close");
    echo.join().expect("echo thread");

    let mut tail = [0u8; 1];
    assert_eq!(client.read(&mut tail).expect("read eof"), 0);
}
