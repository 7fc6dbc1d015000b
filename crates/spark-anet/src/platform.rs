//! 平台差异的收敛点：错误码分类、阻塞模式查询与系统解析器。
//!
//! 上层模块只依赖 [`SocketErrorKind`] 与本模块的 `pub(crate)` 函数，
//! 不直接比较 `errno`/`WSAGetLastError` 数值。

use std::io;
use std::net::SocketAddr;

use socket2::Socket;

/// 与套接字控制流相关的错误语义分类。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 非阻塞建连、写回退与 `accept` 重试只关心“是否应继续”，
///   而 POSIX 与 Winsock 对同一语义使用不同的错误码。
///
/// ## 契约 (What)
/// - `WouldBlock`：`EAGAIN`/`EWOULDBLOCK`/`WSAEWOULDBLOCK`；
/// - `InProgress`：`EINPROGRESS`/`WSAEINPROGRESS`；
/// - `Interrupted`：`EINTR`/`WSAEINTR`；
/// - 其余一律 `Other`；无 OS 错误码时回退到 [`io::ErrorKind`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketErrorKind {
    WouldBlock,
    InProgress,
    Interrupted,
    Other,
}

impl SocketErrorKind {
    /// 对 IO 错误进行分类。
    pub fn classify(error: &io::Error) -> Self {
        if let Some(kind) = error.raw_os_error().and_then(Self::from_raw_os_error) {
            return kind;
        }
        match error.kind() {
            io::ErrorKind::WouldBlock => SocketErrorKind::WouldBlock,
            io::ErrorKind::Interrupted => SocketErrorKind::Interrupted,
            _ => SocketErrorKind::Other,
        }
    }

    #[cfg(unix)]
    fn from_raw_os_error(code: i32) -> Option<Self> {
        if code == libc::EAGAIN || code == libc::EWOULDBLOCK {
            Some(SocketErrorKind::WouldBlock)
        } else if code == libc::EINPROGRESS {
            Some(SocketErrorKind::InProgress)
        } else if code == libc::EINTR {
            Some(SocketErrorKind::Interrupted)
        } else {
            None
        }
    }

    #[cfg(windows)]
    fn from_raw_os_error(code: i32) -> Option<Self> {
        const WSAEINTR: i32 = 10004;
        const WSAEWOULDBLOCK: i32 = 10035;
        const WSAEINPROGRESS: i32 = 10036;
        match code {
            WSAEWOULDBLOCK => Some(SocketErrorKind::WouldBlock),
            WSAEINPROGRESS => Some(SocketErrorKind::InProgress),
            WSAEINTR => Some(SocketErrorKind::Interrupted),
            _ => None,
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn from_raw_os_error(_code: i32) -> Option<Self> {
        None
    }
}

/// 查询套接字当前是否处于非阻塞模式。
///
/// Winsock 不提供查询接口，此时返回 `Ok(None)`。
#[cfg(unix)]
pub(crate) fn is_nonblocking(socket: &Socket) -> io::Result<Option<bool>> {
    socket.nonblocking().map(Some)
}

#[cfg(not(unix))]
pub(crate) fn is_nonblocking(_socket: &Socket) -> io::Result<Option<bool>> {
    Ok(None)
}

/// 调用系统解析器，按解析器给出的顺序返回流式套接字地址。
///
/// 失败时返回解析器的诊断文本。
#[cfg(unix)]
pub(crate) fn lookup(
    host: Option<&str>,
    service: &str,
    passive: bool,
) -> Result<Vec<SocketAddr>, String> {
    gai::lookup(host, service, passive)
}

#[cfg(unix)]
mod gai {
    use std::ffi::{CStr, CString};
    use std::io;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
    use std::ptr;

    /// `getaddrinfo` 结果链表的所有权守卫，离开作用域即 `freeaddrinfo`。
    struct AddrInfoList(*mut libc::addrinfo);

    impl Drop for AddrInfoList {
        fn drop(&mut self) {
            if !self.0.is_null() {
                // SAFETY: 指针来自成功的 getaddrinfo 调用且只释放一次。
                unsafe { libc::freeaddrinfo(self.0) };
            }
        }
    }

    pub(super) fn lookup(
        host: Option<&str>,
        service: &str,
        passive: bool,
    ) -> Result<Vec<SocketAddr>, String> {
        let host = host
            .map(CString::new)
            .transpose()
            .map_err(|_| "host contains NUL byte".to_owned())?;
        let service = CString::new(service).map_err(|_| "service contains NUL byte".to_owned())?;

        // SAFETY: 全零的 addrinfo 是合法的“无提示”初值。
        let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
        hints.ai_family = libc::AF_UNSPEC;
        hints.ai_socktype = libc::SOCK_STREAM;
        if passive {
            hints.ai_flags = libc::AI_PASSIVE;
        }

        let mut head: *mut libc::addrinfo = ptr::null_mut();
        // SAFETY: 所有字符串均以 NUL 结尾并存活至调用结束；head 由解析器填充。
        let rc = unsafe {
            libc::getaddrinfo(
                host.as_ref().map_or(ptr::null(), |h| h.as_ptr()),
                service.as_ptr(),
                &hints,
                &mut head,
            )
        };
        if rc != 0 {
            return Err(gai_message(rc));
        }

        let list = AddrInfoList(head);
        let mut out = Vec::new();
        let mut cursor = list.0;
        while !cursor.is_null() {
            // SAFETY: cursor 指向 list 持有的链表节点。
            let entry = unsafe { &*cursor };
            if let Some(addr) = to_socket_addr(entry) {
                out.push(addr);
            }
            cursor = entry.ai_next;
        }
        Ok(out)
    }

    fn to_socket_addr(entry: &libc::addrinfo) -> Option<SocketAddr> {
        if entry.ai_addr.is_null() {
            return None;
        }
        match entry.ai_family {
            libc::AF_INET => {
                // SAFETY: AF_INET 条目的 ai_addr 指向 sockaddr_in。
                let sin = unsafe { &*(entry.ai_addr as *const libc::sockaddr_in) };
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                Some(SocketAddr::V4(SocketAddrV4::new(
                    ip,
                    u16::from_be(sin.sin_port),
                )))
            }
            libc::AF_INET6 => {
                // SAFETY: AF_INET6 条目的 ai_addr 指向 sockaddr_in6。
                let sin6 = unsafe { &*(entry.ai_addr as *const libc::sockaddr_in6) };
                Some(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
            _ => None,
        }
    }

    fn gai_message(rc: libc::c_int) -> String {
        if rc == libc::EAI_SYSTEM {
            return io::Error::last_os_error().to_string();
        }
        // SAFETY: gai_strerror 返回静态字符串。
        unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }
            .to_string_lossy()
            .into_owned()
    }
}

/// 非 unix 目标没有可移植的 `getaddrinfo` 绑定：服务必须是数字端口，
/// 主机交给标准库解析；缺省主机按被动/主动意图展开为通配或回环地址。
#[cfg(not(unix))]
pub(crate) fn lookup(
    host: Option<&str>,
    service: &str,
    passive: bool,
) -> Result<Vec<SocketAddr>, String> {
    use std::net::{Ipv4Addr, Ipv6Addr, ToSocketAddrs};

    let port: u16 = service
        .parse()
        .map_err(|_| format!("service '{service}' is not a numeric port"))?;
    match host {
        Some(host) => (host, port)
            .to_socket_addrs()
            .map(Iterator::collect)
            .map_err(|err| err.to_string()),
        None if passive => Ok(vec![
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        ]),
        None => Ok(vec![
            SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
            SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        ]),
    }
}
