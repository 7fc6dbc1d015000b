use std::net::SocketAddr;
use std::slice;

use socket2::Domain;
use tracing::trace;

use crate::{error::AnetError, platform};

/// 解析意图：决定缺省主机展开为回环还是通配地址。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    /// 主动建连。
    Active,
    /// 被动监听（`AI_PASSIVE`），`host = None` 表示所有网卡。
    Passive,
}

/// 一个候选地址：地址、端口与其所属协议族。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    addr: SocketAddr,
}

impl Candidate {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 创建套接字时使用的协议族。
    pub fn domain(&self) -> Domain {
        Domain::for_address(self.addr)
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }
}

/// 一次解析产出的有序候选列表。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 建连与监听都按“逐个尝试候选”推进，列表顺序直接决定尝试顺序；
///
/// ## 契约 (What)
/// - 顺序即系统解析器给出的顺序（通常 IPv4/IPv6 交错），本层不做任何重排或偏好；
/// - 构造后不可变，随迭代结束一并释放；
/// - 由 [`resolve`] 构造时保证非空。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
}

impl CandidateList {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a Candidate;
    type IntoIter = slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for CandidateList {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

/// 将主机/服务解析为候选地址列表。
///
/// - `host`：主机名或数字地址；`None` 在 [`Intent::Passive`] 下表示通配地址；
/// - `service`：数字端口或（unix 下）服务名，例如 `"http"`；
/// - 失败返回 [`AnetError::Resolution`]，携带解析器原始诊断；解析结果为空同样视为失败。
pub fn resolve(
    host: Option<&str>,
    service: &str,
    intent: Intent,
) -> Result<CandidateList, AnetError> {
    let addrs = platform::lookup(host, service, intent == Intent::Passive)
        .map_err(|reason| AnetError::resolution(host, reason))?;
    if addrs.is_empty() {
        return Err(AnetError::resolution(host, "no usable stream addresses"));
    }
    trace!(
        host = host.unwrap_or("*"),
        service,
        ?intent,
        candidates = ?addrs,
        "resolved address candidates"
    );
    Ok(CandidateList {
        candidates: addrs.into_iter().map(|addr| Candidate { addr }).collect(),
    })
}
