//! Client address resolution.
//!
//! The access filter compares against the address resolved here. The socket
//! peer is authoritative unless it is a trusted proxy, in which case the
//! address is taken from `X-Forwarded-For` (counting `proxy_count` hops from
//! the right) or, failing that, `X-Real-IP`.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::domain::config::SecurityConfig;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Resolved client address, stored as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

/// Which peers may speak for the client.
#[derive(Debug, Clone)]
pub struct TrustedProxies {
    addrs: Vec<IpAddr>,
    private_ranges: bool,
    hops: usize,
}

impl TrustedProxies {
    /// Trust nobody; the peer address is always used.
    pub fn none() -> Self {
        Self {
            addrs: Vec::new(),
            private_ranges: false,
            hops: 1,
        }
    }

    pub fn trusts(&self, peer: IpAddr) -> bool {
        self.addrs.contains(&peer) || (self.private_ranges && is_private(peer))
    }

    /// Address of the client behind `peer`.
    pub fn resolve(&self, headers: &HeaderMap, peer: IpAddr) -> IpAddr {
        if !self.trusts(peer) {
            if headers.contains_key(X_FORWARDED_FOR) {
                warn!(%peer, "Ignoring X-Forwarded-For from untrusted peer");
            }
            return peer;
        }

        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| self.pick(chain));
        let real = || {
            headers
                .get(X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };

        match forwarded.or_else(real) {
            Some(ip) => {
                debug!(%peer, client = %ip, "Client address taken from proxy headers");
                ip
            }
            None => peer,
        }
    }

    /// `client, proxy1, proxy2`: our own proxies are the rightmost `hops`.
    fn pick(&self, chain: &str) -> Option<IpAddr> {
        let hops: Vec<&str> = chain.split(',').map(str::trim).collect();
        let index = hops.len().checked_sub(self.hops + 1).unwrap_or(0);
        hops.get(index)?.parse().ok()
    }
}

impl From<&SecurityConfig> for TrustedProxies {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            addrs: config.trusted_proxies.clone(),
            private_ranges: config.trust_private_ips,
            hops: config.proxy_count,
        }
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        // fc00::/7
        IpAddr::V6(v6) => (v6.octets()[0] & 0xfe) == 0xfc,
    }
}

/// Inserts [`ClientAddr`] into the request extensions.
#[derive(Clone)]
pub struct ClientIpLayer {
    proxies: Arc<TrustedProxies>,
}

impl ClientIpLayer {
    pub fn new(proxies: TrustedProxies) -> Self {
        Self {
            proxies: Arc::new(proxies),
        }
    }
}

impl<S> Layer<S> for ClientIpLayer {
    type Service = ClientIpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientIpService {
            inner,
            proxies: Arc::clone(&self.proxies),
        }
    }
}

#[derive(Clone)]
pub struct ClientIpService<S> {
    inner: S,
    proxies: Arc<TrustedProxies>,
}

impl<S> Service<Request<Body>> for ClientIpService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // in-process requests (tests, oneshot) have no peer
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let client = self.proxies.resolve(req.headers(), peer);
        req.extensions_mut().insert(ClientAddr(client));

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
