//! Origin and client address filtering.
//!
//! Rejects requests before any session or storage work:
//! item requests must come from the allow-listed `Origin` (when one is
//! configured) and every request must come from the allow-listed client
//! address (when one is configured).

use super::client_ip::ClientAddr;
use crate::domain::config::AccessConfig;
use crate::domain::error::ApiError;
use axum::{
    body::Body,
    http::{header, Request},
    response::{IntoResponse, Response},
    Json,
};
use std::net::IpAddr;
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::info;

/// Access filter policy
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    /// Required `Origin` for item requests
    pub allow_origin: Option<String>,
    /// Required client address
    pub allow_ipaddr: Option<IpAddr>,
    /// Public mode: a missing `Origin` is accepted
    pub public_mode: bool,
}

impl AccessPolicy {
    pub fn new(access: &AccessConfig, public_mode: bool) -> Self {
        Self {
            allow_origin: access.allow_origin.clone(),
            allow_ipaddr: access.allow_ipaddr,
            public_mode,
        }
    }

    /// Check a request. `Err` carries the rejection.
    pub fn check<B>(&self, req: &Request<B>) -> Result<(), ApiError> {
        let is_item_request = req.uri().path().len() > 1;

        if let (Some(allowed), true) = (&self.allow_origin, is_item_request) {
            match req.headers().get(header::ORIGIN) {
                None if !self.public_mode => {
                    info!(path = req.uri().path(), "Access denied: no Origin header");
                    return Err(ApiError::policy_denied("'Origin' header is not found"));
                }
                None => {}
                Some(origin) if origin.as_bytes() != allowed.as_bytes() => {
                    info!(origin = ?origin, allowed = %allowed, "Access denied: Origin mismatch");
                    return Err(ApiError::policy_denied("Origin Access Denied"));
                }
                Some(_) => {}
            }
        }

        if let Some(allowed) = self.allow_ipaddr {
            let client = req.extensions().get::<ClientAddr>().map(|c| c.0);
            if client != Some(allowed) {
                info!(client = ?client, allowed = %allowed, "Access denied: client address mismatch");
                return Err(ApiError::policy_denied("Client Access Denied"));
            }
        }

        Ok(())
    }
}

/// Access filter layer
#[derive(Clone)]
pub struct AccessLayer {
    policy: Arc<AccessPolicy>,
}

impl AccessLayer {
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for AccessLayer {
    type Service = AccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessService {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

/// Access filter service
#[derive(Clone)]
pub struct AccessService<S> {
    inner: S,
    policy: Arc<AccessPolicy>,
}

impl<S> Service<Request<Body>> for AccessService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let policy = Arc::clone(&self.policy);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Err(rejection) = policy.check(&req) {
                return Ok((rejection.status, Json(rejection)).into_response());
            }
            inner.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::net::Ipv4Addr;

    fn request(path: &str, origin: Option<&str>, client: Option<IpAddr>) -> Request<()> {
        let mut builder = Request::builder().uri(path);
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        let mut req = builder.body(()).unwrap();
        if let Some(ip) = client {
            req.extensions_mut().insert(ClientAddr(ip));
        }
        req
    }

    fn origin_policy(public_mode: bool) -> AccessPolicy {
        AccessPolicy {
            allow_origin: Some("https://example.com".into()),
            allow_ipaddr: None,
            public_mode,
        }
    }

    #[test]
    fn test_no_policy_allows_everything() {
        let policy = AccessPolicy::default();
        assert!(policy.check(&request("/item", None, None)).is_ok());
    }

    #[test]
    fn test_missing_origin_denied() {
        let err = origin_policy(false)
            .check(&request("/item", None, None))
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "'Origin' header is not found");
    }

    #[test]
    fn test_missing_origin_allowed_in_public_mode() {
        assert!(origin_policy(true).check(&request("/item", None, None)).is_ok());
    }

    #[test]
    fn test_origin_mismatch_denied_even_in_public_mode() {
        let err = origin_policy(true)
            .check(&request("/item", Some("https://evil.example"), None))
            .unwrap_err();
        assert_eq!(err.message, "Origin Access Denied");
    }

    #[test]
    fn test_matching_origin_allowed() {
        assert!(origin_policy(false)
            .check(&request("/item", Some("https://example.com"), None))
            .is_ok());
    }

    #[test]
    fn test_root_skips_origin_check() {
        assert!(origin_policy(false).check(&request("/", None, None)).is_ok());
    }

    #[test]
    fn test_client_address_filter() {
        let allowed = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1));
        let policy = AccessPolicy {
            allow_ipaddr: Some(allowed),
            ..Default::default()
        };
        assert!(policy.check(&request("/", None, Some(allowed))).is_ok());

        let err = policy
            .check(&request("/", None, Some(IpAddr::V4(Ipv4Addr::LOCALHOST))))
            .unwrap_err();
        assert_eq!(err.message, "Client Access Denied");
        assert!(policy.check(&request("/", None, None)).is_err());
    }
}
