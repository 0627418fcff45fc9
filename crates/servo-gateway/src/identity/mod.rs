//! Client identity resolution.
//!
//! A request is bound to a client id taken from, in order: a verified
//! bearer token, the `X-Servo-Client` header, the `Servo-Client` cookie.
//! Requests carrying none of these get a fresh anonymous identity whose
//! session row is written before the session cycle starts.

pub mod token;

pub use token::{Claims, Hs256Tokens, TokenAuthority, TokenError};

use crate::domain::context::{Phase, RequestContext};
use crate::domain::error::ApiError;
use crate::pipeline::Pipeline;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use servo_storage::{Operation, Session, StorageError};
use tracing::{debug, error, info, warn};

/// Identity header, request and response.
pub const CLIENT_HEADER: HeaderName = HeaderName::from_static("x-servo-client");

/// Identity cookie name.
pub const CLIENT_COOKIE: &str = "Servo-Client";

/// Longest accepted client id, in bytes.
pub const MAX_CLIENT_ID_LEN: usize = 255;

/// Where a client id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Token,
    Header,
    Cookie,
}

/// Find the client id carried by a request.
///
/// Tokens are consulted only when `tokens` is set. A token that fails
/// verification is skipped; a verified token without a subject is an error.
pub fn client_from_headers(
    headers: &HeaderMap,
    tokens: Option<&dyn TokenAuthority>,
) -> Result<Option<(String, IdentitySource)>, ApiError> {
    if let (Some(tokens), Some(bearer)) = (tokens, bearer_token(headers)) {
        match tokens.verify(bearer) {
            Ok(claims) => match claims.sub {
                Some(sub) => return Ok(Some((sub, IdentitySource::Token))),
                None => {
                    error!("Verified token carries no subject");
                    return Err(ApiError::internal());
                }
            },
            Err(e) => warn!(error = %e, "Ignoring bearer token"),
        }
    }

    // an empty header falls through to the cookie
    if let Some(value) = headers.get(&CLIENT_HEADER) {
        match value.to_str() {
            Ok("") => {}
            Ok(id) => return Ok(Some((id.to_string(), IdentitySource::Header))),
            Err(_) => return Err(ApiError::bad_request("Invalid client id")),
        }
    }

    Ok(cookie_value(headers, CLIENT_COOKIE).map(|id| (id.to_string(), IdentitySource::Cookie)))
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// First non-empty value of cookie `name` across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| k.trim() == name && !v.trim().is_empty())
        .map(|(_, v)| v.trim().trim_matches('"'))
}

/// Client ids are at most 255 bytes of visible ASCII.
pub fn validate_client_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() || id.len() > MAX_CLIENT_ID_LEN {
        return Err(ApiError::bad_request("Invalid client id length"));
    }
    if !id.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ApiError::bad_request("Invalid client id"));
    }
    Ok(())
}

/// Response headers announcing the resolved identity. With `tokens`, a
/// fresh bearer token for `client` is included.
pub fn identity_headers(
    client: &str,
    tokens: Option<&dyn TokenAuthority>,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let id = HeaderValue::from_str(client).map_err(|_| ApiError::bad_request("Invalid client id"))?;
    let cookie = HeaderValue::from_str(&format!(
        "{}={}; Path=/; Secure; HttpOnly",
        CLIENT_COOKIE, client
    ))
    .map_err(|_| ApiError::bad_request("Invalid client id"))?;
    headers.insert(CLIENT_HEADER, id);
    headers.insert(header::SET_COOKIE, cookie);

    if let Some(tokens) = tokens {
        let token = tokens.issue(client).map_err(|e| {
            error!(error = %e, "Token issue failed");
            ApiError::internal()
        })?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::internal())?;
        headers.insert(header::AUTHORIZATION, value);
    }

    Ok(headers)
}

impl Pipeline {
    /// `Init`: bind the request to a client.
    pub(crate) async fn resolve_identity(&self, ctx: &mut RequestContext) -> Phase {
        let found = match client_from_headers(&ctx.headers, self.tokens()) {
            Ok(found) => found,
            Err(e) => return ctx.fail(e),
        };

        let client = match found {
            Some((client, source)) => {
                debug!(client = %client, source = ?source, "Client identified");
                client
            }
            None => {
                let client = uuid::Uuid::new_v4().to_string();
                if let Err(e) = self.create_session(&client).await {
                    error!(client = %client, error = %e, "Anonymous session creation failed");
                    ctx.driver_error = Some(e.to_string());
                    return ctx.fail(ApiError::internal());
                }
                info!(client = %client, "New anonymous client");
                client
            }
        };

        if let Err(e) = validate_client_id(&client) {
            return ctx.fail(e);
        }

        match identity_headers(&client, self.tokens()) {
            Ok(headers) => ctx.response_headers.extend(headers),
            Err(e) => return ctx.fail(e),
        }

        ctx.resolve_client(client);
        Phase::SessionConnect
    }

    /// Write the session row of a freshly synthesized client.
    async fn create_session(&self, client: &str) -> Result<(), StorageError> {
        let session = Session::starting_at(client, self.clock.now(), self.config.session.ttl);
        let mut conn = self.store.connect().await?;
        conn.execute(Operation::PutSession(session)).await?;
        Ok(())
    }
}
