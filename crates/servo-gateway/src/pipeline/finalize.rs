//! Response finalizer: status and representation of the terminal state.

use super::Pipeline;
use crate::domain::content::ContentClass;
use crate::domain::context::{Phase, RequestContext};
use crate::domain::error::{reason_phrase, ApiError};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use servo_storage::ItemValue;
use tracing::{debug, error};

impl Pipeline {
    /// Turn the terminal context into a response. Storage is released first.
    pub(crate) fn finalize(&self, ctx: &mut RequestContext) -> Response {
        ctx.db.reset();

        let mut response = match ctx.phase {
            Phase::Error => error_response(ctx),
            _ => done_response(ctx),
        };

        response
            .headers_mut()
            .extend(std::mem::take(&mut ctx.response_headers));

        debug!(
            client = ctx.client_id(),
            key = %ctx.key,
            status = response.status().as_u16(),
            "Request finished"
        );
        response
    }
}

fn error_response(ctx: &RequestContext) -> Response {
    let status = ctx.status;

    if let Some(driver) = ctx.driver_error.as_deref() {
        error!(
            client = ctx.client_id(),
            key = %ctx.key,
            status = status.as_u16(),
            driver_error = driver,
            "Request failed in storage"
        );
    }

    if status.is_redirection() {
        return (status, reason_phrase(status)).into_response();
    }

    let err = if status.as_u16() < 400 {
        ApiError::internal()
    } else {
        ctx.error()
    };
    (err.status, Json(err)).into_response()
}

fn done_response(ctx: &mut RequestContext) -> Response {
    if let Some(rendered) = ctx.rendered.take() {
        return rendered;
    }
    if !ctx.is_item_request() {
        return forbidden();
    }

    match ctx.method {
        Method::POST => status_text(StatusCode::CREATED, ctx.out_content),
        Method::PUT | Method::DELETE => status_text(StatusCode::OK, ctx.out_content),
        Method::GET => match ctx.value.take() {
            Some(value) => {
                let out = ctx
                    .out_content
                    .unwrap_or_else(|| ContentClass::default_output(&value));
                render_value(value, out)
            }
            None => forbidden(),
        },
        _ => forbidden(),
    }
}

fn forbidden() -> Response {
    let err = ApiError::from_status(StatusCode::FORBIDDEN);
    (err.status, Json(err)).into_response()
}

/// Write acknowledgement: `{code, message}` for JSON clients, the reason
/// phrase otherwise.
fn status_text(status: StatusCode, out: Option<ContentClass>) -> Response {
    if out == Some(ContentClass::Json) {
        let body = ApiError::from_status(status);
        return (status, Json(body)).into_response();
    }
    (
        status,
        [(header::CONTENT_TYPE, ContentClass::String.mime())],
        reason_phrase(status),
    )
        .into_response()
}

/// Serialize a stored value as `out`.
pub(crate) fn render_value(value: ItemValue, out: ContentClass) -> Response {
    let body: Vec<u8> = match (value, out) {
        (ItemValue::String(s), ContentClass::Json) => match serde_json::to_vec(&s) {
            Ok(encoded) => encoded,
            Err(_) => return internal(),
        },
        (ItemValue::String(s), ContentClass::Base64) => STANDARD.encode(s).into_bytes(),
        (ItemValue::String(s), _) => s.into_bytes(),

        (ItemValue::Json(v), ContentClass::Json) => match serde_json::to_vec_pretty(&v) {
            Ok(encoded) => encoded,
            Err(_) => return internal(),
        },
        (ItemValue::Json(v), ContentClass::Base64) => STANDARD.encode(v.to_string()).into_bytes(),
        (ItemValue::Json(v), _) => v.to_string().into_bytes(),

        (ItemValue::Blob(b), ContentClass::Base64) => STANDARD.encode(b).into_bytes(),
        (ItemValue::Blob(b), ContentClass::Blob) => b,
        (ItemValue::Blob(_), other) => {
            debug!(requested = other.name(), "Blob cannot be rendered as text");
            return forbidden();
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, out.mime())],
        body,
    )
        .into_response()
}

fn internal() -> Response {
    let err = ApiError::internal();
    (err.status, Json(err)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};

    async fn body_of(resp: Response) -> (StatusCode, String, Vec<u8>) {
        let status = resp.status();
        let mime = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, mime, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_string_renderings() {
        let v = || ItemValue::String("hi".into());

        let (_, mime, body) = body_of(render_value(v(), ContentClass::String)).await;
        assert_eq!(body, b"hi");
        assert!(mime.starts_with("text/plain"));

        let (_, mime, body) = body_of(render_value(v(), ContentClass::Html)).await;
        assert_eq!(body, b"hi");
        assert!(mime.starts_with("text/html"));

        let (_, _, body) = body_of(render_value(v(), ContentClass::Json)).await;
        assert_eq!(body, b"\"hi\"");

        let (_, _, body) = body_of(render_value(v(), ContentClass::Base64)).await;
        assert_eq!(body, b"aGk=");

        let (_, mime, body) = body_of(render_value(v(), ContentClass::Blob)).await;
        assert_eq!(body, b"hi");
        assert_eq!(mime, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_json_renderings() {
        let v = || ItemValue::Json(serde_json::json!({"a": 1}));

        let (_, _, body) = body_of(render_value(v(), ContentClass::String)).await;
        assert_eq!(body, br#"{"a":1}"#);

        let (_, mime, body) = body_of(render_value(v(), ContentClass::Json)).await;
        assert_eq!(mime, "application/json");
        assert_eq!(String::from_utf8(body).unwrap(), "{\n  \"a\": 1\n}");

        let (_, _, body) = body_of(render_value(v(), ContentClass::Base64)).await;
        assert_eq!(body, STANDARD.encode(r#"{"a":1}"#).into_bytes());
    }

    #[tokio::test]
    async fn test_blob_renderings() {
        let v = || ItemValue::Blob(vec![0, 1, 2]);

        let (status, _, body) = body_of(render_value(v(), ContentClass::Base64)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"AAEC");

        let (_, _, body) = body_of(render_value(v(), ContentClass::Blob)).await;
        assert_eq!(body, vec![0, 1, 2]);

        for out in [ContentClass::String, ContentClass::Html, ContentClass::Json] {
            let (status, _, _) = body_of(render_value(v(), out)).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_write_acknowledgement() {
        let (status, _, body) = body_of(status_text(StatusCode::CREATED, None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, b"Created");

        let (_, mime, body) =
            body_of(status_text(StatusCode::OK, Some(ContentClass::Json))).await;
        assert_eq!(mime, "application/json");
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"code": 200, "message": "OK"}));
    }

    #[tokio::test]
    async fn test_redirect_status_is_plain() {
        let mut ctx = RequestContext::new(
            axum::http::Request::get("/k").body(Body::empty()).unwrap(),
        );
        ctx.phase = Phase::Error;
        ctx.status = StatusCode::FOUND;

        let (status, _, body) = body_of(error_response(&ctx)).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(body, b"Found");
    }

    #[tokio::test]
    async fn test_error_with_success_status_becomes_500() {
        let mut ctx = RequestContext::new(
            axum::http::Request::get("/k").body(Body::empty()).unwrap(),
        );
        ctx.phase = Phase::Error;

        let (status, _, body) = body_of(error_response(&ctx)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 500);
    }
}
