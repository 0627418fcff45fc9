//! Bounded body ingestion and decoding into an item value.

use crate::domain::config::LimitsConfig;
use crate::domain::content::ContentClass;
use crate::domain::context::RequestContext;
use crate::domain::error::ApiError;
use axum::body::{to_bytes, Body};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, Request};
use bytes::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use servo_storage::ItemValue;
use tracing::debug;

/// Body size limit for a content class.
pub(crate) fn limit_for(class: ContentClass, limits: &LimitsConfig) -> usize {
    match class {
        ContentClass::String | ContentClass::Html => limits.string_size,
        ContentClass::Json => limits.json_size,
        ContentClass::Blob | ContentClass::Base64 => limits.blob_size,
    }
}

/// Read the request body and decode it per `ctx.in_content`.
pub(crate) async fn read_value(
    ctx: &mut RequestContext,
    limits: &LimitsConfig,
) -> Result<ItemValue, ApiError> {
    let limit = limit_for(ctx.in_content, limits);

    let declared = ctx
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ApiError::too_large());
    }

    let body = ctx.body.take().unwrap_or_else(Body::empty);
    let bytes = to_bytes(body, limit).await.map_err(|e| {
        debug!(error = %e, limit, "Body rejected");
        ApiError::too_large()
    })?;

    match ctx.in_content {
        ContentClass::String | ContentClass::Html => String::from_utf8(bytes.to_vec())
            .map(ItemValue::String)
            .map_err(|_| ApiError::bad_request("Request body is not valid UTF-8")),
        ContentClass::Json => serde_json::from_slice(&bytes)
            .map(ItemValue::Json)
            .map_err(|e| ApiError::json_syntax(&e, &bytes)),
        ContentClass::Base64 => STANDARD
            .decode(bytes.trim_ascii())
            .map(ItemValue::Blob)
            .map_err(|e| ApiError::bad_request(format!("Invalid base64 body: {}", e))),
        ContentClass::Blob if is_multipart(ctx) => read_upload(ctx, bytes).await,
        ContentClass::Blob => Ok(ItemValue::Blob(bytes.to_vec())),
    }
}

fn is_multipart(ctx: &RequestContext) -> bool {
    ctx.headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/"))
}

/// The first field with a file name.
async fn read_upload(ctx: &mut RequestContext, bytes: Bytes) -> Result<ItemValue, ApiError> {
    let mut req = Request::new(Body::from(bytes));
    *req.headers_mut() = ctx.headers.clone();
    *req.extensions_mut() = std::mem::take(&mut ctx.extensions);

    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.file_name().is_some() {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            return Ok(ItemValue::Blob(data.to_vec()));
        }
    }

    Err(ApiError::bad_request("multipart request has no file field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn context(content_type: &str, body: impl Into<Body>) -> RequestContext {
        RequestContext::new(
            Request::post("/k")
                .header(header::CONTENT_TYPE, content_type)
                .body(body.into())
                .unwrap(),
        )
    }

    fn small_limits() -> LimitsConfig {
        LimitsConfig {
            string_size: 8,
            json_size: 16,
            blob_size: 32,
            max_key_length: 2048,
        }
    }

    #[tokio::test]
    async fn test_string_body() {
        let mut ctx = context("text/plain", "hello");
        let value = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap();
        assert_eq!(value, ItemValue::String("hello".into()));
    }

    #[tokio::test]
    async fn test_string_over_limit() {
        let mut ctx = context("text/plain", "123456789");
        let err = read_value(&mut ctx, &small_limits()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "Request is too large");
    }

    #[tokio::test]
    async fn test_limit_is_per_class() {
        // 12 bytes: over the string limit, within the json limit
        let mut ctx = context("application/json", r#"{"a":123456}"#);
        assert!(read_value(&mut ctx, &small_limits()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut ctx = context("text/plain", vec![0xff, 0xfe]);
        let err = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_base64_is_decoded() {
        let mut ctx = context("application/base64", "aGVsbG8=\n");
        let value = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap();
        assert_eq!(value, ItemValue::Blob(b"hello".to_vec()));

        let mut ctx = context("application/base64", "not base64!");
        let err = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_multipart_first_file_field() {
        let body = concat!(
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"note\"\r\n\r\n",
            "ignored\r\n",
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n\r\n",
            "\x01\x02\x03\r\n",
            "--XyZ--\r\n",
        );
        let mut ctx = context("multipart/form-data; boundary=XyZ", body);
        let value = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap();
        assert_eq!(value, ItemValue::Blob(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_multipart_without_file() {
        let body = concat!(
            "--XyZ\r\n",
            "Content-Disposition: form-data; name=\"note\"\r\n\r\n",
            "text only\r\n",
            "--XyZ--\r\n",
        );
        let mut ctx = context("multipart/form-data; boundary=XyZ", body);
        let err = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap_err();
        assert_eq!(err.message, "multipart request has no file field");
    }

    #[tokio::test]
    async fn test_octet_stream_is_raw_blob() {
        let mut ctx = context("application/octet-stream", vec![0u8, 159, 146, 150]);
        let value = read_value(&mut ctx, &LimitsConfig::default()).await.unwrap();
        assert_eq!(value, ItemValue::Blob(vec![0, 159, 146, 150]));
    }
}
