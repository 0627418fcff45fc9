//! Item dispatch: method routing and parameter binding.

use super::{body, Pipeline};
use crate::domain::content::ContentClass;
use crate::domain::context::{Phase, RequestContext};
use crate::domain::error::{ApiError, ErrorKind};
use axum::http::Method;
use servo_storage::{Operation, Row};
use tracing::{debug, error};

impl Pipeline {
    /// `ItemQuery`: bind the request to a storage operation and issue it.
    pub(crate) async fn item_query(&self, ctx: &mut RequestContext) -> Phase {
        if ctx.key.len() > self.config.limits.max_key_length {
            return ctx.fail(ApiError::bad_request("Item key is too long"));
        }

        let client = ctx.client_id().to_string();
        let key = ctx.key.clone();

        let op = match ctx.method {
            Method::GET => Operation::GetItem { client, key },
            Method::DELETE => Operation::DeleteItem { client, key },
            Method::POST | Method::PUT => {
                let value = match body::read_value(ctx, &self.config.limits).await {
                    Ok(value) => value,
                    Err(e) => return ctx.fail(e),
                };
                debug!(
                    client = %client,
                    key = %key,
                    kind = value.kind(),
                    bytes = value.byte_len(),
                    "Item body accepted"
                );
                if ctx.method == Method::POST {
                    Operation::PostItem { client, key, value }
                } else {
                    Operation::PutItem { client, key, value }
                }
            }
            _ => {
                debug!(method = %ctx.method, "Unsupported item method");
                ctx.db.reset();
                return Phase::Done;
            }
        };

        self.issue(ctx, op, Phase::ItemWait)
    }

    /// `ItemRead`: take the item row. No row is a 404.
    pub(crate) fn item_read(&self, ctx: &mut RequestContext) -> Phase {
        let Some(rows) = ctx.db.take_rows() else {
            return ctx.fail_kind(ErrorKind::InternalFailure);
        };

        let mut rows = rows.into_iter();
        match (rows.next(), rows.next()) {
            (None, _) => ctx.fail(ApiError::not_found()),
            (Some(Row::Item(value)), None) => {
                ctx.in_content = ContentClass::of_value(&value);
                ctx.value = Some(value);
                Phase::ItemWait
            }
            (Some(first), extra) => {
                error!(
                    row = ?first,
                    extra = extra.is_some(),
                    "Unexpected item query result"
                );
                ctx.fail_kind(ErrorKind::InternalFailure)
            }
        }
    }
}
