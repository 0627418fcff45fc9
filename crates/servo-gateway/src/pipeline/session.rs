//! Session lifecycle: expiry check, renewal and the store-root short-circuit.

use super::Pipeline;
use crate::console;
use crate::domain::content::accepts_html;
use crate::domain::context::{Phase, RequestContext};
use crate::domain::error::{ApiError, ErrorKind};
use axum::http::Method;
use servo_storage::{Operation, Row, Session, StorageError};
use tokio::time::timeout;
use tracing::{debug, error, info};

/// How the session row must be written.
enum SessionWrite {
    Insert,
    Replace,
}

impl Pipeline {
    /// `SessionRead`: keep a live session, otherwise write a fresh one on
    /// the held connection.
    pub(crate) async fn session_read(&self, ctx: &mut RequestContext) -> Phase {
        let Some(rows) = ctx.db.take_rows() else {
            return ctx.fail_kind(ErrorKind::InternalFailure);
        };
        let now = self.clock.now();

        let write = match rows.as_slice() {
            [] => SessionWrite::Insert,
            [Row::Session(session)] if session.is_expired(now) => {
                info!(
                    client = ctx.client_id(),
                    expired_on = session.expire_on,
                    "Session expired, renewing"
                );
                SessionWrite::Replace
            }
            [Row::Session(session)] => {
                debug!(client = ctx.client_id(), expire_on = session.expire_on, "Session live");
                ctx.session = Some(session.clone());
                return Phase::SessionWait;
            }
            other => {
                error!(
                    client = ctx.client_id(),
                    rows = other.len(),
                    "Unexpected session query result"
                );
                return ctx.fail_kind(ErrorKind::InternalFailure);
            }
        };

        let session = Session::starting_at(ctx.client_id(), now, self.config.session.ttl);
        match self.write_session(ctx, &session, write).await {
            Ok(()) => {
                ctx.session = Some(session);
                Phase::SessionWait
            }
            Err(phase) => phase,
        }
    }

    async fn write_session(
        &self,
        ctx: &mut RequestContext,
        session: &Session,
        write: SessionWrite,
    ) -> Result<(), Phase> {
        let Some(conn) = ctx.db.connection_mut() else {
            return Err(ctx.fail_kind(ErrorKind::InternalFailure));
        };

        let pending = async {
            match write {
                SessionWrite::Insert => conn
                    .execute(Operation::PutSession(session.clone()))
                    .await
                    .map(|_| ()),
                SessionWrite::Replace => conn.renew_session(session).await,
            }
        };
        let outcome = timeout(self.config.timeouts.storage_wait, pending).await;
        let result: Result<(), StorageError> = match outcome {
            Ok(result) => result,
            Err(_) => {
                ctx.db.reset();
                return Err(ctx.fail_kind(ErrorKind::Timeout));
            }
        };

        result.map_err(|err| {
            error!(client = ctx.client_id(), error = %err, "Session write failed");
            ctx.fail_storage(err)
        })
    }

    /// `SessionReady`: item requests continue to the item cycle; `GET /`
    /// renders the stats document or, in public mode, the console.
    pub(crate) fn session_ready(&self, ctx: &mut RequestContext) -> Phase {
        if ctx.is_item_request() {
            return Phase::ItemConnect;
        }
        if ctx.method != Method::GET {
            return Phase::Done;
        }

        if self.config.session.public_mode && accepts_html(&ctx.headers) {
            ctx.rendered = Some(console::page());
            return Phase::Done;
        }

        let Some(session) = ctx.session.as_ref() else {
            return ctx.fail(ApiError::internal());
        };
        match console::stats(session, self.config.session.ttl) {
            Ok(response) => {
                ctx.rendered = Some(response);
                Phase::Done
            }
            Err(e) => ctx.fail(e),
        }
    }
}
