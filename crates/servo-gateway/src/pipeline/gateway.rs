//! Async storage gateway: the connect / issue / wait cycle shared by the
//! session and item phases.

use super::Pipeline;
use crate::domain::context::{DbHandle, Phase, RequestContext};
use crate::domain::error::ErrorKind;
use futures::FutureExt;
use servo_storage::{Operation, QueryResult};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, warn};

impl Pipeline {
    /// Check out a connection.
    ///
    /// An unavailable store is retried: the request sleeps for
    /// `timeouts.connect_retry` and resumes at `retry`, until
    /// `timeouts.connect` has elapsed since the first attempt.
    pub(crate) async fn connect(
        &self,
        ctx: &mut RequestContext,
        retry: Phase,
        next: Phase,
    ) -> Phase {
        ctx.db.reset();
        let started = *ctx.connect_started.get_or_insert_with(Instant::now);

        match self.store.connect().await {
            Ok(conn) => {
                ctx.connect_started = None;
                ctx.db = DbHandle::Connected(conn);
                next
            }
            Err(err) if err.is_retryable() => {
                if started.elapsed() >= self.config.timeouts.connect {
                    warn!(
                        client = ctx.client_id(),
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Store still unavailable, giving up"
                    );
                    ctx.connect_started = None;
                    return ctx.fail_storage(err);
                }
                debug!(phase = %retry, error = %err, "Store not ready, retrying");
                sleep(self.config.timeouts.connect_retry).await;
                retry
            }
            Err(err) => {
                error!(phase = %retry, error = %err, "Store connect failed");
                ctx.fail_storage(err)
            }
        }
    }

    /// Move the held connection into an in-flight operation.
    pub(crate) fn issue(&self, ctx: &mut RequestContext, op: Operation, wait: Phase) -> Phase {
        let Some(mut conn) = ctx.db.take_connection() else {
            error!(role = op.role(), db = ctx.db.state_name(), "No connection to issue on");
            return ctx.fail_kind(ErrorKind::InternalFailure);
        };

        debug!(role = op.role(), client = ctx.client_id(), "Issuing storage operation");
        ctx.db = DbHandle::InFlight(
            async move {
                let result = conn.execute(op).await;
                (conn, result)
            }
            .boxed(),
        );
        wait
    }

    /// Await the in-flight operation, bounded by `timeouts.storage_wait`.
    ///
    /// Rows go to `read` and stay on the handle until taken. A finished
    /// write, or rows already taken, go to `success`.
    pub(crate) async fn wait(&self, ctx: &mut RequestContext, read: Phase, success: Phase) -> Phase {
        match std::mem::take(&mut ctx.db) {
            DbHandle::InFlight(in_flight) => {
                match timeout(self.config.timeouts.storage_wait, in_flight).await {
                    Ok((conn, Ok(QueryResult::Rows(rows)))) => {
                        debug!(rows = rows.len(), "Storage rows ready");
                        ctx.db = DbHandle::Ready { conn, rows };
                        read
                    }
                    Ok((conn, Ok(QueryResult::Complete { rows_affected }))) => {
                        debug!(rows_affected, "Storage operation complete");
                        ctx.db = DbHandle::Drained(conn);
                        success
                    }
                    Ok((conn, Err(err))) => {
                        warn!(client = ctx.client_id(), error = %err, "Storage operation failed");
                        ctx.db = DbHandle::Drained(conn);
                        ctx.fail_storage(err)
                    }
                    Err(_) => {
                        warn!(
                            client = ctx.client_id(),
                            timeout_ms = self.config.timeouts.storage_wait.as_millis() as u64,
                            "Storage operation timed out"
                        );
                        ctx.fail_kind(ErrorKind::Timeout)
                    }
                }
            }
            ready @ DbHandle::Ready { .. } => {
                ctx.db = ready;
                read
            }
            held @ (DbHandle::Drained(_) | DbHandle::Connected(_)) => {
                ctx.db = held;
                success
            }
            DbHandle::Idle => {
                error!("Wait without an issued operation");
                ctx.fail_kind(ErrorKind::InternalFailure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ServoConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use servo_storage::{InMemoryStore, Row, Session};
    use std::sync::Arc;
    use std::time::Duration;

    fn setup(config: ServoConfig) -> (Pipeline, InMemoryStore, RequestContext) {
        let store = InMemoryStore::new();
        let pipeline = Pipeline::new(Arc::new(config), Arc::new(store.clone()));
        let mut ctx = RequestContext::new(Request::get("/k").body(Body::empty()).unwrap());
        ctx.resolve_client("c1");
        (pipeline, store, ctx)
    }

    #[tokio::test]
    async fn test_connect_issue_wait_read() {
        let (pipeline, store, mut ctx) = setup(ServoConfig::default());
        store.insert_session(Session::new("c1", 500));

        assert_eq!(
            pipeline.connect(&mut ctx, Phase::SessionConnect, Phase::SessionQuery).await,
            Phase::SessionQuery
        );
        let op = Operation::QuerySession { client: "c1".into() };
        assert_eq!(pipeline.issue(&mut ctx, op, Phase::SessionWait), Phase::SessionWait);
        assert_eq!(
            pipeline.wait(&mut ctx, Phase::SessionRead, Phase::SessionReady).await,
            Phase::SessionRead
        );

        let rows = ctx.db.take_rows().unwrap();
        assert_eq!(rows, vec![Row::Session(Session::new("c1", 500))]);
        // rows consumed: the next wait reports completion
        assert_eq!(
            pipeline.wait(&mut ctx, Phase::SessionRead, Phase::SessionReady).await,
            Phase::SessionReady
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_then_gives_up() {
        let mut config = ServoConfig::default();
        config.timeouts.connect = Duration::from_millis(300);
        config.timeouts.connect_retry = Duration::from_millis(100);
        let (pipeline, store, mut ctx) = setup(config);
        store.fail_next_connects(100);

        let mut attempts = 0;
        let mut phase = Phase::ItemConnect;
        while phase == Phase::ItemConnect {
            attempts += 1;
            phase = pipeline.connect(&mut ctx, Phase::ItemConnect, Phase::ItemQuery).await;
        }
        assert_eq!(phase, Phase::Error);
        assert_eq!(ctx.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(attempts >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_recovers() {
        let (pipeline, store, mut ctx) = setup(ServoConfig::default());
        store.fail_next_connects(2);

        assert_eq!(
            pipeline.connect(&mut ctx, Phase::ItemConnect, Phase::ItemQuery).await,
            Phase::ItemConnect
        );
        assert_eq!(
            pipeline.connect(&mut ctx, Phase::ItemConnect, Phase::ItemQuery).await,
            Phase::ItemConnect
        );
        assert_eq!(
            pipeline.connect(&mut ctx, Phase::ItemConnect, Phase::ItemQuery).await,
            Phase::ItemQuery
        );
        assert!(ctx.connect_started.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_bounded() {
        let mut config = ServoConfig::default();
        config.timeouts.storage_wait = Duration::from_millis(50);
        let (pipeline, store, mut ctx) = setup(config);
        store.set_query_delay(Some(Duration::from_secs(5)));

        pipeline.connect(&mut ctx, Phase::ItemConnect, Phase::ItemQuery).await;
        let op = Operation::GetItem {
            client: "c1".into(),
            key: "k".into(),
        };
        pipeline.issue(&mut ctx, op, Phase::ItemWait);
        assert_eq!(
            pipeline.wait(&mut ctx, Phase::ItemRead, Phase::Done).await,
            Phase::Error
        );
        assert_eq!(ctx.status, StatusCode::GATEWAY_TIMEOUT);
        assert!(ctx.db.is_idle());
    }

    #[tokio::test]
    async fn test_query_failure_is_500_with_driver_text() {
        let (pipeline, store, mut ctx) = setup(ServoConfig::default());
        store.fail_next_queries(1);

        pipeline.connect(&mut ctx, Phase::ItemConnect, Phase::ItemQuery).await;
        let op = Operation::DeleteItem {
            client: "c1".into(),
            key: "k".into(),
        };
        pipeline.issue(&mut ctx, op, Phase::ItemWait);
        assert_eq!(
            pipeline.wait(&mut ctx, Phase::ItemRead, Phase::Done).await,
            Phase::Error
        );
        assert_eq!(ctx.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(ctx.driver_error.as_deref().unwrap().contains("injected"));
    }

    #[test]
    fn test_issue_without_connection() {
        let (pipeline, _store, mut ctx) = setup(ServoConfig::default());
        let op = Operation::QuerySession { client: "c1".into() };
        assert_eq!(pipeline.issue(&mut ctx, op, Phase::SessionWait), Phase::Error);
        assert_eq!(ctx.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
