//! Per-request state machine.
//!
//! ```text
//! Init → SessionConnect → SessionQuery → SessionWait ⇄ SessionRead
//!      → SessionReady ─(root)→ Done
//!                     └(item)→ ItemConnect → ItemQuery → ItemWait ⇄ ItemRead → Done
//! any phase ──failure──→ Error
//! ```
//!
//! Each phase handler takes the request context and returns the next
//! phase. `Done` and `Error` hand the context to the finalizer.

mod body;
mod finalize;
mod gateway;
mod item;
mod session;

use crate::domain::config::ServoConfig;
use crate::domain::context::{Phase, RequestContext};
use crate::identity::{Hs256Tokens, TokenAuthority};
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use servo_storage::{Operation, Store, SystemTimeSource, TimeSource};
use std::sync::Arc;
use tracing::trace;

/// The request pipeline and its collaborators.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) config: Arc<ServoConfig>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn TimeSource>,
    tokens: Option<Arc<dyn TokenAuthority>>,
}

impl Pipeline {
    /// Build a pipeline on the system clock. Tokens are enabled by
    /// `auth.enabled` and signed with `auth.secret`.
    pub fn new(config: Arc<ServoConfig>, store: Arc<dyn Store>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(
        config: Arc<ServoConfig>,
        store: Arc<dyn Store>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let tokens = match (&config.auth.enabled, &config.auth.secret) {
            (true, Some(secret)) => {
                Some(Arc::new(Hs256Tokens::new(secret)) as Arc<dyn TokenAuthority>)
            }
            _ => None,
        };
        Self {
            config,
            store,
            clock,
            tokens,
        }
    }

    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    pub(crate) fn tokens(&self) -> Option<&dyn TokenAuthority> {
        self.tokens.as_deref()
    }

    /// Drive one request to its response.
    pub async fn run(&self, req: Request<Body>) -> Response {
        let mut ctx = RequestContext::new(req);

        while !ctx.phase.is_terminal() {
            let next = self.step(&mut ctx).await;
            trace!(from = %ctx.phase, to = %next, db = ctx.db.state_name(), "Phase transition");
            ctx.phase = next;
        }

        self.finalize(&mut ctx)
    }

    async fn step(&self, ctx: &mut RequestContext) -> Phase {
        match ctx.phase {
            Phase::Init => self.resolve_identity(ctx).await,
            Phase::SessionConnect => {
                self.connect(ctx, Phase::SessionConnect, Phase::SessionQuery)
                    .await
            }
            Phase::SessionQuery => {
                let op = Operation::QuerySession {
                    client: ctx.client_id().to_string(),
                };
                self.issue(ctx, op, Phase::SessionWait)
            }
            Phase::SessionWait => {
                self.wait(ctx, Phase::SessionRead, Phase::SessionReady)
                    .await
            }
            Phase::SessionRead => self.session_read(ctx).await,
            Phase::SessionReady => self.session_ready(ctx),
            Phase::ItemConnect => {
                self.connect(ctx, Phase::ItemConnect, Phase::ItemQuery)
                    .await
            }
            Phase::ItemQuery => self.item_query(ctx).await,
            Phase::ItemWait => self.wait(ctx, Phase::ItemRead, Phase::Done).await,
            Phase::ItemRead => self.item_read(ctx),
            Phase::Done | Phase::Error => ctx.phase,
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("auth", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}
