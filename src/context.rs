//! Request Context
//!
//! The immutable value handed to handlers that ask for it: static server
//! identity, the peer session current when the request arrived, and the
//! per-request scope.

use {
    crate::identifier::RequestId,
    crate::lifespan::LifespanState,
    crate::session::PeerSession,
    crate::types::{ProgressToken, RequestMeta, ServerIdentity},
    std::sync::Arc,
    tracing::debug,
};

/// Per-request identifier, metadata and lifespan state reference.
#[derive(Debug, Clone)]
pub struct RequestScope {
    request_id: RequestId,
    meta: Option<RequestMeta>,
    lifespan: Arc<LifespanState>,
}

impl RequestScope {
    pub(crate) fn new(
        request_id: RequestId,
        meta: Option<RequestMeta>,
        lifespan: Arc<LifespanState>,
    ) -> Self {
        Self {
            request_id,
            meta,
            lifespan,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn meta(&self) -> Option<&RequestMeta> {
        self.meta.as_ref()
    }

    pub fn progress_token(&self) -> Option<ProgressToken> {
        self.meta.as_ref().and_then(RequestMeta::progress_token)
    }

    /// The process-wide lifespan state. Every scope shares the same instance.
    pub fn lifespan_state(&self) -> &Arc<LifespanState> {
        &self.lifespan
    }
}

/// Context passed as the second argument to context-aware handlers.
#[derive(Debug, Clone)]
pub struct Context {
    identity: Arc<ServerIdentity>,
    session: Arc<PeerSession>,
    scope: RequestScope,
}

impl Context {
    pub(crate) fn new(
        identity: Arc<ServerIdentity>,
        session: Arc<PeerSession>,
        scope: RequestScope,
    ) -> Self {
        Self {
            identity,
            session,
            scope,
        }
    }

    pub fn identity(&self) -> &Arc<ServerIdentity> {
        &self.identity
    }

    pub fn session(&self) -> &Arc<PeerSession> {
        &self.session
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    pub fn request_id(&self) -> &RequestId {
        self.scope.request_id()
    }

    pub fn lifespan_state(&self) -> &Arc<LifespanState> {
        self.scope.lifespan_state()
    }

    /// Send progress correlated with this request's own progress token.
    ///
    /// Without a token in the request metadata there is nobody to correlate
    /// with, so nothing is sent.
    pub async fn report_progress(&self, current: f64, total: Option<f64>, message: Option<String>) {
        match self.scope.progress_token() {
            Some(token) => {
                self.session
                    .send_progress(token, current, total, message)
                    .await
            }
            None => debug!(
                request_id = %self.scope.request_id(),
                "No progress token in request metadata, skipping progress report"
            ),
        }
    }
}
