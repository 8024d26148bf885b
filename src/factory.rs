//! Context Factory
//!
//! Single authority for assembling [`Context`] values. Holds the server
//! identity, the lifespan state and the current [`PeerSession`]. The session
//! sits in an `ArcSwap`: a capability change builds a new session and swaps
//! the pointer, so contexts already handed out keep the snapshot they
//! captured and only contexts built afterwards see the new one.

use {
    crate::config::SessionConfig,
    crate::context::{Context, RequestScope},
    crate::identifier::RequestIdGenerator,
    crate::lifespan::LifespanState,
    crate::peer::{DetachedPeer, PeerConnection},
    crate::session::PeerSession,
    crate::types::{PeerCapabilities, RequestMeta, ServerIdentity},
    arc_swap::ArcSwap,
    std::sync::Arc,
    tracing::{debug, info},
};

pub struct ContextFactory {
    identity: Arc<ServerIdentity>,
    lifespan: Arc<LifespanState>,
    session: ArcSwap<PeerSession>,
    ids: RequestIdGenerator,
    config: Arc<SessionConfig>,
}

impl ContextFactory {
    /// Factory with no peer connection bound yet. Sessions it hands out
    /// drop notifications until [`ContextFactory::bind_connection`] is called.
    pub fn initialize(identity: ServerIdentity, lifespan: Arc<LifespanState>) -> Self {
        Self::with_connection(
            identity,
            lifespan,
            Arc::new(DetachedPeer),
            SessionConfig::default(),
        )
    }

    pub fn with_connection(
        identity: ServerIdentity,
        lifespan: Arc<LifespanState>,
        connection: Arc<dyn PeerConnection>,
        config: SessionConfig,
    ) -> Self {
        let config = Arc::new(config);
        let session = PeerSession::new(connection, None, Arc::clone(&config));

        info!(
            server = %identity.name,
            version = %identity.version,
            "Context factory initialized"
        );

        Self {
            identity: Arc::new(identity),
            lifespan,
            session: ArcSwap::from_pointee(session),
            ids: RequestIdGenerator::new(),
            config,
        }
    }

    /// Bind a (new) peer connection, keeping the current capability snapshot.
    pub fn bind_connection(&self, connection: Arc<dyn PeerConnection>) {
        self.session.rcu(|current| {
            PeerSession::new(
                Arc::clone(&connection),
                current.peer_capabilities().cloned(),
                Arc::clone(&self.config),
            )
        });
        debug!("Peer connection rebound");
    }

    /// Replace the current session with one gated by `capabilities`.
    ///
    /// Returns `false` when the snapshot equals the current one and nothing
    /// was rebuilt.
    pub fn record_peer_capabilities(&self, capabilities: PeerCapabilities) -> bool {
        // `rcu` may retry the closure, so `changed` reflects the final attempt
        let mut changed = false;
        self.session.rcu(|current| {
            changed = current.peer_capabilities() != Some(&capabilities);
            if changed {
                Arc::new(current.rebind(Some(capabilities.clone())))
            } else {
                Arc::clone(current)
            }
        });

        if changed {
            info!(capabilities = %capabilities, "Recorded peer capabilities");
        } else {
            debug!("Peer capabilities unchanged, keeping current session");
        }
        changed
    }

    /// Assemble a fresh context for one request.
    pub fn build_context(&self, meta: Option<RequestMeta>) -> Context {
        let scope = RequestScope::new(self.ids.generate(), meta, Arc::clone(&self.lifespan));
        Context::new(Arc::clone(&self.identity), self.session.load_full(), scope)
    }

    pub fn identity(&self) -> &Arc<ServerIdentity> {
        &self.identity
    }

    pub fn lifespan_state(&self) -> &Arc<LifespanState> {
        &self.lifespan
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session new contexts will be built with.
    pub fn current_session(&self) -> Arc<PeerSession> {
        self.session.load_full()
    }

    pub fn peer_capabilities(&self) -> Option<PeerCapabilities> {
        self.session.load().peer_capabilities().cloned()
    }

    /// Number of request ids generated, i.e. contexts built.
    pub fn contexts_built(&self) -> u64 {
        self.ids.issued()
    }
}
