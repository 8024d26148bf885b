//! Request context and peer sessions for MCP servers
//!
//! For every inbound request this library assembles an immutable [`Context`]
//! carrying the server identity, a capability-gated [`PeerSession`] for
//! notifications and sampling, and a per-request [`RequestScope`]. Handlers
//! receive the context only if they ask for it.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod factory;
pub mod identifier;
pub mod lifecycle;
pub mod lifespan;
pub mod logging;
pub mod negotiation;
pub mod peer;
pub mod session;
pub mod types;

// Test modules
#[cfg(test)]
mod tests;

// Re-export key types
pub use config::SessionConfig;
pub use context::{Context, RequestScope};
pub use dispatcher::{Handler, HandlerDispatcher, HandlerRegistry, HandlerResult, IntoHandler};
pub use engine::{ContextEngine, ContextEngineBuilder};
pub use error::{McpError, McpResult, TransportError};
pub use factory::ContextFactory;
pub use identifier::{RequestId, RequestIdGenerator};
pub use lifecycle::{lifespan_hook, LifecycleManager, LifespanHook};
pub use lifespan::LifespanState;
pub use negotiation::CapabilityNegotiator;
pub use peer::{ChannelPeer, DetachedPeer, McpNotification, PeerConnection};
pub use session::PeerSession;
pub use types::{
    CompletionOptions, CompletionResult, LogLevel, PeerCapabilities, ProgressToken, RequestMeta,
    Role, SamplingContent, SamplingMessage, ServerCapabilityFlags, ServerIdentity, StopReason,
};
