//! Capability Negotiation
//!
//! Handles the `initialize` handshake: checks the protocol version, captures
//! the peer's declared capabilities and client info, feeds the capability
//! snapshot into the [`ContextFactory`], and builds the initialize result
//! from the server identity.

use {
    crate::error::{McpError, McpResult},
    crate::factory::ContextFactory,
    crate::types::PeerCapabilities,
    serde_json::{json, Value},
    std::sync::atomic::{AtomicBool, Ordering},
    std::sync::Arc,
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

pub struct CapabilityNegotiator {
    factory: Arc<ContextFactory>,
    initialized: AtomicBool,
    client_info: RwLock<Option<Value>>,
    protocol_version: RwLock<Option<String>>,
}

impl CapabilityNegotiator {
    pub fn new(factory: Arc<ContextFactory>) -> Self {
        Self {
            factory,
            initialized: AtomicBool::new(false),
            client_info: RwLock::new(None),
            protocol_version: RwLock::new(None),
        }
    }

    /// Process `initialize` params and return the initialize result.
    ///
    /// On error nothing is recorded and the previous snapshot stays active.
    pub async fn handle_initialize(&self, params: Value) -> McpResult<Value> {
        let params = params.as_object().ok_or_else(|| {
            McpError::InvalidParams("initialize params must be an object".to_string())
        })?;

        let config = self.factory.config();
        let version = match params.get("protocolVersion") {
            Some(Value::String(requested)) => {
                if !config.supports_protocol_version(requested) {
                    warn!(
                        requested = %requested,
                        supported = ?config.supported_protocol_versions,
                        "Rejecting unsupported protocol version"
                    );
                    return Err(McpError::UnsupportedProtocolVersion {
                        requested: requested.clone(),
                        supported: config.supported_protocol_versions.clone(),
                    });
                }
                requested.clone()
            }
            Some(other) => {
                return Err(McpError::InvalidParams(format!(
                    "protocolVersion must be a string, got {other}"
                )))
            }
            None => config.latest_protocol_version().to_string(),
        };

        let capabilities = parse_capabilities(params.get("capabilities"))?;

        if self.initialized.swap(false, Ordering::AcqRel) {
            info!("Re-initialization requested, resetting handshake state");
        }

        *self.client_info.write().await = params.get("clientInfo").cloned();
        *self.protocol_version.write().await = Some(version.clone());

        let rebound = self.factory.record_peer_capabilities(capabilities);
        debug!(protocol_version = %version, rebound, "Handshake captured");

        let identity = self.factory.identity();
        let mut result = json!({
            "protocolVersion": version,
            "capabilities": identity.capabilities.to_json(),
            "serverInfo": identity.server_info(),
        });
        if let Some(instructions) = &identity.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }
        Ok(result)
    }

    /// Handle the peer's `notifications/initialized`.
    pub fn handle_initialized_notification(&self) {
        self.initialized.store(true, Ordering::Release);
        info!("Peer sent initialized notification");
    }

    /// True once the peer confirmed the handshake.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub async fn client_info(&self) -> Option<Value> {
        self.client_info.read().await.clone()
    }

    pub async fn protocol_version(&self) -> Option<String> {
        self.protocol_version.read().await.clone()
    }

    pub fn factory(&self) -> &Arc<ContextFactory> {
        &self.factory
    }
}

/// A missing `capabilities` field is an explicit "no capabilities" snapshot.
fn parse_capabilities(raw: Option<&Value>) -> McpResult<PeerCapabilities> {
    match raw {
        None | Some(Value::Null) => Ok(PeerCapabilities::default()),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone()).map_err(|e| {
            McpError::InvalidParams(format!("malformed peer capabilities: {e}"))
        }),
        Some(other) => Err(McpError::InvalidParams(format!(
            "capabilities must be an object, got {other}"
        ))),
    }
}
