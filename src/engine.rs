//! Context Engine
//!
//! Wires the pieces together for a single peer connection: lifecycle hooks
//! run before the engine exists, `initialize` goes through the capability
//! negotiator, `tools/call` through the handler dispatcher, and responses to
//! server-initiated requests are routed back to the channel peer.
//! Shutdown stops accepting requests, drains the ones in flight, then runs
//! the shutdown hook.

use {
    crate::config::SessionConfig,
    crate::dispatcher::{HandlerDispatcher, HandlerRegistry, IntoHandler},
    crate::error::{McpError, McpResult},
    crate::factory::ContextFactory,
    crate::lifecycle::LifecycleManager,
    crate::lifespan::LifespanState,
    crate::negotiation::CapabilityNegotiator,
    crate::peer::{ChannelPeer, DetachedPeer, PeerConnection},
    crate::types::{RequestMeta, ServerIdentity},
    serde_json::{json, Value},
    std::future::Future,
    std::sync::atomic::{AtomicBool, AtomicU64, Ordering},
    std::sync::Arc,
    std::time::Duration,
    tokio::sync::Mutex,
    tracing::{debug, error, info, warn},
};

/// Builder for a [`ContextEngine`]
pub struct ContextEngineBuilder {
    identity: ServerIdentity,
    config: SessionConfig,
    connection: Option<Arc<dyn PeerConnection>>,
    channel: Option<Arc<ChannelPeer>>,
    registry: HandlerRegistry,
    lifecycle: LifecycleManager,
}

impl ContextEngineBuilder {
    pub fn new(server_name: &str, server_version: &str) -> Self {
        Self::from_identity(ServerIdentity::new(server_name, server_version))
    }

    pub fn from_identity(identity: ServerIdentity) -> Self {
        Self {
            identity,
            config: SessionConfig::default(),
            connection: None,
            channel: None,
            registry: HandlerRegistry::new(),
            lifecycle: LifecycleManager::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an arbitrary peer connection.
    pub fn with_connection(mut self, connection: Arc<dyn PeerConnection>) -> Self {
        self.connection = Some(connection);
        self.channel = None;
        self
    }

    /// Use a channel peer; peer responses passed to
    /// [`ContextEngine::handle_message`] are routed to it.
    pub fn with_channel_peer(mut self, peer: Arc<ChannelPeer>) -> Self {
        self.connection = Some(peer.clone() as Arc<dyn PeerConnection>);
        self.channel = Some(peer);
        self
    }

    /// Register a handler; whether it receives a context is decided here.
    pub fn with_tool<M>(mut self, name: &str, handler: impl IntoHandler<M>) -> Self {
        self.registry.register(name, handler);
        self
    }

    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Arc<LifespanState>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle = self.lifecycle.on_startup(hook);
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Arc<LifespanState>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle = self.lifecycle.on_shutdown(hook);
        self
    }

    /// Run the startup hook and assemble the engine.
    pub async fn build(mut self) -> ContextEngine {
        let lifespan = self.lifecycle.start().await;

        let connection = self
            .connection
            .unwrap_or_else(|| Arc::new(DetachedPeer) as Arc<dyn PeerConnection>);
        let factory = Arc::new(ContextFactory::with_connection(
            self.identity,
            lifespan,
            connection,
            self.config,
        ));

        info!(tools = self.registry.len(), "Context engine ready");

        ContextEngine {
            negotiator: CapabilityNegotiator::new(Arc::clone(&factory)),
            dispatcher: HandlerDispatcher::new(Arc::clone(&factory), self.registry),
            factory,
            channel: self.channel,
            lifecycle: Mutex::new(self.lifecycle),
            in_flight: Arc::new(AtomicU64::new(0)),
            accepting: AtomicBool::new(true),
        }
    }
}

pub struct ContextEngine {
    factory: Arc<ContextFactory>,
    negotiator: CapabilityNegotiator,
    dispatcher: HandlerDispatcher,
    channel: Option<Arc<ChannelPeer>>,
    lifecycle: Mutex<LifecycleManager>,
    in_flight: Arc<AtomicU64>,
    accepting: AtomicBool,
}

/// Decrements the in-flight counter when a request finishes.
struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContextEngine {
    pub fn factory(&self) -> &Arc<ContextFactory> {
        &self.factory
    }

    pub fn negotiator(&self) -> &CapabilityNegotiator {
        &self.negotiator
    }

    pub fn dispatcher(&self) -> &HandlerDispatcher {
        &self.dispatcher
    }

    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Handle one parsed JSON-RPC message from the peer.
    ///
    /// Returns the response frame for requests, `None` for notifications and
    /// for peer responses (which are routed to the waiting request).
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned();

        if message.get("method").is_none()
            && (message.get("result").is_some() || message.get("error").is_some())
        {
            self.route_peer_response(message);
            return None;
        }

        let is_notification = id.is_none();
        let result = self.dispatch(&message).await;

        match (is_notification, result) {
            (true, Ok(_)) => None,
            (true, Err(e)) => {
                warn!("Failed to handle peer notification: {}", e);
                None
            }
            (false, Ok(result)) => Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            })),
            (false, Err(e)) => {
                error!(error = %e, id = ?id, "Request failed");
                Some(e.to_json_rpc_error(id))
            }
        }
    }

    async fn dispatch(&self, message: &Value) -> McpResult<Value> {
        let jsonrpc = message
            .get("jsonrpc")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("Missing or invalid 'jsonrpc' field".to_string()))?;
        if jsonrpc != "2.0" {
            return Err(McpError::InvalidParams(format!("Invalid jsonrpc version: {jsonrpc}")));
        }

        let method = message
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("Missing or invalid 'method' field".to_string()))?;
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));

        // Count the request before checking `accepting`, so a concurrent
        // shutdown either sees it in flight or this request sees the refusal.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        };
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(McpError::Internal("Server is shutting down".to_string()));
        }

        debug!(method, "Dispatching peer message");
        match method {
            "initialize" => self.negotiator.handle_initialize(params).await,
            "notifications/initialized" => {
                self.negotiator.handle_initialized_notification();
                Ok(json!({}))
            }
            "notifications/cancelled" => {
                // Cancellation is a transport concern; nothing to undo here.
                debug!(params = %params, "Peer cancelled a request");
                Ok(json!({}))
            }
            "ping" => Ok(json!({})),
            "tools/call" => self.handle_tool_call(params).await,
            _ => Err(McpError::UnknownMethod(method.to_string())),
        }
    }

    async fn handle_tool_call(&self, params: Value) -> McpResult<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                McpError::InvalidParams("Missing required 'name' field for tool call".to_string())
            })?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let meta = RequestMeta::from_params(&params);

        match self.dispatcher.call(name, arguments, meta).await {
            Ok(value) => Ok(tool_result(value, false)),
            Err(e) => match e.downcast::<McpError>() {
                Ok(mcp) => Err(mcp),
                // A failing tool is reported in-band, as MCP expects
                Err(e) => Ok(tool_result(Value::String(e.to_string()), true)),
            },
        }
    }

    fn route_peer_response(&self, response: Value) {
        match &self.channel {
            Some(channel) => {
                channel.complete(response);
            }
            None => warn!("Received peer response but no channel peer is bound"),
        }
    }

    /// Stop accepting requests, wait up to `drain_timeout` for in-flight
    /// ones, then run the shutdown hook. The hook runs even when draining
    /// timed out. Returns whether draining completed.
    pub async fn shutdown(&self, drain_timeout: Duration) -> bool {
        self.accepting.store(false, Ordering::SeqCst);
        info!(in_flight = self.in_flight_count(), "Shutting down context engine");

        let deadline = tokio::time::Instant::now() + drain_timeout;
        let drained = loop {
            if self.in_flight_count() == 0 {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    in_flight = self.in_flight_count(),
                    "Drain timeout expired, releasing lifespan state anyway"
                );
                break false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        let state = Arc::clone(self.factory.lifespan_state());
        self.lifecycle.lock().await.stop(&state).await;
        drained
    }
}

fn tool_result(value: Value, is_error: bool) -> Value {
    let text = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut result = json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    });
    if !is_error && value.is_object() {
        result["structuredContent"] = value;
    }
    result
}
