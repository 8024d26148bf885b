//! Peer Session
//!
//! Capability-gated access to the connected peer. Notifications are
//! best-effort: any failure, including invalid input, is logged and
//! swallowed so a side-channel message can never abort handler logic.
//! Sampling is fail-fast: without the peer's `sampling` capability the call
//! errors before anything is sent, and transport or peer failures come back
//! wrapped as [`McpError::RequestFailed`].
//!
//! A session is built once per capability snapshot and never mutated; a new
//! snapshot means a new session.

use {
    crate::config::SessionConfig,
    crate::error::{McpError, McpResult, TransportError},
    crate::peer::{DetachedPeer, McpNotification, PeerConnection},
    crate::types::{
        CompletionOptions, CompletionRequest, CompletionResult, LogLevel, PeerCapabilities,
        ProgressToken, SamplingMessage,
    },
    serde_json::Value,
    std::fmt,
    std::sync::Arc,
    tracing::{debug, warn},
};

const SAMPLING_METHOD: &str = "sampling/createMessage";

pub struct PeerSession {
    connection: Arc<dyn PeerConnection>,
    capabilities: Option<PeerCapabilities>,
    config: Arc<SessionConfig>,
}

impl PeerSession {
    /// Session bound to `connection` with the given capability snapshot.
    /// `None` means the handshake has not completed.
    pub fn new(
        connection: Arc<dyn PeerConnection>,
        capabilities: Option<PeerCapabilities>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            connection,
            capabilities,
            config,
        }
    }

    /// Best-effort no-op session: no connection and no capabilities.
    pub fn detached() -> Self {
        Self::new(
            Arc::new(DetachedPeer),
            None,
            Arc::new(SessionConfig::default()),
        )
    }

    /// The peer's capability snapshot, `None` before the handshake completes.
    pub fn peer_capabilities(&self) -> Option<&PeerCapabilities> {
        self.capabilities.as_ref()
    }

    pub fn is_negotiated(&self) -> bool {
        self.capabilities.is_some()
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    /// Same connection and config, different snapshot.
    pub(crate) fn rebind(&self, capabilities: Option<PeerCapabilities>) -> Self {
        Self::new(
            Arc::clone(&self.connection),
            capabilities,
            Arc::clone(&self.config),
        )
    }

    pub async fn send_log_message(&self, level: LogLevel, text: impl Into<String>, logger: Option<&str>) {
        let mut text = text.into();
        truncate_on_char_boundary(&mut text, self.config.max_log_message_bytes);

        let logger = logger
            .map(str::to_string)
            .or_else(|| self.config.default_logger.clone());

        self.dispatch(McpNotification::LogMessage {
            level,
            logger,
            data: Value::String(text),
        })
        .await;
    }

    pub async fn debug(&self, text: impl Into<String>) {
        self.send_log_message(LogLevel::Debug, text, None).await;
    }

    pub async fn info(&self, text: impl Into<String>) {
        self.send_log_message(LogLevel::Info, text, None).await;
    }

    pub async fn warning(&self, text: impl Into<String>) {
        self.send_log_message(LogLevel::Warning, text, None).await;
    }

    pub async fn error(&self, text: impl Into<String>) {
        self.send_log_message(LogLevel::Error, text, None).await;
    }

    /// Report progress on a long-running operation.
    ///
    /// Invalid values (negative or non-finite `current`, `total < current`)
    /// are logged and nothing is sent.
    pub async fn send_progress(
        &self,
        progress_token: impl Into<ProgressToken>,
        current: f64,
        total: Option<f64>,
        message: Option<String>,
    ) {
        let progress_token = progress_token.into();
        if let Err(e) = validate_progress(current, total) {
            warn!(
                progress_token = %progress_token,
                "Dropping progress notification: {}", e
            );
            return;
        }

        self.dispatch(McpNotification::Progress {
            progress_token,
            progress: current,
            total,
            message,
        })
        .await;
    }

    pub async fn notify_resource_updated(&self, uri: impl Into<String>) {
        self.dispatch(McpNotification::ResourceUpdated { uri: uri.into() })
            .await;
    }

    pub async fn notify_resource_list_changed(&self) {
        self.dispatch(McpNotification::ResourcesListChanged).await;
    }

    pub async fn notify_tool_list_changed(&self) {
        self.dispatch(McpNotification::ToolsListChanged).await;
    }

    pub async fn notify_prompt_list_changed(&self) {
        self.dispatch(McpNotification::PromptsListChanged).await;
    }

    /// Ask the peer to run a completion over `messages`.
    ///
    /// # Errors
    /// - [`McpError::CapabilityMissing`] if the peer never advertised
    ///   `sampling`; no request is sent in that case.
    /// - [`McpError::RequestFailed`] if sending, the peer, or decoding the
    ///   result failed.
    pub async fn request_completion(
        &self,
        messages: Vec<SamplingMessage>,
        options: Option<CompletionOptions>,
    ) -> McpResult<CompletionResult> {
        self.require_sampling()?;

        let request = CompletionRequest {
            messages,
            options: options.unwrap_or_default(),
        };
        let params = serde_json::to_value(&request).map_err(|e| McpError::RequestFailed {
            method: SAMPLING_METHOD,
            source: TransportError::from(e),
        })?;

        debug!(
            messages = request.messages.len(),
            max_tokens = request.options.max_tokens,
            "Sending sampling request to peer"
        );

        let raw = self
            .connection
            .send_request(SAMPLING_METHOD, params)
            .await
            .map_err(|source| McpError::RequestFailed {
                method: SAMPLING_METHOD,
                source,
            })?;

        serde_json::from_value(raw).map_err(|e| McpError::RequestFailed {
            method: SAMPLING_METHOD,
            source: TransportError::MalformedResponse(e.to_string()),
        })
    }

    fn require_sampling(&self) -> McpResult<()> {
        match &self.capabilities {
            Some(caps) if caps.supports_sampling() => Ok(()),
            Some(caps) => Err(McpError::CapabilityMissing {
                required: "sampling",
                advertised: caps.to_string(),
            }),
            None => Err(McpError::CapabilityMissing {
                required: "sampling",
                advertised: "none (handshake not completed)".to_string(),
            }),
        }
    }

    async fn dispatch(&self, notification: McpNotification) {
        let method = notification.method();
        if let Err(e) = self.connection.send_notification(notification).await {
            warn!(method, "Failed to deliver notification to peer: {}", e);
        }
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn validate_progress(current: f64, total: Option<f64>) -> McpResult<()> {
    if !current.is_finite() || current < 0.0 {
        return Err(McpError::InvalidParams(format!(
            "progress must be a finite non-negative number, got {current}"
        )));
    }
    if let Some(total) = total {
        if !total.is_finite() || total < current {
            return Err(McpError::InvalidParams(format!(
                "total ({total}) must be finite and not less than progress ({current})"
            )));
        }
    }
    Ok(())
}

fn truncate_on_char_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_progress() {
        assert!(validate_progress(0.0, None).is_ok());
        assert!(validate_progress(5.0, Some(5.0)).is_ok());
        assert!(validate_progress(-1.0, None).is_err());
        assert!(validate_progress(f64::NAN, None).is_err());
        assert!(validate_progress(3.0, Some(2.0)).is_err());
        assert!(validate_progress(1.0, Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_truncate_respects_utf8() {
        let mut text = "héllo".to_string();
        truncate_on_char_boundary(&mut text, 2);
        assert_eq!(text, "h");

        let mut short = "ok".to_string();
        truncate_on_char_boundary(&mut short, 10);
        assert_eq!(short, "ok");
    }

    #[tokio::test]
    async fn test_detached_session_swallows_everything() {
        let session = PeerSession::detached();
        assert!(session.peer_capabilities().is_none());

        session.info("hello").await;
        session.send_progress("t", 1.0, Some(2.0), None).await;
        session.notify_tool_list_changed().await;

        let err = session
            .request_completion(vec![SamplingMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(err.is_capability_missing());
        assert!(err.to_string().contains("handshake not completed"));
    }
}
