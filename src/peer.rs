//! Peer Connection
//!
//! The abstract handle through which the session layer reaches the connected
//! peer, the notification shapes it produces, and two stock connections:
//! [`ChannelPeer`] (outbound JSON-RPC frames over an mpsc channel, with
//! request/response correlation) and [`DetachedPeer`] (nothing bound yet).

use {
    crate::error::TransportError,
    crate::types::{LogLevel, ProgressToken},
    async_trait::async_trait,
    dashmap::DashMap,
    serde_json::{json, Value},
    std::sync::atomic::{AtomicU64, Ordering},
    std::sync::Arc,
    tokio::sync::{mpsc, oneshot},
    tracing::{debug, trace, warn},
};

/// Notification types that can be sent from server to peer
#[derive(Debug, Clone, PartialEq)]
pub enum McpNotification {
    /// Log message
    LogMessage {
        level: LogLevel,
        logger: Option<String>,
        data: Value,
    },
    /// Progress notification
    Progress {
        progress_token: ProgressToken,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    },
    /// A single resource changed
    ResourceUpdated { uri: String },
    /// Resources have changed
    ResourcesListChanged,
    /// Tools have changed
    ToolsListChanged,
    /// Prompts have changed
    PromptsListChanged,
}

impl McpNotification {
    pub fn method(&self) -> &'static str {
        match self {
            McpNotification::LogMessage { .. } => "notifications/message",
            McpNotification::Progress { .. } => "notifications/progress",
            McpNotification::ResourceUpdated { .. } => "notifications/resources/updated",
            McpNotification::ResourcesListChanged => "notifications/resources/list_changed",
            McpNotification::ToolsListChanged => "notifications/tools/list_changed",
            McpNotification::PromptsListChanged => "notifications/prompts/list_changed",
        }
    }

    /// Notification payload; `None` for the list-changed variants.
    pub fn params(&self) -> Option<Value> {
        match self {
            McpNotification::LogMessage {
                level,
                logger,
                data,
            } => {
                let mut params = json!({ "level": level, "data": data });
                if let Some(logger) = logger {
                    params["logger"] = Value::String(logger.clone());
                }
                Some(params)
            }
            McpNotification::Progress {
                progress_token,
                progress,
                total,
                message,
            } => {
                let mut params = json!({
                    "progressToken": progress_token,
                    "progress": progress,
                });
                if let Some(total) = total {
                    params["total"] = json!(total);
                }
                if let Some(message) = message {
                    params["message"] = Value::String(message.clone());
                }
                Some(params)
            }
            McpNotification::ResourceUpdated { uri } => Some(json!({ "uri": uri })),
            McpNotification::ResourcesListChanged
            | McpNotification::ToolsListChanged
            | McpNotification::PromptsListChanged => None,
        }
    }

    /// Render as a JSON-RPC 2.0 notification frame.
    pub fn to_json_rpc(&self) -> Value {
        let mut frame = json!({
            "jsonrpc": "2.0",
            "method": self.method(),
        });
        if let Some(params) = self.params() {
            frame["params"] = params;
        }
        frame
    }
}

/// Handle to the connected peer, implemented by the transport.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Deliver a one-way notification.
    async fn send_notification(&self, notification: McpNotification) -> Result<(), TransportError>;

    /// Send a request and wait for the peer's `result` value.
    async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError>;
}

/// Connection used before any transport is bound. Notifications vanish,
/// requests fail as if the connection were closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedPeer;

#[async_trait]
impl PeerConnection for DetachedPeer {
    async fn send_notification(&self, notification: McpNotification) -> Result<(), TransportError> {
        trace!(method = notification.method(), "No peer bound, dropping notification");
        Ok(())
    }

    async fn send_request(&self, _method: &str, _params: Value) -> Result<Value, TransportError> {
        Err(TransportError::ConnectionClosed)
    }
}

/// Peer connection that writes JSON-RPC frames to an unbounded channel.
///
/// The transport drains the receiver and writes frames to the wire. Responses
/// to server-initiated requests come back through [`ChannelPeer::complete`].
pub struct ChannelPeer {
    outbound: mpsc::UnboundedSender<Value>,
    pending: Arc<DashMap<String, oneshot::Sender<Value>>>,
    next_id: AtomicU64,
}

impl ChannelPeer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let peer = Self {
            outbound,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        };
        (peer, receiver)
    }

    /// Route a JSON-RPC response from the peer to the request waiting on it.
    ///
    /// Returns `false` when no pending request matches the response id.
    pub fn complete(&self, response: Value) -> bool {
        let Some(id) = response.get("id").and_then(response_id_key) else {
            warn!("Dropping peer response without usable id: {}", response);
            return false;
        };

        match self.pending.remove(&id) {
            Some((_, waiter)) => {
                // The requester may have given up; the result is discarded then.
                let _ = waiter.send(response);
                true
            }
            None => {
                debug!(request_id = %id, "No pending request for peer response");
                false
            }
        }
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn allocate_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn response_id_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Removes the pending entry if the waiting future is dropped early.
struct PendingGuard {
    pending: Arc<DashMap<String, oneshot::Sender<Value>>>,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[async_trait]
impl PeerConnection for ChannelPeer {
    async fn send_notification(&self, notification: McpNotification) -> Result<(), TransportError> {
        self.outbound
            .send(notification.to_json_rpc())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.allocate_id();
        let (waiter, response) = oneshot::channel();
        self.pending.insert(id.clone(), waiter);
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            id: id.clone(),
        };

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)?;

        let response = response.await.map_err(|_| TransportError::ConnectionClosed)?;

        if let Some(error) = response.get("error") {
            return Err(TransportError::Peer {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| TransportError::MalformedResponse("missing 'result' field".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notification_frame() {
        let notification = McpNotification::LogMessage {
            level: LogLevel::Warning,
            logger: Some("db".to_string()),
            data: json!("slow query"),
        };
        let frame = notification.to_json_rpc();
        assert_eq!(frame["method"], "notifications/message");
        assert_eq!(frame["params"]["level"], "warning");
        assert_eq!(frame["params"]["data"], "slow query");
        assert_eq!(frame["params"]["logger"], "db");
        assert!(frame.get("id").is_none());
    }

    #[test]
    fn test_list_changed_frames_have_no_params() {
        for notification in [
            McpNotification::ResourcesListChanged,
            McpNotification::ToolsListChanged,
            McpNotification::PromptsListChanged,
        ] {
            let frame = notification.to_json_rpc();
            assert!(frame.get("params").is_none());
            assert!(frame["method"].as_str().unwrap().ends_with("list_changed"));
        }
    }

    #[test]
    fn test_progress_frame_omits_absent_fields() {
        let notification = McpNotification::Progress {
            progress_token: ProgressToken::from(7i64),
            progress: 2.0,
            total: None,
            message: None,
        };
        let params = notification.params().unwrap();
        assert_eq!(params["progressToken"], 7);
        assert_eq!(params["progress"], 2.0);
        assert!(params.get("total").is_none());
        assert!(params.get("message").is_none());
    }

    #[tokio::test]
    async fn test_channel_peer_request_roundtrip() {
        let (peer, mut outbound) = ChannelPeer::new();
        let peer = Arc::new(peer);

        let requester = Arc::clone(&peer);
        let call = tokio::spawn(async move {
            requester
                .send_request("sampling/createMessage", json!({"messages": []}))
                .await
        });

        let frame = outbound.recv().await.unwrap();
        assert_eq!(frame["method"], "sampling/createMessage");
        assert_eq!(peer.pending_requests(), 1);

        let completed = peer.complete(json!({
            "jsonrpc": "2.0",
            "id": frame["id"],
            "result": {"ok": true}
        }));
        assert!(completed);

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, json!({"ok": true}));
        assert_eq!(peer.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_channel_peer_maps_peer_error() {
        let (peer, mut outbound) = ChannelPeer::new();
        let peer = Arc::new(peer);

        let requester = Arc::clone(&peer);
        let call = tokio::spawn(async move { requester.send_request("ping", json!({})).await });

        let frame = outbound.recv().await.unwrap();
        peer.complete(json!({
            "jsonrpc": "2.0",
            "id": frame["id"],
            "error": {"code": -1, "message": "User rejected sampling request"}
        }));

        match call.await.unwrap() {
            Err(TransportError::Peer { code, message }) => {
                assert_eq!(code, -1);
                assert!(message.contains("rejected"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_peer_closed_receiver() {
        let (peer, outbound) = ChannelPeer::new();
        drop(outbound);

        let err = peer
            .send_notification(McpNotification::ToolsListChanged)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));

        let err = peer.send_request("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
        assert_eq!(peer.pending_requests(), 0);
    }

    #[test]
    fn test_complete_unknown_id() {
        let (peer, _outbound) = ChannelPeer::new();
        assert!(!peer.complete(json!({"jsonrpc": "2.0", "id": "srv-99", "result": {}})));
        assert!(!peer.complete(json!({"jsonrpc": "2.0", "result": {}})));
    }
}
