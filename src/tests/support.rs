//! Stub peer connection shared by the unit tests.

use {
    crate::error::TransportError,
    crate::peer::{McpNotification, PeerConnection},
    async_trait::async_trait,
    serde_json::{json, Value},
    std::sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    std::sync::Mutex,
};

/// Records everything sent to it and answers requests with a canned result.
pub struct RecordingPeer {
    notifications: Mutex<Vec<McpNotification>>,
    requests: Mutex<Vec<(String, Value)>>,
    request_calls: AtomicUsize,
    fail: AtomicBool,
    response: Mutex<Value>,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            request_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            response: Mutex::new(json!({
                "model": "stub-model",
                "stopReason": "endTurn",
                "role": "assistant",
                "content": {"type": "text", "text": "stubbed completion"}
            })),
        }
    }

    /// Every send fails as if the connection had dropped.
    pub fn disconnected() -> Self {
        let peer = Self::new();
        peer.fail.store(true, Ordering::SeqCst);
        peer
    }

    pub fn respond_with(&self, response: Value) {
        *self.response.lock().unwrap() = response;
    }

    pub fn notifications(&self) -> Vec<McpNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }

    pub fn progress_sends(&self) -> usize {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, McpNotification::Progress { .. }))
            .count()
    }
}

#[async_trait]
impl PeerConnection for RecordingPeer {
    async fn send_notification(&self, notification: McpNotification) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(self.response.lock().unwrap().clone())
    }
}
