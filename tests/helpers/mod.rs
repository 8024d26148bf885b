//! Test helpers for integration tests
//!
//! Provides a recording peer and a ready-made engine so each test can drive
//! the full message flow without a real transport.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use solidctx::{
    Context, ContextEngine, ContextEngineBuilder, McpNotification, PeerConnection, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Peer that records what the server sends and answers sampling requests
/// with a fixed completion.
#[derive(Default)]
pub struct StubPeer {
    notifications: Mutex<Vec<McpNotification>>,
    request_calls: AtomicUsize,
}

impl StubPeer {
    pub fn notifications(&self) -> Vec<McpNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }

    pub fn progress_values(&self) -> Vec<f64> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                McpNotification::Progress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PeerConnection for StubPeer {
    async fn send_notification(&self, notification: McpNotification) -> Result<(), TransportError> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }

    async fn send_request(&self, _method: &str, _params: Value) -> Result<Value, TransportError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "model": "stub-model",
            "stopReason": "endTurn",
            "role": "assistant",
            "content": {"type": "text", "text": "stubbed"}
        }))
    }
}

/// Engine wired to a [`StubPeer`] with an `echo` tool and a `summarize` tool
/// that asks the peer for a completion.
pub async fn engine_with_stub(name: &str) -> (ContextEngine, Arc<StubPeer>) {
    let peer = Arc::new(StubPeer::default());
    let engine = ContextEngineBuilder::new(name, "1.0.0")
        .with_connection(peer.clone())
        .with_tool("echo", |args: Value| async move {
            Ok::<Value, anyhow::Error>(args)
        })
        .with_tool("summarize", |args: Value, ctx: Context| async move {
            let text = args["text"].as_str().unwrap_or_default().to_string();
            let result = ctx
                .session()
                .request_completion(vec![solidctx::SamplingMessage::user(text)], None)
                .await?;
            Ok::<Value, anyhow::Error>(json!({ "summary": result.text() }))
        })
        .build()
        .await;
    (engine, peer)
}

pub fn initialize_request(id: u64, capabilities: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": capabilities,
            "clientInfo": {"name": "integration-client", "version": "1.0.0"}
        }
    })
}

pub fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}
