use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    // Protocol Errors
    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unsupported protocol version: {requested} (supported: {supported:?})")]
    UnsupportedProtocolVersion {
        requested: String,
        supported: Vec<String>,
    },

    #[error("Tool not found: {0}")]
    UnknownTool(String),

    // Session Errors
    #[error("Peer does not support '{required}' (advertised capabilities: {advertised})")]
    CapabilityMissing {
        required: &'static str,
        advertised: String,
    },

    #[error("Request '{method}' to peer failed: {source}")]
    RequestFailed {
        method: &'static str,
        #[source]
        source: TransportError,
    },

    // Internal Errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            Self::UnknownMethod(_) | Self::UnknownTool(_) => -32601,
            Self::InvalidParams(_) | Self::UnsupportedProtocolVersion { .. } => -32602,
            Self::CapabilityMissing { .. } => -32003,
            Self::RequestFailed { .. } => -32000,
            Self::Internal(_) => -32603,
        }
    }

    /// Create JSON-RPC error response
    pub fn to_json_rpc_error(&self, id: Option<Value>) -> Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            },
            "id": id,
        })
    }

    /// True for the fail-fast error raised before any transport attempt.
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, Self::CapabilityMissing { .. })
    }

    /// True when the peer was reached (or attempted) and the exchange failed.
    pub fn is_request_failed(&self) -> bool {
        matches!(self, Self::RequestFailed { .. })
    }
}

// Result type alias for convenience
pub type McpResult<T> = Result<T, McpError>;

// Module-specific errors that compose into McpError
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Peer returned error {code}: {message}")]
    Peer { code: i64, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}
