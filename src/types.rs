//! Core types for the context layer
//!
//! Server identity, peer capability snapshots, request metadata and the
//! payload shapes exchanged with the peer for logging, progress and sampling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Capabilities the server itself declares in the handshake response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerCapabilityFlags {
    pub tools: bool,
    pub resources: bool,
    pub resource_subscribe: bool,
    pub prompts: bool,
    pub logging: bool,
    pub sampling: bool,
    /// Whether list-changed notifications are emitted for tools/resources/prompts
    pub list_changed: bool,
}

impl ServerCapabilityFlags {
    /// Render as the `capabilities` object of an initialize result.
    pub fn to_json(&self) -> Value {
        let mut caps = Map::new();
        if self.tools {
            caps.insert(
                "tools".to_string(),
                serde_json::json!({ "listChanged": self.list_changed }),
            );
        }
        if self.resources {
            caps.insert(
                "resources".to_string(),
                serde_json::json!({
                    "subscribe": self.resource_subscribe,
                    "listChanged": self.list_changed
                }),
            );
        }
        if self.prompts {
            caps.insert(
                "prompts".to_string(),
                serde_json::json!({ "listChanged": self.list_changed }),
            );
        }
        if self.logging {
            caps.insert("logging".to_string(), serde_json::json!({}));
        }
        if self.sampling {
            caps.insert("sampling".to_string(), serde_json::json!({}));
        }
        Value::Object(caps)
    }
}

/// Static server metadata, created once and shared by every context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub capabilities: ServerCapabilityFlags,
}

impl ServerIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            instructions: None,
            website_url: None,
            icon_url: None,
            capabilities: ServerCapabilityFlags {
                tools: true,
                logging: true,
                ..Default::default()
            },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_website_url(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into());
        self
    }

    pub fn with_icon_url(mut self, url: impl Into<String>) -> Self {
        self.icon_url = Some(url.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: ServerCapabilityFlags) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The `serverInfo` object sent back during the handshake.
    pub fn server_info(&self) -> Value {
        let mut info = serde_json::json!({
            "name": self.name,
            "version": self.version,
        });
        if let Some(description) = &self.description {
            info["description"] = Value::String(description.clone());
        }
        if let Some(url) = &self.website_url {
            info["websiteUrl"] = Value::String(url.clone());
        }
        if let Some(icon) = &self.icon_url {
            info["icons"] = serde_json::json!([{ "src": icon }]);
        }
        info
    }
}

/// Roots capability advertised by the peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// What the connected peer declared during the handshake.
///
/// A snapshot is immutable once captured; the "not yet negotiated" state is
/// represented by `Option::<PeerCapabilities>::None`, never by a default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
}

impl PeerCapabilities {
    /// Snapshot declaring only the sampling capability.
    pub fn with_sampling() -> Self {
        Self {
            sampling: Some(Map::new()),
            ..Default::default()
        }
    }

    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }

    pub fn roots_list_changed(&self) -> bool {
        self.roots
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }

    /// Look up an experimental extension by name.
    pub fn experimental(&self, name: &str) -> Option<&Value> {
        self.experimental.as_ref().and_then(|e| e.get(name))
    }
}

impl fmt::Display for PeerCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.sampling.is_some() {
            names.push("sampling".to_string());
        }
        if self.roots.is_some() {
            names.push("roots".to_string());
        }
        if let Some(experimental) = &self.experimental {
            names.extend(experimental.keys().map(|k| format!("experimental.{k}")));
        }
        if names.is_empty() {
            write!(f, "{{}}")
        } else {
            write!(f, "{{{}}}", names.join(", "))
        }
    }
}

/// Log levels for log message notifications (syslog severities)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Alert => "alert",
            LogLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token correlating progress notifications with the originating request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    /// Any JSON number, kept exactly as the peer sent it.
    Number(serde_json::Number),
}

impl From<&str> for ProgressToken {
    fn from(s: &str) -> Self {
        ProgressToken::String(s.to_string())
    }
}

impl From<String> for ProgressToken {
    fn from(s: String) -> Self {
        ProgressToken::String(s)
    }
}

impl From<i64> for ProgressToken {
    fn from(n: i64) -> Self {
        ProgressToken::Number(n.into())
    }
}

impl From<serde_json::Number> for ProgressToken {
    fn from(n: serde_json::Number) -> Self {
        ProgressToken::Number(n)
    }
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressToken::String(s) => f.write_str(s),
            ProgressToken::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Open-ended request metadata forwarded from the protocol message (`_meta`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestMeta(pub Map<String, Value>);

impl RequestMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying only a progress token.
    pub fn with_progress_token(token: impl Into<ProgressToken>) -> Self {
        let mut meta = Map::new();
        if let Ok(value) = serde_json::to_value(token.into()) {
            meta.insert("progressToken".to_string(), value);
        }
        Self(meta)
    }

    /// Extract `_meta` from request params. Absent or non-object metadata
    /// yields `None`.
    pub fn from_params(params: &Value) -> Option<Self> {
        params
            .get("_meta")
            .and_then(Value::as_object)
            .map(|m| Self(m.clone()))
    }

    /// The caller-supplied progress token. Tokens that are neither strings
    /// nor numbers are ignored.
    pub fn progress_token(&self) -> Option<ProgressToken> {
        match self.0.get("progressToken")? {
            Value::String(s) => Some(ProgressToken::String(s.clone())),
            Value::Number(n) => Some(ProgressToken::Number(n.clone())),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Role of a message in a sampling exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content carried by a sampling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplingContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl SamplingContent {
    pub fn text(text: impl Into<String>) -> Self {
        SamplingContent::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SamplingContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: SamplingContent,
}

impl SamplingMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: SamplingContent::text(text),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: SamplingContent::text(text),
        }
    }
}

/// Which server context the peer should include in the completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncludeContext {
    None,
    ThisServer,
    AllServers,
}

/// Optional sampling parameters for a completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_context: Option<IncludeContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: None,
            top_p: None,
            stop_sequences: Vec::new(),
            system_prompt: None,
            model_preferences: None,
            include_context: None,
            metadata: None,
        }
    }
}

/// Params of a `sampling/createMessage` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<SamplingMessage>,
    #[serde(flatten)]
    pub options: CompletionOptions,
}

/// Why the peer's model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    EndTurn,
    StopSequence,
    MaxTokens,
    #[serde(untagged)]
    Other(String),
}

/// Result of a `sampling/createMessage` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default = "default_role")]
    pub role: Role,
    pub content: SamplingContent,
}

fn default_role() -> Role {
    Role::Assistant
}

impl CompletionResult {
    /// Generated text, when the peer returned text content.
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_with_partial_capabilities() {
        let identity: ServerIdentity = serde_json::from_value(json!({
            "name": "notes",
            "version": "0.3.0",
            "description": "Personal notes server",
            "capabilities": {"resources": true, "listChanged": true}
        }))
        .unwrap();

        assert!(identity.capabilities.resources);
        assert!(identity.capabilities.list_changed);
        assert!(!identity.capabilities.tools);

        let info = identity.server_info();
        assert_eq!(info["name"], "notes");
        assert_eq!(info["description"], "Personal notes server");
        assert!(info.get("websiteUrl").is_none());
    }

    #[test]
    fn test_meta_from_params() {
        let meta = RequestMeta::from_params(&json!({
            "name": "echo",
            "_meta": {"progressToken": "abc", "traceId": "t-1"}
        }))
        .unwrap();
        assert_eq!(meta.progress_token(), Some(ProgressToken::from("abc")));
        assert_eq!(meta.get("traceId"), Some(&json!("t-1")));

        assert!(RequestMeta::from_params(&json!({"name": "echo"})).is_none());
        assert!(RequestMeta::from_params(&json!({"_meta": "nope"})).is_none());
    }

    #[test]
    fn test_numeric_progress_tokens_are_kept_verbatim() {
        let big = RequestMeta::from_params(&json!({"_meta": {"progressToken": u64::MAX}}))
            .unwrap()
            .progress_token()
            .unwrap();
        assert_eq!(big.to_string(), u64::MAX.to_string());
        assert_eq!(serde_json::to_value(&big).unwrap(), json!(u64::MAX));

        let fractional = RequestMeta::from_params(&json!({"_meta": {"progressToken": 1.5}}))
            .unwrap()
            .progress_token()
            .unwrap();
        assert_eq!(serde_json::to_value(&fractional).unwrap(), json!(1.5));

        let missing = RequestMeta::from_params(&json!({"_meta": {"progressToken": null}}))
            .unwrap()
            .progress_token();
        assert!(missing.is_none());
    }
}
