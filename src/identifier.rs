//! Request identifier generation
//!
//! Every context gets a UUID-v4 request id. The generator also counts how
//! many ids it has handed out so callers can observe allocation.

use {
    std::fmt,
    std::sync::atomic::{AtomicU64, Ordering},
    uuid::Uuid,
};

/// Unique identifier of a single request scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    issued: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh random (v4) request id.
    pub fn generate(&self) -> RequestId {
        self.issued.fetch_add(1, Ordering::Relaxed);
        RequestId(Uuid::new_v4().to_string())
    }

    /// Number of ids generated so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}
