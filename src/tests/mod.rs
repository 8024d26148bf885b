//! Context Layer Tests
//!
//! Unit tests for context assembly, peer sessions, dispatch and lifecycle.

pub mod support;
