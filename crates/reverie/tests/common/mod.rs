//! Shared test utilities for reverie integration tests.
//!
//! This module provides:
//! - Builders for journal entries, analyses and configs
//! - `ScriptedBackend`, a generation backend driven by a list of steps
//! - `StubServer`, a minimal HTTP server speaking the chat-completions API

pub mod backend;
pub mod builders;
pub mod http;

pub use backend::{ScriptedBackend, Step};
pub use builders::*;
pub use http::StubServer;
