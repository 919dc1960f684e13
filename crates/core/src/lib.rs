//! Core data layer for the snippet service.
//!
//! This crate provides:
//! - AES-GCM envelope for snippet content at rest
//! - Primary/replica SQLite store with round-robin replica reads
//! - Best-effort cache-aside layer (Redis or SQLite backend)
//! - Lifecycle orchestration: create, read, update, delete
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod password;
pub mod service;
pub mod store;

pub use cache::{CacheBackend, SnippetCache, snippet_key};
pub use config::{AppConfig, CacheBackendKind, CacheConfig, ConfigError, DbConfig};
pub use crypto::Envelope;
pub use error::Error;
pub use password::{Argon2Scheme, PasswordScheme};
pub use service::{CreateSnippet, CreatedSnippet, SnippetService, SnippetView, UpdateSnippet};
pub use store::{SnippetRow, Store};
