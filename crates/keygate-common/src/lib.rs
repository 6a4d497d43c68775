//! Shared plumbing for the keygate crates: a minimal HTTP client seam,
//! pluggable session storage, and transport errors.

#![warn(missing_docs)]
pub use smol_str;

pub mod error;
/// HTTP client abstraction used by keygate crates.
pub mod http_client;
/// Generic session storage traits and utilities.
pub mod session;

pub use error::TransportError;
pub use http_client::HttpClient;
pub use session::{MemorySessionStore, SessionStore, SessionStoreError};
