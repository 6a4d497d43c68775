//! # Keygate
//!
//! A client for Keycloak-compatible OAuth2/OIDC identity providers.
//!
//! - Authorization-code login with CSRF state kept in the caller's session
//! - Transparent refresh of expired tokens
//! - Inbound `Authorization: Bearer` handling for API-style requests
//! - Realm and client role checks straight from token claims
//! - UMA permission checks against the entitlement endpoint
//! - A thin wrapper over the admin REST API for authorization resources and policies
//!
//! The HTTP framework stays outside: you hand in the callback's query and
//! headers, keygate hands back either a token or a redirect.
//!
//! ## Example
//!
//! ```no_run
//! use keygate::client::{AuthOrchestrator, AuthStatus};
//! use keygate::oauth::{CallbackRequest, FlowOutcome, ProviderConfig};
//! use keygate::common::MemorySessionStore;
//!
//! # async fn run(request: http::Request<()>) -> miette::Result<()> {
//! let config = ProviderConfig::from_json_file("keycloak.json")?;
//! let auth = AuthOrchestrator::new(reqwest::Client::new(), config, MemorySessionStore::default())?;
//!
//! match auth.ensure_authenticated(&CallbackRequest::from_request(&request)).await? {
//!     AuthStatus::Authenticated(token) => {
//!         if auth.has_role("admin").await? {
//!             println!("hello admin, token expires at {:?}", token.expires_at);
//!         }
//!     }
//!     AuthStatus::Flow(outcome) => {
//!         if let FlowOutcome::Failed { failure, .. } = &outcome {
//!             eprintln!("{} ({})", failure.message, failure.code);
//!         }
//!         if let Some(url) = outcome.redirect() {
//!             println!("redirect to {url}");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Administrative REST boundary: realms, clients, authorization resources and policies.
pub mod admin;
/// Per-session orchestration of login, refresh and authorization checks.
pub mod client;

/// Shared plumbing: HTTP client seam and session storage.
pub use keygate_common as common;
/// Core OAuth2/OIDC types, flow and evaluators.
pub use keygate_oauth as oauth;

pub use client::{AuthOrchestrator, AuthStatus};
pub use keygate_common::{HttpClient, MemorySessionStore, SessionStore};
pub use keygate_oauth::{
    AccessToken, CallbackRequest, ClaimsDecoder, FlowFailure, FlowOutcome, OAuthError,
    ProviderConfig, ResourceOwner,
};
