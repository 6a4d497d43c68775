//! Core OAuth2/OIDC types and helpers for talking to a Keycloak-compatible
//! identity provider: token acquisition and refresh, claims decoding, and
//! role / UMA permission evaluation. Orchestration lives in `keygate`.

pub mod claims;
pub mod config;
pub mod error;
pub mod flow;
pub mod identity;
pub mod permissions;
pub mod refresh;
pub mod request;
pub mod roles;
pub mod store;
pub mod types;
pub mod utils;

pub use claims::{Claims, ClaimsDecoder, RealmAccess, ResourceAccess};
pub use config::{BearerHandling, ProviderConfig};
pub use error::{OAuthError, Result};
pub use flow::{AuthorizationCodeFlow, CallbackRequest, FlowFailure, FlowOutcome, FlowStage};
pub use identity::ResourceOwner;
pub use permissions::{Permission, PermissionEvaluator, Permissions};
pub use refresh::TokenRefresher;
pub use roles::{RoleEvaluator, Roles};
pub use store::TokenStore;
pub use types::AccessToken;
