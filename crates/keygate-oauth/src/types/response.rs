use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

// https://datatracker.ietf.org/doc/html/rfc6749#section-5.1
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OAuthTokenResponse {
    pub access_token: SmolStr,
    pub token_type: Option<SmolStr>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<SmolStr>,
    // Keycloak extensions
    pub refresh_expires_in: Option<i64>,
    pub session_state: Option<SmolStr>,
    pub scope: Option<SmolStr>,
    // OIDC
    pub id_token: Option<SmolStr>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `{"error": ..., "error_description": ...}` as returned by the provider.
// https://datatracker.ietf.org/doc/html/rfc6749#section-5.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthErrorResponse {
    pub error: SmolStr,
    pub error_description: Option<SmolStr>,
}
