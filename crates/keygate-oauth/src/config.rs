use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::error::{OAuthError, Result};

/// What to do with an `Authorization: Bearer` header arriving on a request
/// that has no session token yet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BearerHandling {
    /// Trade it for a fresh token with the `client_credentials` grant.
    #[default]
    Exchange,
    /// Validate it against the userinfo endpoint and keep it as the session token.
    Adopt,
}

/// Connection settings for one realm/client pair on the identity provider.
///
/// ```
/// # use keygate_oauth::ProviderConfig;
/// let config = ProviderConfig::from_json_str(r#"{
///     "auth_server_url": "http://localhost:8080/auth",
///     "realm": "master",
///     "client_id": "api-server",
///     "redirect_uri": "http://localhost:3000/callback"
/// }"#).unwrap();
/// assert_eq!(
///     config.token_endpoint().unwrap().as_str(),
///     "http://localhost:8080/auth/realms/master/protocol/openid-connect/token"
/// );
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct ProviderConfig {
    /// Base URL of the provider, e.g. `http://localhost:8080/auth`.
    pub auth_server_url: Url,
    #[builder(into)]
    pub realm: SmolStr,
    #[builder(into)]
    pub client_id: SmolStr,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SmolStr>,
    /// Callback URI registered with the provider.
    pub redirect_uri: Url,
    /// Where to send the browser once a code exchange completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_login_redirect: Option<Url>,
    #[builder(default = default_scopes())]
    #[serde(default = "default_scopes")]
    pub scopes: Vec<SmolStr>,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_algorithm: Option<SmolStr>,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<SmolStr>,
    /// Read once when the decoder is built; ignored if `encryption_key` is set.
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_path: Option<PathBuf>,
    #[builder(default)]
    #[serde(default)]
    pub bearer_handling: BearerHandling,
}

fn default_scopes() -> Vec<SmolStr> {
    vec![
        SmolStr::new_static("openid"),
        SmolStr::new_static("profile"),
        SmolStr::new_static("email"),
    ]
}

impl ProviderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| OAuthError::Config(smol_str::format_smolstr!("{e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OAuthError::Config(smol_str::format_smolstr!("{}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Scopes joined the way the authorization endpoint expects them.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// `{auth_server_url}/realms/{realm}`
    pub fn realm_url(&self) -> Result<Url> {
        join_segments(&self.auth_server_url, &["realms", self.realm.as_str()])
    }

    fn openid_connect(&self, endpoint: &str) -> Result<Url> {
        join_segments(
            &self.realm_url()?,
            &["protocol", "openid-connect", endpoint],
        )
    }

    pub fn authorization_endpoint(&self) -> Result<Url> {
        self.openid_connect("auth")
    }

    pub fn token_endpoint(&self) -> Result<Url> {
        self.openid_connect("token")
    }

    pub fn userinfo_endpoint(&self) -> Result<Url> {
        self.openid_connect("userinfo")
    }

    pub fn entitlement_endpoint(&self) -> Result<Url> {
        join_segments(&self.realm_url()?, &["authz", "entitlement", self.client_id.as_str()])
    }

    /// `{auth_server_url}/admin`
    pub fn admin_url(&self) -> Result<Url> {
        join_segments(&self.auth_server_url, &["admin"])
    }
}

/// Append path segments to `base`, percent-encoding each one.
pub fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| OAuthError::Config(smol_str::format_smolstr!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
