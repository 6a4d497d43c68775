use std::collections::BTreeSet;

use keygate_common::http_client::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::{
    claims::{Claims, ClaimsDecoder},
    config::ProviderConfig,
    error::{OAuthError, Result},
    request,
    types::AccessToken,
};

/// One UMA grant: a resource and the scopes allowed on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    #[serde(rename = "resource_set_id")]
    pub resource_id: SmolStr,
    #[serde(rename = "resource_set_name")]
    pub resource_name: SmolStr,
    #[serde(default)]
    pub scopes: BTreeSet<SmolStr>,
}

impl Permission {
    pub fn from_raw(raw: &Value) -> Result<Self> {
        let field = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(SmolStr::new)
                .ok_or_else(|| {
                    OAuthError::malformed_response(format_args!("permission entry lacks `{key}`"))
                })
        };
        Ok(Self {
            resource_id: field("resource_set_id")?,
            resource_name: field("resource_set_name")?,
            scopes: raw
                .get("scopes")
                .and_then(Value::as_array)
                .map(|scopes| {
                    scopes
                        .iter()
                        .filter_map(Value::as_str)
                        .map(SmolStr::new)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Permissions in the order the provider listed them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Permissions(Vec<Permission>);

impl Permissions {
    /// Read `authorization.permissions` from decoded RPT claims.
    pub fn from_claims(claims: &Claims) -> Result<Self> {
        let Some(entries) = claims
            .get("authorization")
            .and_then(|authz| authz.get("permissions"))
            .and_then(Value::as_array)
        else {
            return Err(OAuthError::malformed_response(
                "RPT lacks `authorization.permissions`",
            ));
        };
        entries
            .iter()
            .map(Permission::from_raw)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Decided by the first entry for `resource` only; later entries for the
    /// same resource are never consulted.
    pub fn has_permission(&self, resource: &str, scope: &str) -> bool {
        self.0
            .iter()
            .find(|p| p.resource_name == resource)
            .is_some_and(|p| p.has_scope(scope))
    }

    pub fn has_resource_permission(&self, resource: &str) -> bool {
        self.0.iter().any(|p| p.resource_name == resource)
    }

    pub fn has_scope_permission(&self, scope: &str) -> bool {
        self.0.iter().any(|p| p.has_scope(scope))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Permissions {
    type Item = &'a Permission;
    type IntoIter = std::slice::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Permission>> for Permissions {
    fn from(permissions: Vec<Permission>) -> Self {
        Self(permissions)
    }
}

/// Fetches the RPT for a token and answers permission queries against it.
pub struct PermissionEvaluator<'a, C> {
    client: &'a C,
    config: &'a ProviderConfig,
    decoder: &'a ClaimsDecoder,
}

impl<'a, C> PermissionEvaluator<'a, C>
where
    C: HttpClient + Send + Sync,
{
    pub fn new(client: &'a C, config: &'a ProviderConfig, decoder: &'a ClaimsDecoder) -> Self {
        Self {
            client,
            config,
            decoder,
        }
    }

    /// One entitlement round-trip per call; the result is not cached.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn load_permissions(&self, token: &AccessToken) -> Result<Permissions> {
        let response = request::entitlement(self.client, self.config, token).await?;
        let Some(rpt) = response.get("rpt") else {
            return Err(OAuthError::malformed_response(
                "entitlement response lacks `rpt`",
            ));
        };
        let claims = self.decoder.decode(rpt)?;
        Permissions::from_claims(&claims)
    }

    pub async fn has_permission(
        &self,
        token: &AccessToken,
        resource: &str,
        scope: &str,
    ) -> Result<bool> {
        Ok(self
            .load_permissions(token)
            .await?
            .has_permission(resource, scope))
    }

    pub async fn has_resource_permission(&self, token: &AccessToken, resource: &str) -> Result<bool> {
        Ok(self
            .load_permissions(token)
            .await?
            .has_resource_permission(resource))
    }

    pub async fn has_scope_permission(&self, token: &AccessToken, scope: &str) -> Result<bool> {
        Ok(self.load_permissions(token).await?.has_scope_permission(scope))
    }
}
