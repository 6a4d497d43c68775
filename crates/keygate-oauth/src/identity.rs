use keygate_common::http_client::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::{
    claims::{Claims, ClaimsDecoder},
    config::ProviderConfig,
    error::{OAuthError, Result},
    request,
    types::AccessToken,
};

/// Profile of the user a token belongs to, as returned by userinfo.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct ResourceOwner(Claims);

impl ResourceOwner {
    /// Fetch and decode the profile for `token`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn fetch<C>(
        client: &C,
        config: &ProviderConfig,
        decoder: &ClaimsDecoder,
        token: &AccessToken,
    ) -> Result<Self>
    where
        C: HttpClient + Send + Sync,
    {
        let raw = request::userinfo(client, config, token).await?;
        Ok(Self(decoder.decode(&raw)?))
    }

    /// `sub`
    pub fn id(&self) -> Option<&str> {
        self.0.str("sub")
    }

    /// `preferred_username`
    pub fn username(&self) -> Option<&str> {
        self.0.str("preferred_username")
    }

    pub fn email(&self) -> Option<&str> {
        self.0.str("email")
    }

    pub fn name(&self) -> Option<&str> {
        self.0.str("name")
    }

    pub fn given_name(&self) -> Option<&str> {
        self.0.str("given_name")
    }

    pub fn family_name(&self) -> Option<&str> {
        self.0.str("family_name")
    }

    /// Any claim by name. Absent claims are an error, not `null`.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| OAuthError::UnknownClaim(SmolStr::new(key)))
    }

    pub fn to_map(&self) -> &Map<String, Value> {
        self.0.as_map()
    }

    pub fn claims(&self) -> &Claims {
        &self.0
    }
}

impl From<Claims> for ResourceOwner {
    fn from(claims: Claims) -> Self {
        Self(claims)
    }
}
