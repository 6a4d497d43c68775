use std::collections::BTreeSet;

use smol_str::SmolStr;

use crate::{
    claims::{Claims, ClaimsDecoder},
    config::ProviderConfig,
    error::Result,
    types::AccessToken,
};

/// One or more role names to test for. A check passes if any of them is held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles(BTreeSet<SmolStr>);

impl Roles {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(SmolStr::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Roles {
    fn from(role: &str) -> Self {
        Self(BTreeSet::from([SmolStr::new(role)]))
    }
}

impl From<String> for Roles {
    fn from(role: String) -> Self {
        Self(BTreeSet::from([SmolStr::from(role)]))
    }
}

impl From<SmolStr> for Roles {
    fn from(role: SmolStr) -> Self {
        Self(BTreeSet::from([role]))
    }
}

impl From<&[&str]> for Roles {
    fn from(roles: &[&str]) -> Self {
        roles.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for Roles {
    fn from(roles: [&str; N]) -> Self {
        roles.into_iter().collect()
    }
}

impl From<Vec<SmolStr>> for Roles {
    fn from(roles: Vec<SmolStr>) -> Self {
        Self(roles.into_iter().collect())
    }
}

impl<'s> FromIterator<&'s str> for Roles {
    fn from_iter<I: IntoIterator<Item = &'s str>>(iter: I) -> Self {
        Self(iter.into_iter().map(SmolStr::new).collect())
    }
}

/// Answers realm and per-client role checks from a token's own claims.
#[derive(Debug)]
pub struct RoleEvaluator<'a> {
    config: &'a ProviderConfig,
    decoder: &'a ClaimsDecoder,
}

impl<'a> RoleEvaluator<'a> {
    pub fn new(config: &'a ProviderConfig, decoder: &'a ClaimsDecoder) -> Self {
        Self { config, decoder }
    }

    fn claims(&self, token: &AccessToken) -> Result<Claims> {
        token.claims(self.decoder)
    }

    pub fn has_realm_role(&self, token: &AccessToken, roles: impl Into<Roles>) -> Result<bool> {
        let realm = self.claims(token)?.realm_access()?;
        Ok(roles.into().iter().any(|role| realm.contains(role)))
    }

    /// `resource` defaults to the configured client id.
    pub fn has_resource_role(
        &self,
        token: &AccessToken,
        roles: impl Into<Roles>,
        resource: Option<&str>,
    ) -> Result<bool> {
        let resource = resource.unwrap_or(self.config.client_id.as_str());
        let access = self.claims(token)?.resource_access()?;
        Ok(roles
            .into()
            .iter()
            .any(|role| access.contains(resource, role)))
    }

    /// Realm role, or role on the configured client.
    pub fn has_role(&self, token: &AccessToken, roles: impl Into<Roles>) -> Result<bool> {
        let roles = roles.into();
        if self.has_realm_role(token, roles.clone())? {
            return Ok(true);
        }
        self.has_resource_role(token, roles, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OAuthError;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;
    use url::Url;

    fn config() -> ProviderConfig {
        ProviderConfig::builder()
            .auth_server_url(Url::parse("http://kc/auth").unwrap())
            .realm("master")
            .client_id("api-server")
            .redirect_uri(Url::parse("http://app/callback").unwrap())
            .build()
    }

    fn token(claims: serde_json::Value) -> AccessToken {
        AccessToken::new(
            jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"key"))
                .unwrap(),
        )
    }

    fn fixture() -> AccessToken {
        token(json!({
            "realm_access": {"roles": ["admin", "uma_authorization"]},
            "resource_access": {
                "api-server": {"roles": ["uma_protection"]},
                "other": {"roles": ["admin"]},
                "account": {"roles": ["manage-account", "manage-account-links", "view-profile"]}
            }
        }))
    }

    #[test]
    fn realm_roles() {
        let config = config();
        let decoder = ClaimsDecoder::plain();
        let roles = RoleEvaluator::new(&config, &decoder);
        let token = fixture();
        assert!(roles.has_realm_role(&token, "admin").unwrap());
        assert!(!roles.has_realm_role(&token, "not_existed").unwrap());
        assert!(roles.has_realm_role(&token, ["not_existed", "uma_authorization"]).unwrap());
    }

    #[test]
    fn resource_roles_default_to_client_id() {
        let config = config();
        let decoder = ClaimsDecoder::plain();
        let roles = RoleEvaluator::new(&config, &decoder);
        let token = fixture();
        assert!(roles.has_resource_role(&token, "uma_protection", None).unwrap());
        assert!(!roles.has_resource_role(&token, "admin", None).unwrap());
        assert!(roles.has_resource_role(&token, "admin", Some("other")).unwrap());
        assert!(roles.has_resource_role(&token, "view-profile", Some("account")).unwrap());
        assert!(!roles.has_resource_role(&token, "admin", Some("missing")).unwrap());
    }

    #[test]
    fn has_role_is_realm_or_client() {
        let config = config();
        let decoder = ClaimsDecoder::keyed("HS256", b"key").unwrap();
        let roles = RoleEvaluator::new(&config, &decoder);
        let token = fixture();
        assert!(roles.has_role(&token, "uma_protection").unwrap());
        assert!(roles.has_role(&token, "admin").unwrap());
        assert!(!roles.has_role(&token, "missing").unwrap());
        // account-only roles don't count
        assert!(!roles.has_role(&token, "view-profile").unwrap());
    }

    #[test]
    fn missing_sections_are_wrong_resource() {
        let config = config();
        let decoder = ClaimsDecoder::plain();
        let roles = RoleEvaluator::new(&config, &decoder);
        let token = token(json!({"sub": "x"}));
        assert!(matches!(
            roles.has_realm_role(&token, "admin"),
            Err(OAuthError::WrongResource(_))
        ));
        assert!(matches!(
            roles.has_resource_role(&token, "admin", None),
            Err(OAuthError::WrongResource(_))
        ));
    }
}
