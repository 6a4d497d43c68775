use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::claims::{Claims, ClaimsDecoder};
use crate::error::Result;
use crate::types::OAuthTokenResponse;

/// The access token held for one session, with everything the provider
/// returned alongside it. Replaced wholesale on refresh; never patched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub access_token: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SmolStr>,
    /// `None` when the provider gave no lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl AccessToken {
    /// A token carrying only the bearer string.
    pub fn new(access_token: impl Into<SmolStr>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            refresh_token: None,
            expires_at: None,
            refresh_expires_at: None,
            scope: None,
            id_token: None,
            session_state: None,
            extra: Map::new(),
        }
    }

    pub fn from_response(response: OAuthTokenResponse, now: DateTime<Utc>) -> Self {
        let after = |secs: Option<i64>| {
            secs.and_then(|secs| now.checked_add_signed(TimeDelta::try_seconds(secs)?))
        };
        Self {
            expires_at: after(response.expires_in),
            refresh_expires_at: after(response.refresh_expires_in),
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            scope: response.scope,
            id_token: response.id_token,
            session_state: response.session_state,
            extra: response.extra,
        }
    }

    /// Wrap a bearer string received from a caller. Expiry comes from the
    /// token's own `exp` claim when it can be decoded.
    pub fn from_bearer(bearer: impl Into<SmolStr>, decoder: &ClaimsDecoder) -> Self {
        let mut token = Self::new(bearer);
        token.expires_at = decoder
            .decode_str(&token.access_token)
            .ok()
            .and_then(|claims| claims.exp())
            .and_then(|exp| DateTime::from_timestamp(exp, 0));
        token
    }

    /// The bare bearer string.
    pub fn value(&self) -> &str {
        &self.access_token
    }

    /// A token without a known expiry counts as expired, so it is
    /// renewed or re-validated on every use.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Claims of the access token itself, decoded on demand.
    pub fn claims(&self, decoder: &ClaimsDecoder) -> Result<Claims> {
        decoder.decode_str(&self.access_token)
    }
}
