use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::config::ProviderConfig;
use crate::error::{OAuthError, Result};

// JWT segments are unpadded, but some issuers pad anyway.
const JWT_SEGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded claim set of a token. Immutable once built.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Raw claim value by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the claim is present at all.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Borrow the whole claim set.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the whole claim set.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// String claim, if present and a string.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// `exp` as a unix timestamp.
    pub fn exp(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    /// `realm_access`; [`OAuthError::WrongResource`] when the token has none.
    pub fn realm_access(&self) -> Result<RealmAccess> {
        RealmAccess::from_claims(self)
    }

    /// `resource_access`; [`OAuthError::WrongResource`] when the token has none.
    pub fn resource_access(&self) -> Result<ResourceAccess> {
        ResourceAccess::from_claims(self)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Turns token payloads into [`Claims`].
///
/// With an algorithm and key configured, string payloads are decoded and
/// verified with them. Without, the middle segment of a compact JWT is read
/// as-is and the signature is **not** checked: the token is trusted because
/// it came straight from the provider over an authenticated channel.
#[derive(Clone, Default)]
pub struct ClaimsDecoder {
    keyed: Option<(Algorithm, DecodingKey)>,
}

impl fmt::Debug for ClaimsDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsDecoder")
            .field("algorithm", &self.keyed.as_ref().map(|(alg, _)| alg))
            .finish()
    }
}

impl ClaimsDecoder {
    /// Decoder for the unverified compact-JWT path only.
    pub fn plain() -> Self {
        Self { keyed: None }
    }

    /// Decoder that verifies with `algorithm` (e.g. `HS256`, `RS256`) and `key`.
    ///
    /// HMAC algorithms take the raw secret; RSA, EC and EdDSA take a PEM.
    pub fn keyed(algorithm: &str, key: &[u8]) -> Result<Self> {
        let alg = Algorithm::from_str(algorithm).map_err(|_| {
            OAuthError::Config(smol_str::format_smolstr!("unsupported algorithm `{algorithm}`"))
        })?;
        let key = match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => DecodingKey::from_secret(key),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(key)
                .map_err(|e| OAuthError::Config(smol_str::format_smolstr!("bad RSA key: {e}")))?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key)
                .map_err(|e| OAuthError::Config(smol_str::format_smolstr!("bad EC key: {e}")))?,
            Algorithm::EdDSA => DecodingKey::from_ed_pem(key)
                .map_err(|e| OAuthError::Config(smol_str::format_smolstr!("bad EdDSA key: {e}")))?,
        };
        Ok(Self {
            keyed: Some((alg, key)),
        })
    }

    /// Build from config. The keyed path is used only when both an
    /// algorithm and key material (inline or from `encryption_key_path`) are set.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let Some(algorithm) = config.encryption_algorithm.as_deref() else {
            return Ok(Self::plain());
        };
        if let Some(key) = config.encryption_key.as_deref() {
            return Self::keyed(algorithm, key.as_bytes());
        }
        if let Some(path) = config.encryption_key_path.as_deref() {
            let key = std::fs::read(path).map_err(|e| {
                OAuthError::Config(smol_str::format_smolstr!("{}: {e}", path.display()))
            })?;
            return Self::keyed(algorithm, &key);
        }
        Ok(Self::plain())
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed.is_some()
    }

    /// Decode a payload that is either already structured or a compact token.
    pub fn decode(&self, payload: &Value) -> Result<Claims> {
        match payload {
            Value::Object(map) => Ok(Claims(map.clone())),
            Value::String(token) => self.decode_str(token),
            other => Err(OAuthError::malformed_token(format_args!(
                "expected a token string or claims object, got {}",
                value_kind(other)
            ))),
        }
    }

    pub fn decode_str(&self, token: &str) -> Result<Claims> {
        match &self.keyed {
            Some((alg, key)) => decode_verified(token, *alg, key),
            None => decode_unverified(token),
        }
    }
}

fn decode_verified(token: &str, alg: Algorithm, key: &DecodingKey) -> Result<Claims> {
    let mut validation = Validation::new(alg);
    validation.required_spec_claims.clear();
    validation.validate_aud = false;
    let data = jsonwebtoken::decode::<Map<String, Value>>(token, key, &validation)
        .map_err(OAuthError::malformed_token)?;
    Ok(Claims(data.claims))
}

fn decode_unverified(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(OAuthError::malformed_token("expected three dot-separated segments"));
    };
    let bytes = JWT_SEGMENT
        .decode(payload)
        .map_err(|e| OAuthError::malformed_token(format_args!("payload is not base64url: {e}")))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(Claims(map)),
        Ok(other) => Err(OAuthError::malformed_token(format_args!(
            "payload is a JSON {}, not an object",
            value_kind(&other)
        ))),
        Err(e) => Err(OAuthError::malformed_token(format_args!("payload is not JSON: {e}"))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn role_set(section: &Value) -> BTreeSet<SmolStr> {
    section
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(SmolStr::new)
                .collect()
        })
        .unwrap_or_default()
}

/// Roles granted at realm scope (`realm_access.roles`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RealmAccess {
    #[serde(default)]
    roles: BTreeSet<SmolStr>,
}

impl RealmAccess {
    /// Read `realm_access.roles`. A section without roles yields an empty set.
    pub fn from_claims(claims: &Claims) -> Result<Self> {
        match claims.get("realm_access") {
            Some(section @ Value::Object(_)) => Ok(Self {
                roles: role_set(section),
            }),
            _ => Err(OAuthError::WrongResource(SmolStr::new_static("realm_access"))),
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(SmolStr::as_str)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Roles granted per client (`resource_access.<client>.roles`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ResourceAccess(BTreeMap<SmolStr, RealmAccess>);

impl ResourceAccess {
    /// Read every `resource_access.<client>.roles` entry.
    pub fn from_claims(claims: &Claims) -> Result<Self> {
        let Some(Value::Object(section)) = claims.get("resource_access") else {
            return Err(OAuthError::WrongResource(SmolStr::new_static(
                "resource_access",
            )));
        };
        Ok(Self(
            section
                .iter()
                .map(|(resource, entry)| {
                    (
                        SmolStr::new(resource),
                        RealmAccess {
                            roles: role_set(entry),
                        },
                    )
                })
                .collect(),
        ))
    }

    /// Roles for one client, if the token carries an entry for it.
    pub fn get(&self, resource: &str) -> Option<impl Iterator<Item = &str>> {
        self.0.get(resource).map(RealmAccess::roles)
    }

    pub fn contains(&self, resource: &str, role: &str) -> bool {
        self.0.get(resource).is_some_and(|entry| entry.contains(role))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, impl Iterator<Item = &str>)> {
        self.0
            .iter()
            .map(|(resource, entry)| (resource.as_str(), entry.roles()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
