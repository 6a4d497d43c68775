use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationResponseType {
    Code,
}

#[derive(Serialize, Debug)]
pub struct AuthorizationRequestParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.1
    pub response_type: AuthorizationResponseType,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenGrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
    Password,
}

impl TokenGrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenGrantType::AuthorizationCode => "authorization_code",
            TokenGrantType::ClientCredentials => "client_credentials",
            TokenGrantType::RefreshToken => "refresh_token",
            TokenGrantType::Password => "password",
        }
    }
}

#[derive(Serialize, Debug)]
pub struct TokenRequestParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.3
    pub grant_type: TokenGrantType,
    pub code: &'a str,
    pub redirect_uri: &'a str,
}

#[derive(Serialize, Debug)]
pub struct ClientCredentialsParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.4.2
    pub grant_type: TokenGrantType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'a str>,
}

#[derive(Serialize, Debug)]
pub struct RefreshRequestParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-6
    pub grant_type: TokenGrantType,
    pub refresh_token: &'a str,
}

#[derive(Serialize, Debug)]
pub struct PasswordRequestParameters<'a> {
    // https://datatracker.ietf.org/doc/html/rfc6749#section-4.3.2
    pub grant_type: TokenGrantType,
    pub username: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'a str>,
}
