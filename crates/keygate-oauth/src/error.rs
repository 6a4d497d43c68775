use keygate_common::SessionStoreError;
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::request::RequestError;

/// Errors emitted by the OAuth core.
#[derive(Debug, Error, Diagnostic)]
pub enum OAuthError {
    /// Callback `state` was missing or did not match the one stored in the session
    #[error("invalid state, make sure HTTP sessions are enabled")]
    #[diagnostic(
        code(keygate_oauth::invalid_state),
        help("the session must persist `oauth2state` between the redirect and the callback")
    )]
    InvalidState,
    /// Token endpoint, userinfo or entitlement request failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Request(#[from] RequestError),
    /// Token could not be decoded or decrypted
    #[error("malformed token: {0}")]
    #[diagnostic(
        code(keygate_oauth::malformed_token),
        help("expected a three-part compact JWT, or check the configured algorithm and key")
    )]
    MalformedToken(SmolStr),
    /// Provider response is missing a field the protocol requires
    #[error("malformed response: {0}")]
    #[diagnostic(code(keygate_oauth::malformed_response))]
    MalformedResponse(SmolStr),
    /// Claims lack the section a role or permission check needs
    #[error("wrong resource: claims have no `{0}` section")]
    #[diagnostic(
        code(keygate_oauth::wrong_resource),
        help("the token was issued without the client scope that maps this claim")
    )]
    WrongResource(SmolStr),
    /// A profile claim that is not present was requested
    #[error("unknown claim `{0}`")]
    #[diagnostic(code(keygate_oauth::unknown_claim))]
    UnknownClaim(SmolStr),
    /// Session storage failed
    #[error(transparent)]
    #[diagnostic(code(keygate_oauth::storage))]
    Storage(#[from] SessionStoreError),
    /// Configuration could not be loaded or is inconsistent
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(keygate_oauth::config))]
    Config(SmolStr),
    /// URL error
    #[error(transparent)]
    #[diagnostic(code(keygate_oauth::url))]
    Url(#[from] url::ParseError),
    /// Serialization error
    #[error(transparent)]
    #[diagnostic(code(keygate_oauth::serde))]
    Json(#[from] serde_json::Error),
}

impl OAuthError {
    pub(crate) fn malformed_token(msg: impl std::fmt::Display) -> Self {
        Self::MalformedToken(smol_str::format_smolstr!("{msg}"))
    }

    pub(crate) fn malformed_response(msg: impl std::fmt::Display) -> Self {
        Self::MalformedResponse(smol_str::format_smolstr!("{msg}"))
    }

    /// HTTP status of the failed provider call, if the error came from one.
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Request(err) => err.status(),
            _ => None,
        }
    }
}

pub type Result<T> = core::result::Result<T, OAuthError>;
