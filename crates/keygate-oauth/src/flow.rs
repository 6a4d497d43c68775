use std::fmt;

use http::{HeaderMap, header};
use keygate_common::{http_client::HttpClient, session::SessionStore};
use serde::Deserialize;
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::{
    claims::ClaimsDecoder,
    config::{BearerHandling, ProviderConfig},
    error::{OAuthError, Result},
    request,
    store::TokenStore,
    types::{AccessToken, AuthorizationRequestParameters, AuthorizationResponseType},
    utils::generate_state,
};

/// What the HTTP layer handed us on this request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackRequest {
    pub code: Option<SmolStr>,
    pub state: Option<SmolStr>,
    /// Token from an `Authorization: Bearer` header.
    pub bearer: Option<SmolStr>,
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<SmolStr>,
    state: Option<SmolStr>,
}

impl CallbackRequest {
    pub fn from_parts(query: Option<&str>, headers: &HeaderMap) -> Self {
        let query: Option<CallbackQuery> = query.and_then(|q| serde_html_form::from_str(q).ok());
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .map(SmolStr::new);
        let (code, state) = query.map(|q| (q.code, q.state)).unwrap_or_default();
        Self {
            code: code.filter(|c| !c.is_empty()),
            state,
            bearer,
        }
    }

    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        Self::from_parts(request.uri().query(), request.headers())
    }
}

/// Stages of one pass through the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Init,
    AwaitingRedirect,
    AwaitingCallback,
    Exchanging,
    Completed,
    Failed,
}

/// Failure the caller should show before sending the user back to login.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("{message}")]
#[diagnostic(code(keygate_oauth::flow::failed))]
pub struct FlowFailure {
    pub message: SmolStr,
    /// Provider HTTP status when known, otherwise 500.
    pub code: u16,
}

impl FlowFailure {
    pub fn invalid_state() -> Self {
        Self {
            message: smol_str::format_smolstr!("{}", OAuthError::InvalidState),
            code: 500,
        }
    }

    pub fn from_error(err: &OAuthError) -> Self {
        Self {
            message: smol_str::format_smolstr!("Failed to get access token: {err}"),
            code: err.status().map(|s| s.as_u16()).unwrap_or(500),
        }
    }
}

/// Result of one invocation of [`AuthorizationCodeFlow::begin_or_continue`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// Send the browser to the provider's login page.
    Redirect(Url),
    /// A new token is stored. `redirect` is the configured post-login target.
    Completed {
        token: AccessToken,
        redirect: Option<Url>,
    },
    /// The token was cleared; show `failure` and send the browser to `redirect`.
    Failed { failure: FlowFailure, redirect: Url },
}

impl FlowOutcome {
    pub fn stage(&self) -> FlowStage {
        match self {
            Self::Redirect(_) => FlowStage::AwaitingCallback,
            Self::Completed { .. } => FlowStage::Completed,
            Self::Failed { .. } => FlowStage::Failed,
        }
    }

    /// Where the browser should go next, if anywhere.
    pub fn redirect(&self) -> Option<&Url> {
        match self {
            Self::Redirect(url) | Self::Failed { redirect: url, .. } => Some(url),
            Self::Completed { redirect, .. } => redirect.as_ref(),
        }
    }
}

/// Drives redirect, callback and code exchange for one session.
///
/// Holds no state of its own between calls; everything lives in the
/// [`TokenStore`]'s session, so calling again after completion starts over.
pub struct AuthorizationCodeFlow<'a, C, S> {
    client: &'a C,
    config: &'a ProviderConfig,
    decoder: &'a ClaimsDecoder,
    store: &'a TokenStore<S>,
}

impl<C, S> fmt::Debug for AuthorizationCodeFlow<'_, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCodeFlow")
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

impl<'a, C, S> AuthorizationCodeFlow<'a, C, S>
where
    C: HttpClient + Send + Sync,
    S: SessionStore<SmolStr, Value>,
{
    pub fn new(
        client: &'a C,
        config: &'a ProviderConfig,
        decoder: &'a ClaimsDecoder,
        store: &'a TokenStore<S>,
    ) -> Self {
        Self {
            client,
            config,
            decoder,
            store,
        }
    }

    /// Build a login URL with a fresh state and remember that state.
    pub async fn authorization_url(&self) -> Result<Url> {
        let state = generate_state();
        let mut url = self.config.authorization_endpoint()?;
        let scope = self.config.scope_param();
        let query = serde_html_form::to_string(AuthorizationRequestParameters {
            response_type: AuthorizationResponseType::Code,
            client_id: &self.config.client_id,
            redirect_uri: self.config.redirect_uri.as_str(),
            scope: &scope,
            state: &state,
        })
        .map_err(|e| OAuthError::Config(smol_str::format_smolstr!("{e}")))?;
        url.set_query(Some(&query));
        self.store.put_state(state).await?;
        Ok(url)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(has_code = callback.code.is_some())))]
    pub async fn begin_or_continue(&self, callback: &CallbackRequest) -> Result<FlowOutcome> {
        stage(FlowStage::Init);
        let Some(code) = callback.code.as_deref() else {
            stage(FlowStage::AwaitingRedirect);
            let url = self.authorization_url().await?;
            stage(FlowStage::AwaitingCallback);
            return Ok(FlowOutcome::Redirect(url));
        };

        let expected = self.store.take_state().await?;
        let state_matches = match (expected.as_deref(), callback.state.as_deref()) {
            (Some(expected), Some(got)) => expected.as_bytes() == got.as_bytes(),
            _ => false,
        };
        if !state_matches {
            self.store.clear().await?;
            #[cfg(feature = "tracing")]
            tracing::error!(
                stored = expected.is_some(),
                returned = callback.state.is_some(),
                "{}",
                OAuthError::InvalidState
            );
            return Ok(FlowOutcome::Failed {
                failure: FlowFailure::invalid_state(),
                redirect: self.authorization_url().await?,
            });
        }

        stage(FlowStage::Exchanging);
        match self.exchange(code, callback.bearer.as_deref()).await {
            Ok(token) => {
                self.store.set(token.clone()).await?;
                stage(FlowStage::Completed);
                Ok(FlowOutcome::Completed {
                    token,
                    redirect: self.config.post_login_redirect.clone(),
                })
            }
            Err(err) => {
                self.store.clear().await?;
                let failure = FlowFailure::from_error(&err);
                #[cfg(feature = "tracing")]
                tracing::error!(code = failure.code, "{}", failure.message);
                stage(FlowStage::Failed);
                Ok(FlowOutcome::Failed {
                    failure,
                    redirect: self.authorization_url().await?,
                })
            }
        }
    }

    /// The exchanging step alone: a bearer on the request wins over the code.
    pub async fn exchange(&self, code: &str, bearer: Option<&str>) -> Result<AccessToken> {
        match bearer {
            Some(bearer) => self.exchange_bearer(bearer).await,
            None => Ok(request::exchange_code(self.client, self.config, code).await?),
        }
    }

    /// Turn an inbound bearer into a session token, per [`BearerHandling`].
    pub async fn exchange_bearer(&self, bearer: &str) -> Result<AccessToken> {
        match self.config.bearer_handling {
            BearerHandling::Exchange => {
                Ok(request::client_credentials(self.client, self.config).await?)
            }
            BearerHandling::Adopt => {
                let token = AccessToken::from_bearer(bearer, self.decoder);
                request::userinfo(self.client, self.config, &token).await?;
                Ok(token)
            }
        }
    }
}

#[inline]
fn stage(_stage: FlowStage) {
    #[cfg(feature = "tracing")]
    tracing::debug!(stage = ?_stage, "authorization flow");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_callback_query_and_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        let cb = CallbackRequest::from_parts(Some("code=xyz&state=s%201&session_state=q"), &headers);
        assert_eq!(cb.code.as_deref(), Some("xyz"));
        assert_eq!(cb.state.as_deref(), Some("s 1"));
        assert_eq!(cb.bearer.as_deref(), Some("abc.def.ghi"));

        for value in ["BEARER abc", "bEaReR abc"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, value.parse().unwrap());
            let cb = CallbackRequest::from_parts(None, &headers);
            assert_eq!(cb.bearer.as_deref(), Some("abc"));
        }
        for value in ["Basic YWRtaW4=", "Bearer ", "Bearerabc"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, value.parse().unwrap());
            assert!(CallbackRequest::from_parts(None, &headers).bearer.is_none());
        }

        let empty = CallbackRequest::from_parts(None, &HeaderMap::new());
        assert_eq!(empty, CallbackRequest::default());

        let req = http::Request::builder()
            .uri("http://app/callback?code=&state=s")
            .body(())
            .unwrap();
        let cb = CallbackRequest::from_request(&req);
        assert!(cb.code.is_none());
        assert_eq!(cb.state.as_deref(), Some("s"));
    }

    #[test]
    fn failure_codes() {
        assert_eq!(FlowFailure::invalid_state().code, 500);
        assert_eq!(
            FlowFailure::invalid_state().message,
            "invalid state, make sure HTTP sessions are enabled"
        );
        let err = OAuthError::Request(request::RequestError::http_status(
            http::StatusCode::UNAUTHORIZED,
        ));
        let failure = FlowFailure::from_error(&err);
        assert_eq!(failure.code, 401);
        assert!(failure.message.starts_with("Failed to get access token: "));
        assert_eq!(
            FlowFailure::from_error(&OAuthError::MalformedToken("x".into())).code,
            500
        );
    }
}
