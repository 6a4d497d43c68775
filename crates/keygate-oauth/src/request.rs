use chrono::Utc;
use http::{Method, Request, Response, StatusCode, header};
use keygate_common::http_client::HttpClient;
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::{
    config::ProviderConfig,
    types::{
        AccessToken, ClientCredentialsParameters, OAuthErrorResponse, OAuthTokenResponse,
        PasswordRequestParameters, RefreshRequestParameters, TokenGrantType,
        TokenRequestParameters,
    },
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error from a single round-trip to the identity provider
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct RequestError {
    #[diagnostic_source]
    kind: RequestErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
    url: Option<SmolStr>,
}

/// Error categories for provider requests
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RequestErrorKind {
    /// The transport failed before a response arrived
    #[error("transport error")]
    #[diagnostic(code(keygate_oauth::request::transport))]
    Transport,

    /// HTTP build error
    #[error("http build error")]
    #[diagnostic(code(keygate_oauth::request::http_build))]
    HttpBuild,

    /// Unexpected status without an OAuth error body
    #[error("http status: {0}")]
    #[diagnostic(
        code(keygate_oauth::request::http_status),
        help("see server response for details")
    )]
    HttpStatus(StatusCode),

    /// The provider answered with an OAuth `error` body
    #[error("{error}: {}", .description.as_deref().unwrap_or_default())]
    #[diagnostic(code(keygate_oauth::request::identity_provider))]
    IdentityProvider {
        status: StatusCode,
        error: SmolStr,
        description: Option<SmolStr>,
    },

    /// No refresh token available
    #[error("no refresh token available")]
    #[diagnostic(code(keygate_oauth::request::no_refresh_token))]
    NoRefreshToken,

    /// Form serialization error
    #[error("form serialization error")]
    #[diagnostic(code(keygate_oauth::request::serde_form))]
    SerdeHtmlForm,

    /// JSON error
    #[error("json error")]
    #[diagnostic(code(keygate_oauth::request::serde_json))]
    SerdeJson,
}

impl RequestError {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: RequestErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            url: None,
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> &RequestErrorKind {
        &self.kind
    }

    /// Get the source error if present
    pub fn source_err(&self) -> Option<&BoxError> {
        self.source.as_ref()
    }

    /// Get the context string if present
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Get the request URL if present
    pub fn request_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// HTTP status the provider answered with, if it answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match &self.kind {
            RequestErrorKind::HttpStatus(status)
            | RequestErrorKind::IdentityProvider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Add help text to this error
    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add context to this error
    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add URL to this error
    pub fn with_url(mut self, url: impl Into<SmolStr>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Create a transport error
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(RequestErrorKind::Transport, Some(Box::new(source)))
            .with_help("check that the identity provider is reachable")
    }

    /// Create an HTTP status error
    pub fn http_status(status: StatusCode) -> Self {
        Self::new(RequestErrorKind::HttpStatus(status), None)
    }

    /// Create an identity provider error from its OAuth error body
    pub fn identity_provider(status: StatusCode, body: OAuthErrorResponse) -> Self {
        Self::new(
            RequestErrorKind::IdentityProvider {
                status,
                error: body.error,
                description: body.error_description,
            },
            None,
        )
    }

    /// Create a no refresh token error
    pub fn no_refresh_token() -> Self {
        Self::new(RequestErrorKind::NoRefreshToken, None)
    }
}

impl From<http::Error> for RequestError {
    fn from(e: http::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::HttpBuild, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify request URIs and headers are valid")
    }
}

impl From<serde_html_form::ser::Error> for RequestError {
    fn from(e: serde_html_form::ser::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeHtmlForm, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check OAuth request parameters are serializable")
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(RequestErrorKind::SerdeJson, Some(Box::new(e)))
            .with_context(msg)
            .with_help("verify the provider response body is valid JSON")
    }
}

impl From<crate::error::OAuthError> for RequestError {
    fn from(e: crate::error::OAuthError) -> Self {
        let msg = smol_str::format_smolstr!("{}", e);
        Self::new(RequestErrorKind::HttpBuild, Some(Box::new(e))).with_context(msg)
    }
}

pub type Result<T> = core::result::Result<T, RequestError>;

/// A token endpoint request.
pub enum OAuthRequest<'a> {
    Token(TokenRequestParameters<'a>),
    ClientCredentials(ClientCredentialsParameters<'a>),
    Refresh(RefreshRequestParameters<'a>),
    Password(PasswordRequestParameters<'a>),
}

impl OAuthRequest<'_> {
    pub fn grant_type(&self) -> TokenGrantType {
        match self {
            Self::Token(p) => p.grant_type,
            Self::ClientCredentials(p) => p.grant_type,
            Self::Refresh(p) => p.grant_type,
            Self::Password(p) => p.grant_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestPayload<'a, T>
where
    T: Serialize,
{
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    #[serde(flatten)]
    parameters: T,
}

#[inline]
fn build_oauth_req_body<S>(config: &ProviderConfig, parameters: S) -> Result<String>
where
    S: Serialize,
{
    Ok(serde_html_form::to_string(RequestPayload {
        client_id: &config.client_id,
        client_secret: config.client_secret.as_deref(),
        parameters,
    })?)
}

/// POST a grant to the token endpoint and turn the answer into an [`AccessToken`].
pub async fn oauth_request<T>(
    client: &T,
    config: &ProviderConfig,
    request: OAuthRequest<'_>,
) -> Result<AccessToken>
where
    T: HttpClient + Send + Sync,
{
    let url = config.token_endpoint()?;
    #[cfg(feature = "tracing")]
    tracing::debug!(grant_type = request.grant_type().as_str(), "token request");
    let body = match &request {
        OAuthRequest::Token(params) => build_oauth_req_body(config, params)?,
        OAuthRequest::ClientCredentials(params) => build_oauth_req_body(config, params)?,
        OAuthRequest::Refresh(params) => build_oauth_req_body(config, params)?,
        OAuthRequest::Password(params) => build_oauth_req_body(config, params)?,
    };
    let req = Request::builder()
        .uri(url.as_str())
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::ACCEPT, "application/json")
        .body(body.into_bytes())?;
    let res = client
        .send_http(req)
        .await
        .map_err(|e| RequestError::transport(e).with_url(url.as_str()))?;
    let response: OAuthTokenResponse = json_body(&res, StatusCode::OK)
        .map_err(|e| e.with_url(url.as_str()))
        .and_then(|value| Ok(serde_json::from_value(value)?))?;
    Ok(AccessToken::from_response(response, Utc::now()))
}

/// Check the status and surface an OAuth `error` body regardless of status.
fn json_body(res: &Response<Vec<u8>>, expected: StatusCode) -> Result<Value> {
    let status = res.status();
    let body: Option<Value> = serde_json::from_slice(res.body()).ok();
    if let Some(err) = body.as_ref().and_then(provider_error) {
        return Err(RequestError::identity_provider(status, err));
    }
    if status != expected {
        return Err(RequestError::http_status(status));
    }
    match body {
        Some(value) => Ok(value),
        // surface the real parse error
        None => Ok(serde_json::from_slice(res.body())?),
    }
}

fn provider_error(body: &Value) -> Option<OAuthErrorResponse> {
    let error = body.get("error")?.as_str().filter(|e| !e.is_empty())?;
    Some(OAuthErrorResponse {
        error: SmolStr::new(error),
        error_description: body
            .get("error_description")
            .and_then(Value::as_str)
            .map(SmolStr::new),
    })
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn exchange_code<T>(client: &T, config: &ProviderConfig, code: &str) -> Result<AccessToken>
where
    T: HttpClient + Send + Sync,
{
    oauth_request(
        client,
        config,
        OAuthRequest::Token(TokenRequestParameters {
            grant_type: TokenGrantType::AuthorizationCode,
            code,
            redirect_uri: config.redirect_uri.as_str(),
        }),
    )
    .await
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn client_credentials<T>(client: &T, config: &ProviderConfig) -> Result<AccessToken>
where
    T: HttpClient + Send + Sync,
{
    oauth_request(
        client,
        config,
        OAuthRequest::ClientCredentials(ClientCredentialsParameters {
            grant_type: TokenGrantType::ClientCredentials,
            scope: None,
        }),
    )
    .await
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn refresh<T>(client: &T, config: &ProviderConfig, token: &AccessToken) -> Result<AccessToken>
where
    T: HttpClient + Send + Sync,
{
    let Some(refresh_token) = token.refresh_token.as_deref() else {
        return Err(RequestError::no_refresh_token());
    };
    oauth_request(
        client,
        config,
        OAuthRequest::Refresh(RefreshRequestParameters {
            grant_type: TokenGrantType::RefreshToken,
            refresh_token,
        }),
    )
    .await
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(username = username)))]
pub async fn password_grant<T>(
    client: &T,
    config: &ProviderConfig,
    username: &str,
    password: &str,
) -> Result<AccessToken>
where
    T: HttpClient + Send + Sync,
{
    oauth_request(
        client,
        config,
        OAuthRequest::Password(PasswordRequestParameters {
            grant_type: TokenGrantType::Password,
            username,
            password,
            scope: None,
        }),
    )
    .await
}

async fn bearer_get<T>(client: &T, url: &Url, token: &AccessToken) -> Result<Response<Vec<u8>>>
where
    T: HttpClient + Send + Sync,
{
    let req = Request::builder()
        .uri(url.as_str())
        .method(Method::GET)
        .header(header::AUTHORIZATION, format!("Bearer {}", token.value()))
        .header(header::ACCEPT, "application/json")
        .body(Vec::new())?;
    client
        .send_http(req)
        .await
        .map_err(|e| RequestError::transport(e).with_url(url.as_str()))
}

/// Fetch the resource-owner profile. Returns either the JSON object or,
/// when the provider signs/encrypts userinfo, the compact token as a string.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn userinfo<T>(client: &T, config: &ProviderConfig, token: &AccessToken) -> Result<Value>
where
    T: HttpClient + Send + Sync,
{
    let url = config.userinfo_endpoint()?;
    let res = bearer_get(client, &url, token).await?;
    if res.status() == StatusCode::OK {
        if let Ok(text) = std::str::from_utf8(res.body()) {
            let text = text.trim();
            if !text.starts_with('{') && !text.is_empty() {
                return Ok(Value::String(text.to_owned()));
            }
        }
    }
    json_body(&res, StatusCode::OK).map_err(|e| e.with_url(url.as_str()))
}

/// Fetch the entitlement (RPT) response for the configured client.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn entitlement<T>(client: &T, config: &ProviderConfig, token: &AccessToken) -> Result<Value>
where
    T: HttpClient + Send + Sync,
{
    let url = config.entitlement_endpoint()?;
    let res = bearer_get(client, &url, token).await?;
    json_body(&res, StatusCode::OK).map_err(|e| e.with_url(url.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response as HttpResponse;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockClient {
        queue: Arc<Mutex<VecDeque<HttpResponse<Vec<u8>>>>>,
        requests: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
    }

    impl MockClient {
        async fn push(&self, status: StatusCode, body: Value) {
            self.queue.lock().await.push_back(
                HttpResponse::builder()
                    .status(status)
                    .body(serde_json::to_vec(&body).unwrap())
                    .unwrap(),
            );
        }
    }

    impl HttpClient for MockClient {
        type Error = std::convert::Infallible;
        fn send_http(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> impl core::future::Future<
            Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
        > + Send {
            let queue = self.queue.clone();
            let requests = self.requests.clone();
            async move {
                requests.lock().await.push(request);
                Ok(queue.lock().await.pop_front().expect("no queued response"))
            }
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig::builder()
            .auth_server_url(Url::parse("http://kc/auth").unwrap())
            .realm("master")
            .client_id("api-server")
            .client_secret("s3cret")
            .redirect_uri(Url::parse("http://app/callback").unwrap())
            .build()
    }

    fn form(req: &http::Request<Vec<u8>>) -> Vec<(String, String)> {
        serde_html_form::from_bytes(req.body()).unwrap()
    }

    #[tokio::test]
    async fn exchange_code_posts_form() {
        let client = MockClient::default();
        client
            .push(
                StatusCode::OK,
                json!({"access_token": "tok", "expires_in": 300, "refresh_token": "ref"}),
            )
            .await;
        let token = exchange_code(&client, &config(), "the-code").await.unwrap();
        assert_eq!(token.value(), "tok");
        assert_eq!(token.refresh_token.as_deref(), Some("ref"));
        assert!(token.expires_at.is_some());

        let requests = client.requests.lock().await;
        let req = &requests[0];
        assert_eq!(req.method(), Method::POST);
        assert_eq!(
            req.uri().to_string(),
            "http://kc/auth/realms/master/protocol/openid-connect/token"
        );
        let form = form(req);
        assert!(form.contains(&("grant_type".into(), "authorization_code".into())));
        assert!(form.contains(&("code".into(), "the-code".into())));
        assert!(form.contains(&("client_id".into(), "api-server".into())));
        assert!(form.contains(&("client_secret".into(), "s3cret".into())));
        assert!(form.contains(&("redirect_uri".into(), "http://app/callback".into())));
    }

    #[tokio::test]
    async fn provider_error_body_becomes_identity_provider() {
        let client = MockClient::default();
        client
            .push(
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid_grant", "error_description": "Code not valid"}),
            )
            .await;
        let err = exchange_code(&client, &config(), "stale").await.unwrap_err();
        assert!(matches!(
            err.kind(),
            RequestErrorKind::IdentityProvider { status, error, .. }
                if *status == StatusCode::BAD_REQUEST && error == "invalid_grant"
        ));
        assert_eq!(err.to_string(), "invalid_grant: Code not valid");
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn error_field_wins_even_on_success_status() {
        let client = MockClient::default();
        client
            .push(StatusCode::OK, json!({"error": "unauthorized_client"}))
            .await;
        let err = client_credentials(&client, &config()).await.unwrap_err();
        assert!(matches!(
            err.kind(),
            RequestErrorKind::IdentityProvider { .. }
        ));
    }

    #[tokio::test]
    async fn bare_status_failure() {
        let client = MockClient::default();
        client
            .push(StatusCode::SERVICE_UNAVAILABLE, json!(null))
            .await;
        let err = password_grant(&client, &config(), "admin", "pw")
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            RequestErrorKind::HttpStatus(s) if *s == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token() {
        let client = MockClient::default();
        let err = refresh(&client, &config(), &AccessToken::new("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), RequestErrorKind::NoRefreshToken));
        assert!(client.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn userinfo_and_entitlement_send_bearer() {
        let client = MockClient::default();
        client.push(StatusCode::OK, json!({"sub": "u1"})).await;
        client.push(StatusCode::OK, json!({"rpt": "a.b.c"})).await;
        let token = AccessToken::new("tok");

        let profile = userinfo(&client, &config(), &token).await.unwrap();
        assert_eq!(profile["sub"], "u1");
        let rpt = entitlement(&client, &config(), &token).await.unwrap();
        assert_eq!(rpt["rpt"], "a.b.c");

        let requests = client.requests.lock().await;
        assert_eq!(
            requests[1].uri().to_string(),
            "http://kc/auth/realms/master/authz/entitlement/api-server"
        );
        for req in requests.iter() {
            assert_eq!(req.headers()[header::AUTHORIZATION], "Bearer tok");
        }
    }

    #[tokio::test]
    async fn userinfo_passes_compact_token_through() {
        let client = MockClient::default();
        client.queue.lock().await.push_back(
            HttpResponse::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/jwt")
                .body(b"h.p.s".to_vec())
                .unwrap(),
        );
        let profile = userinfo(&client, &config(), &AccessToken::new("tok"))
            .await
            .unwrap();
        assert_eq!(profile, Value::String("h.p.s".into()));
    }

    #[test]
    fn wrapped_error_keeps_diagnostics_and_url() {
        use miette::Diagnostic;

        let err = RequestError::http_status(StatusCode::BAD_GATEWAY)
            .with_help("is the provider up?")
            .with_url("http://kc/auth/realms/master/protocol/openid-connect/token");
        assert_eq!(
            err.request_url(),
            Some("http://kc/auth/realms/master/protocol/openid-connect/token")
        );

        let wrapped = crate::OAuthError::Request(err);
        assert_eq!(
            wrapped.help().map(|help| help.to_string()).as_deref(),
            Some("is the provider up?")
        );
        assert!(wrapped.url().is_none());
        assert_eq!(wrapped.status(), Some(StatusCode::BAD_GATEWAY));
    }
}
