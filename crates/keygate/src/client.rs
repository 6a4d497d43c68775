use keygate_common::{http_client::HttpClient, session::SessionStore};
use keygate_oauth::{
    AccessToken, AuthorizationCodeFlow, CallbackRequest, ClaimsDecoder, FlowOutcome, OAuthError,
    PermissionEvaluator, Permissions, ProviderConfig, ResourceOwner, RoleEvaluator, Roles,
    TokenRefresher, TokenStore, request::RequestErrorKind,
};
use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::Mutex;
use url::Url;

/// Result of [`AuthOrchestrator::ensure_authenticated`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    /// A usable token is stored for this session.
    Authenticated(AccessToken),
    /// The authorization-code flow ran; follow its directive.
    Flow(FlowOutcome),
}

impl AuthStatus {
    /// The token, if the session ended up holding one.
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            Self::Authenticated(token) | Self::Flow(FlowOutcome::Completed { token, .. }) => {
                Some(token)
            }
            Self::Flow(_) => None,
        }
    }

    /// Where the browser should go next, if anywhere.
    pub fn redirect(&self) -> Option<&Url> {
        match self {
            Self::Authenticated(_) => None,
            Self::Flow(outcome) => outcome.redirect(),
        }
    }
}

/// Authentication and authorization for one principal's session.
///
/// Owns the HTTP client, provider configuration and claims decoder, and
/// keeps the token in a [`TokenStore`] over the caller's session. Build one
/// per request (or per session) and drop it afterwards; nothing runs in the
/// background.
pub struct AuthOrchestrator<C, S> {
    client: C,
    config: ProviderConfig,
    decoder: ClaimsDecoder,
    store: TokenStore<S>,
    /// Profile fetched for the access token it is keyed by.
    identity: Mutex<Option<(SmolStr, ResourceOwner)>>,
}

impl<C, S> AuthOrchestrator<C, S>
where
    C: HttpClient + Send + Sync,
    S: SessionStore<SmolStr, Value>,
{
    /// Build the decoder from `config` and wrap `session`.
    pub fn new(client: C, config: ProviderConfig, session: S) -> Result<Self, OAuthError> {
        let decoder = ClaimsDecoder::from_config(&config)?;
        Ok(Self::with_decoder(client, config, decoder, session))
    }

    /// Use an already-built decoder.
    pub fn with_decoder(
        client: C,
        config: ProviderConfig,
        decoder: ClaimsDecoder,
        session: S,
    ) -> Self {
        Self {
            client,
            config,
            decoder,
            store: TokenStore::new(session),
            identity: Mutex::new(None),
        }
    }

    /// Provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Decoder used for access tokens, RPTs and userinfo.
    pub fn decoder(&self) -> &ClaimsDecoder {
        &self.decoder
    }

    /// Token store over the session.
    pub fn store(&self) -> &TokenStore<S> {
        &self.store
    }

    /// HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The current token, expired or not.
    pub async fn token(&self) -> Option<AccessToken> {
        self.store.get().await
    }

    fn flow(&self) -> AuthorizationCodeFlow<'_, C, S> {
        AuthorizationCodeFlow::new(&self.client, &self.config, &self.decoder, &self.store)
    }

    fn refresher(&self) -> TokenRefresher<'_, C, S> {
        TokenRefresher::new(&self.client, &self.config, &self.store)
    }

    fn permissions(&self) -> PermissionEvaluator<'_, C> {
        PermissionEvaluator::new(&self.client, &self.config, &self.decoder)
    }

    fn roles(&self) -> RoleEvaluator<'_> {
        RoleEvaluator::new(&self.config, &self.decoder)
    }

    /// Fresh login URL. Replaces any pending state in the session.
    pub async fn login_url(&self) -> Result<Url, OAuthError> {
        self.flow().authorization_url().await
    }

    /// Make sure the session holds a usable token.
    ///
    /// In order: refresh an expired token; trade an inbound bearer for a
    /// token when the request carries no code; otherwise run the
    /// authorization-code flow and hand back its directive. A request that
    /// carries a code always goes through the flow, so its state is checked.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn ensure_authenticated(
        &self,
        callback: &CallbackRequest,
    ) -> Result<AuthStatus, OAuthError> {
        if let Some(current) = self.store.get().await {
            if !current.is_expired() {
                return Ok(AuthStatus::Authenticated(current));
            }
            if self.refresher().refresh().await {
                if let Some(renewed) = self.store.get().await {
                    return Ok(AuthStatus::Authenticated(renewed));
                }
            }
        }

        if let (None, Some(bearer)) = (callback.code.as_deref(), callback.bearer.as_deref()) {
            match self.flow().exchange_bearer(bearer).await {
                Ok(token) => {
                    self.store.set(token.clone()).await?;
                    return Ok(AuthStatus::Authenticated(token));
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %_err, "failed to exchange bearer token");
                    self.store.clear().await?;
                }
            }
        }

        Ok(AuthStatus::Flow(self.flow().begin_or_continue(callback).await?))
    }

    /// Profile of the current token's owner, `None` without a token.
    ///
    /// Fetched once per access token. When the provider rejects the token
    /// the session is logged out and the error returned.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn current_identity(&self) -> Result<Option<ResourceOwner>, OAuthError> {
        let Some(token) = self.store.get().await else {
            return Ok(None);
        };
        let mut cached = self.identity.lock().await;
        if let Some((key, owner)) = cached.as_ref() {
            if *key == token.access_token {
                return Ok(Some(owner.clone()));
            }
        }
        match ResourceOwner::fetch(&self.client, &self.config, &self.decoder, &token).await {
            Ok(owner) => {
                *cached = Some((token.access_token.clone(), owner.clone()));
                Ok(Some(owner))
            }
            Err(err) => {
                *cached = None;
                if is_provider_rejection(&err) {
                    self.store.clear().await?;
                }
                #[cfg(feature = "tracing")]
                tracing::error!(error = %err, "failed to get resource owner");
                Err(err)
            }
        }
    }

    /// Drop the token, any pending state and the cached profile.
    pub async fn logout(&self) -> Result<(), OAuthError> {
        *self.identity.lock().await = None;
        self.store.clear().await
    }

    /// All UMA permissions of the current token; empty without a token.
    pub async fn load_permissions(&self) -> Result<Permissions, OAuthError> {
        match self.store.get().await {
            Some(token) => self.permissions().load_permissions(&token).await,
            None => Ok(Permissions::default()),
        }
    }

    /// Whether the first permission for `resource` grants `scope`.
    pub async fn has_permission(&self, resource: &str, scope: &str) -> Result<bool, OAuthError> {
        match self.store.get().await {
            Some(token) => {
                self.permissions()
                    .has_permission(&token, resource, scope)
                    .await
            }
            None => Ok(false),
        }
    }

    /// Whether any permission names `resource`.
    pub async fn has_resource_permission(&self, resource: &str) -> Result<bool, OAuthError> {
        match self.store.get().await {
            Some(token) => {
                self.permissions()
                    .has_resource_permission(&token, resource)
                    .await
            }
            None => Ok(false),
        }
    }

    /// Whether any permission grants `scope`.
    pub async fn has_scope_permission(&self, scope: &str) -> Result<bool, OAuthError> {
        match self.store.get().await {
            Some(token) => self.permissions().has_scope_permission(&token, scope).await,
            None => Ok(false),
        }
    }

    /// Any of `roles` as a realm role or a role on the configured client.
    pub async fn has_role(&self, roles: impl Into<Roles>) -> Result<bool, OAuthError> {
        match self.store.get().await {
            Some(token) => self.roles().has_role(&token, roles),
            None => Ok(false),
        }
    }

    /// Any of `roles` as a realm role.
    pub async fn has_realm_role(&self, roles: impl Into<Roles>) -> Result<bool, OAuthError> {
        match self.store.get().await {
            Some(token) => self.roles().has_realm_role(&token, roles),
            None => Ok(false),
        }
    }

    /// Any of `roles` on `resource`, or on the configured client when `None`.
    pub async fn has_resource_role(
        &self,
        roles: impl Into<Roles>,
        resource: Option<&str>,
    ) -> Result<bool, OAuthError> {
        match self.store.get().await {
            Some(token) => self.roles().has_resource_role(&token, roles, resource),
            None => Ok(false),
        }
    }
}

fn is_provider_rejection(err: &OAuthError) -> bool {
    matches!(
        err,
        OAuthError::Request(req) if matches!(req.kind(), RequestErrorKind::IdentityProvider { .. })
    )
}
