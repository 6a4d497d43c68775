use chrono::Utc;
use keygate_common::session::SessionStore;
use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::AccessToken;

/// Session key holding the pending CSRF state.
pub const STATE_KEY: &str = "oauth2state";
/// Session key holding the serialized [`AccessToken`].
pub const TOKEN_KEY: &str = "oauth2token";

/// Holds the current access token of one session.
///
/// The session is authoritative. A process-local shadow copy answers reads
/// when the session hands back something that is not a token.
pub struct TokenStore<S> {
    session: S,
    shadow: RwLock<Option<AccessToken>>,
}

impl<S> TokenStore<S>
where
    S: SessionStore<SmolStr, Value>,
{
    pub fn new(session: S) -> Self {
        Self {
            session,
            shadow: RwLock::new(None),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    async fn session_token(&self) -> Option<AccessToken> {
        let raw = self.session.get(&SmolStr::new_static(TOKEN_KEY)).await?;
        serde_json::from_value(raw).ok()
    }

    pub async fn get(&self) -> Option<AccessToken> {
        match self.session_token().await {
            Some(token) => Some(token),
            None => self.shadow.read().await.clone(),
        }
    }

    /// Replace the current token.
    pub async fn set(&self, token: AccessToken) -> Result<()> {
        let raw = serde_json::to_value(&token)?;
        self.session.set(SmolStr::new_static(TOKEN_KEY), raw).await?;
        *self.shadow.write().await = Some(token);
        Ok(())
    }

    /// Forget the token along with any pending state.
    pub async fn clear(&self) -> Result<()> {
        *self.shadow.write().await = None;
        self.session.del(&SmolStr::new_static(TOKEN_KEY)).await?;
        self.session.del(&SmolStr::new_static(STATE_KEY)).await?;
        Ok(())
    }

    /// True when the session itself holds a token.
    pub async fn exists(&self) -> bool {
        self.session_token().await.is_some()
    }

    /// An absent token counts as expired.
    pub async fn is_expired(&self) -> bool {
        match self.get().await {
            Some(token) => token.is_expired_at(Utc::now()),
            None => true,
        }
    }

    /// Bare bearer string of the current token.
    pub async fn value(&self) -> Option<SmolStr> {
        self.get().await.map(|token| token.access_token)
    }

    pub(crate) async fn put_state(&self, state: SmolStr) -> Result<()> {
        self.session
            .set(SmolStr::new_static(STATE_KEY), Value::String(state.into()))
            .await?;
        Ok(())
    }

    /// Read and remove the pending state. A state is good for one callback.
    pub(crate) async fn take_state(&self) -> Result<Option<SmolStr>> {
        let key = SmolStr::new_static(STATE_KEY);
        let state = self.session.get(&key).await;
        self.session.del(&key).await?;
        Ok(state.and_then(|v| v.as_str().map(SmolStr::new)))
    }
}
