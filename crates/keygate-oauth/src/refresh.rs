use keygate_common::{http_client::HttpClient, session::SessionStore};
use serde_json::Value;
use smol_str::SmolStr;

use crate::{config::ProviderConfig, request, store::TokenStore};

/// Swaps the stored token for a renewed one using its refresh token.
pub struct TokenRefresher<'a, C, S> {
    client: &'a C,
    config: &'a ProviderConfig,
    store: &'a TokenStore<S>,
}

impl<'a, C, S> TokenRefresher<'a, C, S>
where
    C: HttpClient + Send + Sync,
    S: SessionStore<SmolStr, Value>,
{
    pub fn new(client: &'a C, config: &'a ProviderConfig, store: &'a TokenStore<S>) -> Self {
        Self {
            client,
            config,
            store,
        }
    }

    /// Returns whether a renewed token is now stored. Any failure clears the
    /// store and yields `false`; nothing is raised.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn refresh(&self) -> bool {
        let Some(current) = self.store.get().await else {
            self.forget().await;
            return false;
        };
        let renewed = match request::refresh(self.client, self.config, &current).await {
            Ok(token) => token,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "failed to refresh token");
                self.forget().await;
                return false;
            }
        };
        match self.store.set(renewed).await {
            Ok(()) => true,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "failed to store refreshed token");
                self.forget().await;
                false
            }
        }
    }

    async fn forget(&self) {
        if let Err(_err) = self.store.clear().await {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_err, "failed to clear token");
        }
    }
}
