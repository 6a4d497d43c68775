use http::{Method, Request, Response, StatusCode, header};
use keygate_common::http_client::HttpClient;
use keygate_oauth::{
    OAuthError, ProviderConfig,
    config::join_segments,
    request::{self, RequestError},
};
use serde::{Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use url::Url;

mod capability;
mod realm;
mod resource_server;
// Wire representations; field names mirror the admin API.
#[allow(missing_docs)]
mod types;

pub use capability::{Create, Delete, Find, Update};
pub use realm::{Clients, Realms};
pub use resource_server::{Policies, ResourceServer, Resources, UserPolicies};
pub use types::{Client, OwnerRef, Policy, Realm, Resource, ScopeRef, UserPolicy};

/// Errors from the admin REST API.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AdminError {
    /// Token request or transport failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Request(#[from] RequestError),
    /// Configuration or URL problem
    #[error(transparent)]
    #[diagnostic(transparent)]
    OAuth(#[from] OAuthError),
    /// No client with this `clientId` in the realm
    #[error("realm `{realm}` has no client `{client_id}`")]
    #[diagnostic(code(keygate::admin::unknown_client))]
    UnknownClient {
        /// Realm searched
        realm: SmolStr,
        /// `clientId` looked for
        client_id: SmolStr,
    },
    /// The admin API answered with an unexpected status
    #[error("admin API returned {status} for {url}")]
    #[diagnostic(
        code(keygate::admin::status),
        help("check the admin user has the realm-management roles it needs")
    )]
    Status {
        /// Status received
        status: StatusCode,
        /// Request URL
        url: SmolStr,
    },
    /// Body could not be (de)serialized
    #[error("admin API JSON error: {0}")]
    #[diagnostic(code(keygate::admin::json))]
    Json(#[from] serde_json::Error),
}

impl From<http::Error> for AdminError {
    fn from(e: http::Error) -> Self {
        Self::Request(e.into())
    }
}

/// Result of an admin call.
pub type Result<T> = core::result::Result<T, AdminError>;

/// Client for the provider's admin REST API.
///
/// Every call authenticates with a fresh `password` grant for the admin
/// user; no admin token is kept between calls.
pub struct AdminClient<C> {
    client: C,
    config: ProviderConfig,
    username: SmolStr,
    password: SmolStr,
}

impl<C> AdminClient<C>
where
    C: HttpClient + Send + Sync,
{
    /// Admin calls authenticate as `username` against the configured realm.
    pub fn new(
        client: C,
        config: ProviderConfig,
        username: impl Into<SmolStr>,
        password: impl Into<SmolStr>,
    ) -> Self {
        Self {
            client,
            config,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Realms visible to the admin user.
    pub fn realms(&self) -> Realms<'_, C> {
        Realms::new(self)
    }

    /// Clients of `realm`, keyed by their UUID.
    pub fn clients(&self, realm: impl Into<SmolStr>) -> Clients<'_, C> {
        Clients::new(self, realm.into())
    }

    /// Authorization services of the client whose `clientId` is `client_id`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub async fn resource_server(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<ResourceServer<'_, C>> {
        let clients = self.clients(realm);
        let found = clients
            .find_all()
            .await?
            .into_iter()
            .find(|client| client.client_id == client_id);
        let Some(uuid) = found.and_then(|client| client.id) else {
            return Err(AdminError::UnknownClient {
                realm: realm.into(),
                client_id: client_id.into(),
            });
        };
        let base = self.url(&[
            "realms",
            realm,
            "clients",
            uuid.as_str(),
            "authz",
            "resource-server",
        ])?;
        Ok(ResourceServer::new(self, base))
    }

    /// `{admin}/{segments...}`
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
        Ok(join_segments(&self.config.admin_url()?, segments)?)
    }

    async fn send(&self, method: Method, url: &Url, body: Option<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let token =
            request::password_grant(&self.client, &self.config, &self.username, &self.password)
                .await?;
        let mut builder = Request::builder()
            .uri(url.as_str())
            .method(method)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.value()))
            .header(header::ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder.body(body.unwrap_or_default())?;
        Ok(self
            .client
            .send_http(req)
            .await
            .map_err(|e| RequestError::transport(e).with_url(url.as_str()))?)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %url)))]
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let res = self.send(Method::GET, url, None).await?;
        expect_status(&res, url, &[StatusCode::OK])?;
        Ok(serde_json::from_slice(res.body())?)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %url)))]
    pub(crate) async fn post_json<B, T>(&self, url: &Url, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let res = self
            .send(Method::POST, url, Some(serde_json::to_vec(body)?))
            .await?;
        expect_status(&res, url, &[StatusCode::OK, StatusCode::CREATED])?;
        Ok(serde_json::from_slice(res.body())?)
    }

    /// PUT/DELETE: `true` iff the provider answers 204.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %url)))]
    pub(crate) async fn no_content<B>(&self, method: Method, url: &Url, body: Option<&B>) -> Result<bool>
    where
        B: Serialize + Sync,
    {
        let body = body.map(serde_json::to_vec).transpose()?;
        let res = self.send(method, url, body).await?;
        Ok(res.status() == StatusCode::NO_CONTENT)
    }
}

fn expect_status(res: &Response<Vec<u8>>, url: &Url, accepted: &[StatusCode]) -> Result<()> {
    if accepted.contains(&res.status()) {
        Ok(())
    } else {
        Err(AdminError::Status {
            status: res.status(),
            url: url.as_str().into(),
        })
    }
}
