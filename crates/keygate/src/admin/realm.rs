use keygate_common::http_client::HttpClient;
use smol_str::SmolStr;

use super::{AdminClient, Find, Result};
use super::types::{Client, Realm};

/// `{admin}/realms`. Read-only.
pub struct Realms<'a, C> {
    admin: &'a AdminClient<C>,
}

impl<'a, C> Realms<'a, C> {
    pub(crate) fn new(admin: &'a AdminClient<C>) -> Self {
        Self { admin }
    }
}

impl<C> Find for Realms<'_, C>
where
    C: HttpClient + Send + Sync,
{
    type Entity = Realm;

    async fn find_all(&self) -> Result<Vec<Realm>> {
        let url = self.admin.url(&["realms"])?;
        self.admin.get_json(&url).await
    }

    /// By realm name.
    async fn find(&self, name: &str) -> Result<Realm> {
        let url = self.admin.url(&["realms", name])?;
        self.admin.get_json(&url).await
    }
}

/// `{admin}/realms/{realm}/clients`. Read-only.
pub struct Clients<'a, C> {
    admin: &'a AdminClient<C>,
    realm: SmolStr,
}

impl<'a, C> Clients<'a, C> {
    pub(crate) fn new(admin: &'a AdminClient<C>, realm: SmolStr) -> Self {
        Self { admin, realm }
    }

    /// Realm these clients belong to.
    pub fn realm(&self) -> &str {
        &self.realm
    }
}

impl<C> Find for Clients<'_, C>
where
    C: HttpClient + Send + Sync,
{
    type Entity = Client;

    async fn find_all(&self) -> Result<Vec<Client>> {
        let url = self.admin.url(&["realms", self.realm.as_str(), "clients"])?;
        self.admin.get_json(&url).await
    }

    /// By client UUID, not `clientId`.
    async fn find(&self, id: &str) -> Result<Client> {
        let url = self
            .admin
            .url(&["realms", self.realm.as_str(), "clients", id])?;
        self.admin.get_json(&url).await
    }
}
