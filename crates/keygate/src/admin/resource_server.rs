use http::Method;
use keygate_common::http_client::HttpClient;
use url::Url;

use super::types::{Policy, Resource, UserPolicy};
use super::{AdminClient, Create, Delete, Find, Result, Update};
use keygate_oauth::config::join_segments;

/// Authorization services of one client:
/// `{admin}/realms/{realm}/clients/{uuid}/authz/resource-server`.
pub struct ResourceServer<'a, C> {
    admin: &'a AdminClient<C>,
    base: Url,
}

impl<'a, C> ResourceServer<'a, C> {
    pub(crate) fn new(admin: &'a AdminClient<C>, base: Url) -> Self {
        Self { admin, base }
    }

    /// Base URL of the resource server.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Protected resources.
    pub fn resources(&self) -> Resources<'a, C> {
        Resources {
            admin: self.admin,
            base: self.base.clone(),
        }
    }

    /// Authorization policies.
    pub fn policies(&self) -> Policies<'a, C> {
        Policies {
            admin: self.admin,
            base: self.base.clone(),
        }
    }
}

fn under(base: &Url, segments: &[&str]) -> Result<Url> {
    Ok(join_segments(base, segments)?)
}

/// `.../resource`: full CRUD, keyed by `_id`.
pub struct Resources<'a, C> {
    admin: &'a AdminClient<C>,
    base: Url,
}

impl<C> Find for Resources<'_, C>
where
    C: HttpClient + Send + Sync,
{
    type Entity = Resource;

    async fn find_all(&self) -> Result<Vec<Resource>> {
        let url = under(&self.base, &["resource"])?;
        self.admin.get_json(&url).await
    }

    async fn find(&self, id: &str) -> Result<Resource> {
        let url = under(&self.base, &["resource", id])?;
        self.admin.get_json(&url).await
    }
}

impl<C> Create for Resources<'_, C>
where
    C: HttpClient + Send + Sync,
{
    async fn create(&self, entity: &Resource) -> Result<Resource> {
        let url = under(&self.base, &["resource"])?;
        self.admin.post_json(&url, entity).await
    }
}

impl<C> Update for Resources<'_, C>
where
    C: HttpClient + Send + Sync,
{
    async fn update(&self, id: &str, entity: &Resource) -> Result<bool> {
        let url = under(&self.base, &["resource", id])?;
        self.admin.no_content(Method::PUT, &url, Some(entity)).await
    }
}

impl<C> Delete for Resources<'_, C>
where
    C: HttpClient + Send + Sync,
{
    async fn delete(&self, id: &str) -> Result<bool> {
        let url = under(&self.base, &["resource", id])?;
        self.admin.no_content::<()>(Method::DELETE, &url, None).await
    }
}

/// `.../policy`: every policy type, read-only. Permissions are excluded.
pub struct Policies<'a, C> {
    admin: &'a AdminClient<C>,
    base: Url,
}

impl<'a, C> Policies<'a, C> {
    /// User policies, which can also be written.
    pub fn users(&self) -> UserPolicies<'a, C> {
        UserPolicies {
            admin: self.admin,
            base: self.base.clone(),
        }
    }
}

impl<C> Find for Policies<'_, C>
where
    C: HttpClient + Send + Sync,
{
    type Entity = Policy;

    async fn find_all(&self) -> Result<Vec<Policy>> {
        let mut url = under(&self.base, &["policy"])?;
        url.query_pairs_mut().append_pair("permission", "false");
        self.admin.get_json(&url).await
    }

    async fn find(&self, id: &str) -> Result<Policy> {
        let url = under(&self.base, &["policy", id])?;
        self.admin.get_json(&url).await
    }
}

/// `.../policy/user`: full CRUD.
pub struct UserPolicies<'a, C> {
    admin: &'a AdminClient<C>,
    base: Url,
}

impl<C> Find for UserPolicies<'_, C>
where
    C: HttpClient + Send + Sync,
{
    type Entity = UserPolicy;

    /// Lists all policies and keeps the user ones.
    async fn find_all(&self) -> Result<Vec<UserPolicy>> {
        let mut url = under(&self.base, &["policy"])?;
        url.query_pairs_mut()
            .append_pair("permission", "false")
            .append_pair("type", Policy::TYPE_USER);
        let all: Vec<Policy> = self.admin.get_json(&url).await?;
        Ok(all.iter().filter_map(Policy::as_user_policy).collect())
    }

    async fn find(&self, id: &str) -> Result<UserPolicy> {
        let url = under(&self.base, &["policy", Policy::TYPE_USER, id])?;
        self.admin.get_json(&url).await
    }
}

impl<C> Create for UserPolicies<'_, C>
where
    C: HttpClient + Send + Sync,
{
    async fn create(&self, entity: &UserPolicy) -> Result<UserPolicy> {
        let url = under(&self.base, &["policy", Policy::TYPE_USER])?;
        self.admin.post_json(&url, entity).await
    }
}

impl<C> Update for UserPolicies<'_, C>
where
    C: HttpClient + Send + Sync,
{
    async fn update(&self, id: &str, entity: &UserPolicy) -> Result<bool> {
        let url = under(&self.base, &["policy", Policy::TYPE_USER, id])?;
        self.admin.no_content(Method::PUT, &url, Some(entity)).await
    }
}

impl<C> Delete for UserPolicies<'_, C>
where
    C: HttpClient + Send + Sync,
{
    async fn delete(&self, id: &str) -> Result<bool> {
        let url = under(&self.base, &["policy", Policy::TYPE_USER, id])?;
        self.admin.no_content::<()>(Method::DELETE, &url, None).await
    }
}
