//! What an admin entity can do. Each endpoint implements only the traits
//! the provider actually exposes, so asking a read-only endpoint to create
//! or delete does not compile:
//!
//! ```compile_fail
//! use keygate::admin::{AdminClient, Create, Realm};
//!
//! async fn add(admin: &AdminClient<reqwest::Client>) {
//!     admin.realms().create(&Realm::default()).await;
//! }
//! ```

use std::future::Future;

use super::Result;

/// Read access.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait Find {
    /// Representation returned by the endpoint.
    type Entity;

    /// Every entity of this kind.
    fn find_all(&self) -> impl Future<Output = Result<Vec<Self::Entity>>>;

    /// One entity by its key (name for realms, id otherwise).
    fn find(&self, id: &str) -> impl Future<Output = Result<Self::Entity>>;
}

/// Creation. Returns the entity as stored, with its assigned id.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait Create: Find {
    /// POST `entity` to the collection.
    fn create(&self, entity: &Self::Entity) -> impl Future<Output = Result<Self::Entity>>;
}

/// Replacement. `Ok(true)` iff the provider answered 204.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait Update: Find {
    /// PUT `entity` over the one stored under `id`.
    fn update(&self, id: &str, entity: &Self::Entity) -> impl Future<Output = Result<bool>>;
}

/// Removal. `Ok(true)` iff the provider answered 204.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait Delete: Find {
    /// DELETE the entity stored under `id`.
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>>;
}
