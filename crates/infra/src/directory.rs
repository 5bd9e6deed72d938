//! Product/location directory collaborator.
//!
//! The warehouse core only needs to know whether a product or location exists
//! and is active. Unknown ids answer `false`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use wms_core::{LocationId, ProductId};

use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

#[async_trait]
pub trait Directory: Send + Sync + 'static {
    async fn is_product_active(&self, id: ProductId) -> Result<bool, StoreError>;

    async fn is_location_active(&self, id: LocationId) -> Result<bool, StoreError>;
}

#[async_trait]
impl<D> Directory for Arc<D>
where
    D: Directory,
{
    async fn is_product_active(&self, id: ProductId) -> Result<bool, StoreError> {
        (**self).is_product_active(id).await
    }

    async fn is_location_active(&self, id: LocationId) -> Result<bool, StoreError> {
        (**self).is_location_active(id).await
    }
}

/// Seed file shape: `{ "products": [{ "id": ..., "active": true }], "locations": [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub products: Vec<SeedEntry>,
    #[serde(default)]
    pub locations: Vec<SeedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub id: Uuid,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Directory held in memory (tests/dev).
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    products: Arc<RwLock<HashMap<ProductId, bool>>>,
    locations: Arc<RwLock<HashMap<LocationId, bool>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let products = seed
            .products
            .into_iter()
            .map(|p| (ProductId::from_uuid(p.id), p.active))
            .collect();
        let locations = seed
            .locations
            .into_iter()
            .map(|l| (LocationId::from_uuid(l.id), l.active))
            .collect();
        Self {
            products: Arc::new(RwLock::new(products)),
            locations: Arc::new(RwLock::new(locations)),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_seed(serde_json::from_str(raw)?))
    }

    pub fn register_product(&self, id: ProductId, active: bool) -> Result<(), StoreError> {
        self.products
            .write()
            .map_err(|_| poisoned())?
            .insert(id, active);
        Ok(())
    }

    pub fn register_location(&self, id: LocationId, active: bool) -> Result<(), StoreError> {
        self.locations
            .write()
            .map_err(|_| poisoned())?
            .insert(id, active);
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("directory lock poisoned".into())
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn is_product_active(&self, id: ProductId) -> Result<bool, StoreError> {
        let products = self
            .products
            .read()
            .map_err(|_| poisoned())?;
        Ok(products.get(&id).copied().unwrap_or(false))
    }

    async fn is_location_active(&self, id: LocationId) -> Result<bool, StoreError> {
        let locations = self
            .locations
            .read()
            .map_err(|_| poisoned())?;
        Ok(locations.get(&id).copied().unwrap_or(false))
    }
}

/// Directory backed by the `products` / `locations` tables.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn is_active(&self, sql: &'static str, id: Uuid) -> Result<bool, StoreError> {
        let active: Option<bool> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("directory_lookup", e))?;
        Ok(active.unwrap_or(false))
    }
}

#[async_trait]
impl Directory for PostgresDirectory {
    async fn is_product_active(&self, id: ProductId) -> Result<bool, StoreError> {
        self.is_active("SELECT is_active FROM products WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn is_location_active(&self, id: LocationId) -> Result<bool, StoreError> {
        self.is_active("SELECT is_active FROM locations WHERE id = $1", *id.as_uuid())
            .await
    }
}
