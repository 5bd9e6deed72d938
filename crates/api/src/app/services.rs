//! Storage and directory wiring for the two supported backends.

use std::path::Path;

use anyhow::Context;

use wms_infra::{
    InMemoryDirectory, InMemoryWarehouseStore, PostgresDirectory, PostgresWarehouseStore,
    Warehouse,
};

pub type InMemoryWarehouse = Warehouse<InMemoryWarehouseStore, InMemoryDirectory>;
pub type PostgresWarehouse = Warehouse<PostgresWarehouseStore, PostgresDirectory>;

/// In-memory storage; the directory is seeded from a JSON file when given.
pub fn in_memory(seed: Option<&Path>) -> anyhow::Result<InMemoryWarehouse> {
    let directory = match seed {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading directory seed {}", path.display()))?;
            let directory = InMemoryDirectory::from_json(&raw)
                .with_context(|| format!("parsing directory seed {}", path.display()))?;
            tracing::info!(path = %path.display(), "directory seeded");
            directory
        }
        None => {
            tracing::warn!("no directory seed configured; every product and location is unknown");
            InMemoryDirectory::new()
        }
    };
    Ok(Warehouse::new(InMemoryWarehouseStore::new(), directory))
}

/// Postgres storage with the schema applied; the directory reads the same database.
pub async fn postgres(database_url: &str) -> anyhow::Result<PostgresWarehouse> {
    let store = PostgresWarehouseStore::connect(database_url)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("applying schema")?;
    let directory = PostgresDirectory::new(store.pool().clone());
    tracing::info!("postgres storage ready");
    Ok(Warehouse::new(store, directory))
}
