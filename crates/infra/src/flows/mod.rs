//! Warehouse flows.
//!
//! Every operation runs as one unit of work:
//!
//! ```text
//! begin → load aggregate(s) → validate → ledger effects → save → commit
//! ```
//!
//! Any failure on the way rolls the whole transaction back, so a document's
//! status and the stock it moved can never diverge.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use wms_core::{DocumentKind, DomainError, LocationId, ProductId};

use crate::directory::Directory;
use crate::store::{StoreError, UnitOfWork, WarehouseStore};

pub mod deliveries;
pub mod inbound;
pub mod outbound;
pub mod payments;
pub mod stock;

/// Attempts of a unit of work that lost a race on a version or unique key.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Failure of a warehouse flow.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    /// Deterministic business failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failure; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FlowError {
    /// Per-line messages of a multi-field failure.
    pub fn errors(&self) -> &[String] {
        match self {
            FlowError::Domain(e) => e.errors(),
            FlowError::Store(_) => &[],
        }
    }

    /// Stale version token or unique-key clash, from either layer.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            FlowError::Domain(DomainError::Conflict(_)) | FlowError::Store(StoreError::Conflict(_))
        )
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

/// Commit on success, roll back otherwise.
pub(crate) async fn finish<T, Tx: UnitOfWork>(tx: Tx, result: FlowResult<T>) -> FlowResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Entry point of the warehouse core: a store plus the directory collaborator.
///
/// Flow operations are grouped per document type in the submodules.
#[derive(Debug, Clone)]
pub struct Warehouse<S, D> {
    store: S,
    directory: D,
}

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    pub fn new(store: S, directory: D) -> Self {
        Self { store, directory }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// `line N: ...` messages for every inactive product or location.
    pub(crate) async fn directory_errors(
        &self,
        lines: impl IntoIterator<Item = (ProductId, LocationId)>,
    ) -> FlowResult<Vec<String>> {
        let mut errors = Vec::new();
        for (i, (product, location)) in lines.into_iter().enumerate() {
            if !self.directory.is_product_active(product).await? {
                errors.push(format!("line {}: product {product} is not active", i + 1));
            }
            if !self.directory.is_location_active(location).await? {
                errors.push(format!("line {}: location {location} is not active", i + 1));
            }
        }
        Ok(errors)
    }
}

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Run a document-creating unit of work, starting over when its commit
    /// clashes with a concurrent writer (usually on the document number).
    pub(crate) async fn create_with_retry<T, F, Fut>(&self, kind: DocumentKind, mut unit: F) -> FlowResult<T>
    where
        F: FnMut(S::Tx) -> Fut,
        Fut: Future<Output = (S::Tx, FlowResult<T>)>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let tx = self.store().begin().await?;
            let (tx, result) = unit(tx).await;
            match finish(tx, result).await {
                Err(FlowError::Store(StoreError::Conflict(reason))) if attempt < MAX_ATTEMPTS => {
                    warn!(kind = kind.prefix(), attempt, %reason, "create raced another writer, retrying");
                }
                other => return other,
            }
        }
    }
}

/// Next free document number of `kind` for the day of `now`.
pub(crate) async fn next_number<Tx: UnitOfWork>(
    tx: &mut Tx,
    kind: DocumentKind,
    now: DateTime<Utc>,
) -> FlowResult<String> {
    let date = now.date_naive();
    let highest = tx.highest_sequence(kind, date).await?;
    Ok(kind.next_number(date, highest))
}

/// Merge shape errors with directory errors, failing if any remain.
pub(crate) fn reject_lines(mut errors: Vec<String>, more: Vec<String>) -> FlowResult<()> {
    errors.extend(more);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DomainError::InvalidLines(errors).into())
    }
}
