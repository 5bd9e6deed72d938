//! Stock queries and manual adjustments.

use chrono::Utc;
use tracing::{info, instrument};

use wms_core::DomainError;
use wms_inventory::{LedgerEntry, StockBalance, StockKey};

use super::{FlowResult, Warehouse, finish};
use crate::directory::Directory;
use crate::ledger;
use crate::store::{StockRepository, WarehouseStore};

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Current balance; an all-zero balance when nothing has moved yet.
    pub async fn stock_balance(&self, key: StockKey) -> FlowResult<StockBalance> {
        let mut tx = self.store().begin().await?;
        let result = tx.load_balance(key).await.map_err(Into::into);
        let balance = finish(tx, result).await?;
        Ok(balance.unwrap_or_else(|| StockBalance::empty(key, Utc::now())))
    }

    /// Ledger history of one product+location, oldest first.
    pub async fn stock_ledger(&self, key: StockKey) -> FlowResult<Vec<LedgerEntry>> {
        let mut tx = self.store().begin().await?;
        let result = tx.ledger_entries(key).await.map_err(Into::into);
        finish(tx, result).await
    }

    /// Correct on-hand stock by `delta`; a decrease may only consume available stock.
    #[instrument(skip(self, reason), fields(key = %key), err)]
    pub async fn adjust_stock(
        &self,
        key: StockKey,
        delta: i64,
        reason: &str,
        actor: &str,
    ) -> FlowResult<LedgerEntry> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::missing_field("reason").into());
        }
        let directory_errors = self.directory_errors([(key.product_id, key.location_id)]).await?;
        if !directory_errors.is_empty() {
            return Err(DomainError::InvalidLines(directory_errors).into());
        }

        let mut tx = self.store().begin().await?;
        let result = ledger::adjust(&mut tx, key, delta, reason, actor, Utc::now()).await;
        let entry = finish(tx, result).await?;
        info!(delta, balance_after = entry.balance_after, "stock adjusted");
        Ok(entry)
    }
}
