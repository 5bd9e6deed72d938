//! Ledger Store operations.
//!
//! The only code path allowed to mutate a [`StockBalance`]. Each operation
//! loads the balance (creating it lazily), applies the domain arithmetic,
//! saves it and, for movements of on-hand stock, appends a [`LedgerEntry`],
//! all through the caller's transaction handle. Nothing is saved when the
//! arithmetic rejects the movement.

use chrono::{DateTime, Utc};
use tracing::debug;

use wms_inventory::{DocumentRef, LedgerEntry, MovementKind, StockBalance, StockKey};

use crate::flows::FlowResult;
use crate::store::{StockRepository, StoreError};

async fn load_or_empty<R: StockRepository>(
    repo: &mut R,
    key: StockKey,
    now: DateTime<Utc>,
) -> Result<StockBalance, StoreError> {
    Ok(repo
        .load_balance(key)
        .await?
        .unwrap_or_else(|| StockBalance::empty(key, now)))
}

/// Add `quantity` to on-hand and record a positive `Inbound` entry.
pub async fn increase<R: StockRepository>(
    repo: &mut R,
    key: StockKey,
    quantity: i64,
    reference: DocumentRef,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<LedgerEntry> {
    let mut balance = load_or_empty(repo, key, now).await?;
    let movement = balance.increase(quantity, now)?;
    record(repo, &mut balance, MovementKind::Inbound, movement, reference, actor, now).await
}

/// Allocate available stock. Writes no ledger entry.
pub async fn reserve<R: StockRepository>(
    repo: &mut R,
    key: StockKey,
    quantity: i64,
    now: DateTime<Utc>,
) -> FlowResult<()> {
    let mut balance = load_or_empty(repo, key, now).await?;
    balance.reserve(quantity, now)?;
    repo.save_balance(&mut balance).await?;
    debug!(%key, quantity, reserved = balance.reserved(), "stock reserved");
    Ok(())
}

/// Deduct reserved stock at ship time and record a negative `Outbound` entry.
pub async fn commit<R: StockRepository>(
    repo: &mut R,
    key: StockKey,
    quantity: i64,
    reference: DocumentRef,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<LedgerEntry> {
    let mut balance = load_or_empty(repo, key, now).await?;
    let movement = balance.commit(quantity, now)?;
    record(repo, &mut balance, MovementKind::Outbound, movement, reference, actor, now).await
}

/// Return reserved stock to available. Writes no ledger entry.
pub async fn release<R: StockRepository>(
    repo: &mut R,
    key: StockKey,
    quantity: i64,
    now: DateTime<Utc>,
) -> FlowResult<()> {
    let mut balance = load_or_empty(repo, key, now).await?;
    balance.release(quantity, now)?;
    repo.save_balance(&mut balance).await?;
    debug!(%key, quantity, reserved = balance.reserved(), "reservation released");
    Ok(())
}

/// Available quantity; `0` when the balance row does not exist yet.
pub async fn available<R: StockRepository>(repo: &mut R, key: StockKey) -> FlowResult<i64> {
    Ok(repo
        .load_balance(key)
        .await?
        .map(|b| b.available())
        .unwrap_or(0))
}

/// Manual on-hand correction recorded as an `Adjustment` entry.
pub async fn adjust<R: StockRepository>(
    repo: &mut R,
    key: StockKey,
    delta: i64,
    reason: &str,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<LedgerEntry> {
    let mut balance = load_or_empty(repo, key, now).await?;
    let movement = balance.adjust(delta, now)?;
    let reference = DocumentRef::adjustment(reason);
    record(repo, &mut balance, MovementKind::Adjustment, movement, reference, actor, now).await
}

#[allow(clippy::too_many_arguments)]
async fn record<R: StockRepository>(
    repo: &mut R,
    balance: &mut StockBalance,
    kind: MovementKind,
    movement: wms_inventory::Movement,
    reference: DocumentRef,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<LedgerEntry> {
    repo.save_balance(balance).await?;
    let entry = LedgerEntry::record(kind, balance.key(), movement, reference, actor, now);
    repo.append_entry(&entry).await?;
    debug!(
        key = %entry.key,
        kind = entry.kind.as_str(),
        quantity = entry.quantity,
        balance_after = entry.balance_after,
        "ledger entry appended"
    );
    Ok(entry)
}
