use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

use wms_core::{DeliveryId, DocumentKind, InboundId, OutboundId, PaymentId};
use wms_delivery::Delivery;
use wms_inbound::InboundDocument;
use wms_inventory::{LedgerEntry, StockBalance, StockKey};
use wms_outbound::OutboundDocument;
use wms_payments::Payment;

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors. Any of them
/// aborts the unit of work it occurred in.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Stale version token, or a unique key (document number, external
    /// payment id, tracking number, idempotency key) already taken.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached or failed the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded into its aggregate.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Stock balances and the append-only movement ledger.
///
/// Saving follows the same rules for every aggregate: version `0` inserts, any
/// other version must match the stored row, and on success the aggregate is
/// told its new version.
#[async_trait]
pub trait StockRepository: Send {
    async fn load_balance(&mut self, key: StockKey) -> Result<Option<StockBalance>, StoreError>;

    async fn save_balance(&mut self, balance: &mut StockBalance) -> Result<(), StoreError>;

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// History of one stock key, oldest first.
    async fn ledger_entries(&mut self, key: StockKey) -> Result<Vec<LedgerEntry>, StoreError>;
}

#[async_trait]
pub trait InboundRepository: Send {
    async fn load_inbound(&mut self, id: InboundId) -> Result<Option<InboundDocument>, StoreError>;

    async fn save_inbound(&mut self, doc: &mut InboundDocument) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OutboundRepository: Send {
    async fn load_outbound(&mut self, id: OutboundId)
    -> Result<Option<OutboundDocument>, StoreError>;

    async fn save_outbound(&mut self, doc: &mut OutboundDocument) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send {
    /// Loads the payment together with its event log.
    async fn load_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Loads the payment and pins it: a change committed by another
    /// transaction before this one commits turns this commit into a conflict.
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    async fn find_payment_by_external_id(
        &mut self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// Persists the payment and any event log entries not stored yet.
    async fn save_payment(&mut self, payment: &mut Payment) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeliveryRepository: Send {
    async fn load_delivery(&mut self, id: DeliveryId) -> Result<Option<Delivery>, StoreError>;

    async fn find_delivery_by_tracking(
        &mut self,
        tracking_number: &str,
    ) -> Result<Option<Delivery>, StoreError>;

    async fn save_delivery(&mut self, delivery: &mut Delivery) -> Result<(), StoreError>;
}

/// One transaction spanning every repository.
///
/// Dropping a handle without committing discards its writes.
#[async_trait]
pub trait UnitOfWork:
    StockRepository + InboundRepository + OutboundRepository + PaymentRepository + DeliveryRepository
{
    /// Highest sequence already issued for `kind` on `date`, if any.
    async fn highest_sequence(
        &mut self,
        kind: DocumentKind,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Factory of transaction handles.
#[async_trait]
pub trait WarehouseStore: Send + Sync + 'static {
    type Tx: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
impl<S> WarehouseStore for Arc<S>
where
    S: WarehouseStore,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}
