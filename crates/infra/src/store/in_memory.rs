use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use wms_core::{AggregateRoot, DeliveryId, DocumentKind, InboundId, OutboundId, PaymentId};
use wms_delivery::Delivery;
use wms_inbound::InboundDocument;
use wms_inventory::{LedgerEntry, StockBalance, StockKey};
use wms_outbound::OutboundDocument;
use wms_payments::Payment;

use super::r#trait::{
    DeliveryRepository, InboundRepository, OutboundRepository, PaymentRepository,
    StockRepository, StoreError, UnitOfWork, WarehouseStore,
};

/// Committed rows plus the staged writes of an open transaction.
#[derive(Debug, Clone, Default)]
struct Tables {
    balances: HashMap<StockKey, StockBalance>,
    ledger: Vec<LedgerEntry>,
    inbound: HashMap<InboundId, InboundDocument>,
    outbound: HashMap<OutboundId, OutboundDocument>,
    payments: HashMap<PaymentId, Payment>,
    deliveries: HashMap<DeliveryId, Delivery>,
}

/// In-memory warehouse store.
///
/// Intended for tests/dev. Transactions stage their writes privately and are
/// validated against the committed rows at commit time (optimistic, first
/// committer wins).
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouseStore {
    committed: Arc<Mutex<Tables>>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WarehouseStore for InMemoryWarehouseStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        Ok(InMemoryTx {
            committed: self.committed.clone(),
            staged: Tables::default(),
            locked_payments: HashMap::new(),
        })
    }
}

/// Transaction handle of [`InMemoryWarehouseStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    committed: Arc<Mutex<Tables>>,
    staged: Tables,
    /// Payment versions read through `lock_payment`; they must still be current at commit.
    locked_payments: HashMap<PaymentId, u64>,
}

impl InMemoryTx {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self
            .committed
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn committed_version<K, V>(
        &self,
        table: impl FnOnce(&Tables) -> &HashMap<K, V>,
        key: &K,
    ) -> Result<u64, StoreError>
    where
        K: Eq + Hash,
        V: AggregateRoot,
    {
        self.read(|t| table(t).get(key).map(|v| v.version()).unwrap_or(0))
    }
}

/// Staging rule shared by every aggregate: the caller's version must match the
/// newest copy visible to this transaction.
fn stage<K, V>(
    staged: &mut HashMap<K, V>,
    visible_version: u64,
    key: K,
    row: &mut V,
    set_version: impl FnOnce(&mut V, u64),
) -> Result<(), StoreError>
where
    K: Eq + Hash + std::fmt::Display,
    V: AggregateRoot + Clone,
{
    // Rows saved twice in one transaction keep the version of their first save.
    let (current, next) = match staged.get(&key) {
        Some(s) => (s.version(), s.version()),
        None => (visible_version, visible_version + 1),
    };
    if row.version() != current {
        return Err(StoreError::Conflict(format!(
            "{key}: expected version {}, found {current}",
            row.version()
        )));
    }
    set_version(row, next);
    staged.insert(key, row.clone());
    Ok(())
}

/// A staged row may only replace the committed row it was derived from.
fn check_versions<K, V>(staged: &HashMap<K, V>, committed: &HashMap<K, V>) -> Result<(), StoreError>
where
    K: Eq + Hash + std::fmt::Display,
    V: AggregateRoot,
{
    for (key, row) in staged {
        let base = committed.get(key).map(|c| c.version()).unwrap_or(0);
        if row.version() != base + 1 {
            return Err(StoreError::Conflict(format!(
                "{key} was modified by another transaction"
            )));
        }
    }
    Ok(())
}

/// `value_of` must stay unique across rows of a table.
fn check_unique<K, V>(
    staged: &HashMap<K, V>,
    committed: &HashMap<K, V>,
    what: &str,
    value_of: impl Fn(&V) -> Option<&str>,
) -> Result<(), StoreError>
where
    K: Eq + Hash,
{
    for (key, row) in staged {
        let Some(value) = value_of(row) else { continue };
        let taken_committed = committed
            .iter()
            .any(|(k, other)| k != key && !staged.contains_key(k) && value_of(other) == Some(value));
        let taken_staged = staged
            .iter()
            .any(|(k, other)| k != key && value_of(other) == Some(value));
        if taken_committed || taken_staged {
            return Err(StoreError::Conflict(format!("{what} '{value}' already exists")));
        }
    }
    Ok(())
}

fn staged_or<K: Eq + Hash + Clone, V: Clone>(
    staged: &HashMap<K, V>,
    key: &K,
    committed: impl FnOnce() -> Result<Option<V>, StoreError>,
) -> Result<Option<V>, StoreError> {
    match staged.get(key) {
        Some(v) => Ok(Some(v.clone())),
        None => committed(),
    }
}

#[async_trait]
impl StockRepository for InMemoryTx {
    async fn load_balance(&mut self, key: StockKey) -> Result<Option<StockBalance>, StoreError> {
        staged_or(&self.staged.balances, &key, || {
            self.read(|t| t.balances.get(&key).cloned())
        })
    }

    async fn save_balance(&mut self, balance: &mut StockBalance) -> Result<(), StoreError> {
        let key = balance.key();
        let visible = self.committed_version(|t| &t.balances, &key)?;
        stage(&mut self.staged.balances, visible, key, balance, |b, v| {
            b.set_persisted_version(v)
        })
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.staged.ledger.push(entry.clone());
        Ok(())
    }

    async fn ledger_entries(&mut self, key: StockKey) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries = self.read(|t| {
            t.ledger
                .iter()
                .filter(|e| e.key == key)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        entries.extend(self.staged.ledger.iter().filter(|e| e.key == key).cloned());
        Ok(entries)
    }
}

#[async_trait]
impl InboundRepository for InMemoryTx {
    async fn load_inbound(&mut self, id: InboundId) -> Result<Option<InboundDocument>, StoreError> {
        staged_or(&self.staged.inbound, &id, || {
            self.read(|t| t.inbound.get(&id).cloned())
        })
    }

    async fn save_inbound(&mut self, doc: &mut InboundDocument) -> Result<(), StoreError> {
        let id = doc.id_typed();
        let visible = self.committed_version(|t| &t.inbound, &id)?;
        stage(&mut self.staged.inbound, visible, id, doc, |d, v| {
            d.set_persisted_version(v)
        })
    }
}

#[async_trait]
impl OutboundRepository for InMemoryTx {
    async fn load_outbound(
        &mut self,
        id: OutboundId,
    ) -> Result<Option<OutboundDocument>, StoreError> {
        staged_or(&self.staged.outbound, &id, || {
            self.read(|t| t.outbound.get(&id).cloned())
        })
    }

    async fn save_outbound(&mut self, doc: &mut OutboundDocument) -> Result<(), StoreError> {
        let id = doc.id_typed();
        let visible = self.committed_version(|t| &t.outbound, &id)?;
        stage(&mut self.staged.outbound, visible, id, doc, |d, v| {
            d.set_persisted_version(v)
        })
    }
}

#[async_trait]
impl PaymentRepository for InMemoryTx {
    async fn load_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        staged_or(&self.staged.payments, &id, || {
            self.read(|t| t.payments.get(&id).cloned())
        })
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let payment = self.load_payment(id).await?;
        if let Some(p) = &payment {
            if !self.staged.payments.contains_key(&id) {
                self.locked_payments.insert(id, p.version());
            }
        }
        Ok(payment)
    }

    async fn find_payment_by_external_id(
        &mut self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let matches = |p: &Payment| p.external_payment_id() == Some(external_payment_id);
        if let Some(p) = self.staged.payments.values().find(|p| matches(p)) {
            return Ok(Some(p.clone()));
        }
        self.read(|t| t.payments.values().find(|p| matches(p)).cloned())
    }

    async fn save_payment(&mut self, payment: &mut Payment) -> Result<(), StoreError> {
        let id = payment.id_typed();
        let visible = self.committed_version(|t| &t.payments, &id)?;
        stage(&mut self.staged.payments, visible, id, payment, |p, v| {
            p.set_persisted_version(v)
        })
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryTx {
    async fn load_delivery(&mut self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        staged_or(&self.staged.deliveries, &id, || {
            self.read(|t| t.deliveries.get(&id).cloned())
        })
    }

    async fn find_delivery_by_tracking(
        &mut self,
        tracking_number: &str,
    ) -> Result<Option<Delivery>, StoreError> {
        let matches = |d: &Delivery| d.tracking_number() == tracking_number;
        if let Some(d) = self.staged.deliveries.values().find(|d| matches(d)) {
            return Ok(Some(d.clone()));
        }
        self.read(|t| t.deliveries.values().find(|d| matches(d)).cloned())
    }

    async fn save_delivery(&mut self, delivery: &mut Delivery) -> Result<(), StoreError> {
        let id = delivery.id_typed();
        let visible = self.committed_version(|t| &t.deliveries, &id)?;
        stage(&mut self.staged.deliveries, visible, id, delivery, |d, v| {
            d.set_persisted_version(v)
        })
    }
}

#[async_trait]
impl UnitOfWork for InMemoryTx {
    async fn highest_sequence(
        &mut self,
        kind: DocumentKind,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError> {
        fn numbers(t: &Tables, kind: DocumentKind) -> Vec<String> {
            match kind {
                DocumentKind::Inbound => t.inbound.values().map(|d| d.number().to_string()).collect(),
                DocumentKind::Outbound => t.outbound.values().map(|d| d.number().to_string()).collect(),
                DocumentKind::Payment => t.payments.values().map(|p| p.number().to_string()).collect(),
                DocumentKind::Delivery => {
                    t.deliveries.values().map(|d| d.number().to_string()).collect()
                }
            }
        }

        let mut all = self.read(|t| numbers(t, kind))?;
        all.extend(numbers(&self.staged, kind));
        Ok(kind.highest_sequence(date, all.iter().map(String::as_str)))
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut tables = self
            .committed
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let staged = self.staged;

        for (id, version) in &self.locked_payments {
            if tables.payments.get(id).map(|p| p.version()) != Some(*version) {
                return Err(StoreError::Conflict(format!(
                    "{id} was modified by another transaction"
                )));
            }
        }
        check_versions(&staged.balances, &tables.balances)?;
        check_versions(&staged.inbound, &tables.inbound)?;
        check_versions(&staged.outbound, &tables.outbound)?;
        check_versions(&staged.payments, &tables.payments)?;
        check_versions(&staged.deliveries, &tables.deliveries)?;

        check_unique(&staged.inbound, &tables.inbound, "inbound number", |d| Some(d.number()))?;
        check_unique(&staged.outbound, &tables.outbound, "outbound number", |d| Some(d.number()))?;
        check_unique(&staged.payments, &tables.payments, "payment number", |p| Some(p.number()))?;
        check_unique(
            &staged.payments,
            &tables.payments,
            "external payment id",
            |p| p.external_payment_id(),
        )?;
        check_unique(&staged.deliveries, &tables.deliveries, "delivery number", |d| Some(d.number()))?;
        check_unique(
            &staged.deliveries,
            &tables.deliveries,
            "tracking number",
            |d| Some(d.tracking_number()),
        )?;

        tables.balances.extend(staged.balances);
        tables.ledger.extend(staged.ledger);
        tables.inbound.extend(staged.inbound);
        tables.outbound.extend(staged.outbound);
        tables.payments.extend(staged.payments);
        tables.deliveries.extend(staged.deliveries);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
