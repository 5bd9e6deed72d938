//! Postgres-backed warehouse store.
//!
//! One database transaction per unit of work. Optimistic concurrency is
//! enforced with `UPDATE ... WHERE version = $n`; unique keys and ledger
//! invariants are backed by constraints in `schema.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |
//! | Other | N/A | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use wms_core::{
    AggregateRoot, DeliveryId, DocumentKind, EntryId, InboundId, LocationId, OutboundId,
    PaymentId, ProductId, StatusMachine,
};
use wms_delivery::{Delivery, DeliveryEvent};
use wms_inbound::InboundDocument;
use wms_inventory::{DocumentRef, LedgerEntry, MovementKind, StockBalance, StockKey};
use wms_outbound::OutboundDocument;
use wms_payments::{Payment, PaymentEvent};

use super::r#trait::{
    DeliveryRepository, InboundRepository, OutboundRepository, PaymentRepository,
    StockRepository, StoreError, UnitOfWork, WarehouseStore,
};

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Clone)]
pub struct PostgresWarehouseStore {
    pool: Arc<PgPool>,
}

impl PostgresWarehouseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Install the schema (safe to run on every start).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl WarehouseStore for PostgresWarehouseStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

/// Transaction handle of [`PostgresWarehouseStore`]. Rolls back when dropped uncommitted.
#[derive(Debug)]
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

/// Columns shared by every JSONB-backed document table.
struct DocumentRow<'a> {
    table: &'static str,
    id: Uuid,
    number: &'a str,
    status: &'static str,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl PostgresTx {
    async fn load_document<T: DeserializeOwned>(
        &mut self,
        table: &'static str,
        column: &'static str,
        key: impl for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    ) -> Result<Option<(Uuid, T, u64)>, StoreError> {
        let sql = format!("SELECT id, document, version FROM {table} WHERE {column} = $1");
        self.fetch_document(table, &sql, key).await
    }

    /// [`load_document`](Self::load_document) holding a row lock until the transaction ends.
    async fn load_document_for_update<T: DeserializeOwned>(
        &mut self,
        table: &'static str,
        column: &'static str,
        key: impl for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    ) -> Result<Option<(Uuid, T, u64)>, StoreError> {
        let sql =
            format!("SELECT id, document, version FROM {table} WHERE {column} = $1 FOR UPDATE");
        self.fetch_document(table, &sql, key).await
    }

    async fn fetch_document<T: DeserializeOwned>(
        &mut self,
        table: &'static str,
        sql: &str,
        key: impl for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    ) -> Result<Option<(Uuid, T, u64)>, StoreError> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;

        let Some(row) = row else { return Ok(None) };
        let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error(table, e))?;
        let document: JsonValue = row.try_get("document").map_err(|e| map_sqlx_error(table, e))?;
        let version: i64 = row.try_get("version").map_err(|e| map_sqlx_error(table, e))?;
        let value = serde_json::from_value(document)
            .map_err(|e| StoreError::Corrupt(format!("{table} {id}: {e}")))?;
        Ok(Some((id, value, version as u64)))
    }

    /// Insert (version 0) or version-checked update of a document row.
    ///
    /// `extra` lists additional `(column, value)` pairs written on insert only.
    async fn save_document<T: Serialize>(
        &mut self,
        row: DocumentRow<'_>,
        value: &T,
        extra: &[(&'static str, Option<String>)],
        outbound_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let document = serde_json::to_value(value)
            .map_err(|e| StoreError::Corrupt(format!("{} {}: {e}", row.table, row.id)))?;

        if row.version == 0 {
            let mut columns = vec!["id", "number", "status", "version", "document", "updated_at"];
            if outbound_id.is_some() {
                columns.push("outbound_id");
            }
            columns.extend(extra.iter().map(|(c, _)| *c));
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                row.table,
                columns.join(", "),
                placeholders.join(", ")
            );

            let mut query = sqlx::query(&sql)
                .bind(row.id)
                .bind(row.number)
                .bind(row.status)
                .bind(1_i64)
                .bind(&document)
                .bind(row.updated_at);
            if let Some(outbound_id) = outbound_id {
                query = query.bind(outbound_id);
            }
            for (_, v) in extra {
                query = query.bind(v.clone());
            }
            query
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error(row.table, e))?;
        } else {
            let sql = format!(
                "UPDATE {} SET status = $2, version = version + 1, document = $3, updated_at = $4 \
                 WHERE id = $1 AND version = $5",
                row.table
            );
            let result = sqlx::query(&sql)
                .bind(row.id)
                .bind(row.status)
                .bind(&document)
                .bind(row.updated_at)
                .bind(row.version as i64)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error(row.table, e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "{} {} was modified by another transaction (expected version {})",
                    row.table, row.id, row.version
                )));
            }
        }
        Ok(())
    }

    async fn load_events<E: DeserializeOwned>(
        &mut self,
        table: &'static str,
        owner_column: &'static str,
        owner: Uuid,
    ) -> Result<Vec<E>, StoreError> {
        let sql = format!("SELECT event FROM {table} WHERE {owner_column} = $1 ORDER BY seq ASC");
        let rows = sqlx::query(&sql)
            .bind(owner)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;

        rows.iter()
            .map(|row| {
                let event: JsonValue = row.try_get("event").map_err(|e| map_sqlx_error(table, e))?;
                serde_json::from_value(event)
                    .map_err(|e| StoreError::Corrupt(format!("{table} of {owner}: {e}")))
            })
            .collect()
    }

    /// Append log entries; entries already stored are skipped by id.
    #[allow(clippy::too_many_arguments)]
    async fn append_event<E: Serialize>(
        &mut self,
        table: &'static str,
        owner_column: &'static str,
        owner: Uuid,
        id: EntryId,
        kind: &str,
        idempotency_key: Option<&str>,
        processed: bool,
        recorded_at: DateTime<Utc>,
        event: &E,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| StoreError::Corrupt(format!("{table} {id}: {e}")))?;
        let sql = format!(
            "INSERT INTO {table} (id, {owner_column}, kind, idempotency_key, processed, recorded_at, event) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (id) DO NOTHING"
        );
        sqlx::query(&sql)
            .bind(*id.as_uuid())
            .bind(owner)
            .bind(kind)
            .bind(idempotency_key)
            .bind(processed)
            .bind(recorded_at)
            .bind(payload)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;
        Ok(())
    }
}

#[async_trait]
impl StockRepository for PostgresTx {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn load_balance(&mut self, key: StockKey) -> Result<Option<StockBalance>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, location_id, quantity_on_hand, quantity_reserved, version, updated_at
            FROM stock_balances
            WHERE product_id = $1 AND location_id = $2
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_balance", e))?;

        let Some(row) = row else { return Ok(None) };
        let row = BalanceRow::from_row(&row).map_err(|e| map_sqlx_error("load_balance", e))?;
        StockBalance::restore(
            key,
            row.quantity_on_hand,
            row.quantity_reserved,
            row.version as u64,
            row.updated_at,
        )
        .map(Some)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn save_balance(&mut self, balance: &mut StockBalance) -> Result<(), StoreError> {
        let key = balance.key();
        if balance.version() == 0 {
            sqlx::query(
                r#"
                INSERT INTO stock_balances
                    (product_id, location_id, quantity_on_hand, quantity_reserved, version, updated_at)
                VALUES ($1, $2, $3, $4, 1, $5)
                "#,
            )
            .bind(key.product_id.as_uuid())
            .bind(key.location_id.as_uuid())
            .bind(balance.on_hand())
            .bind(balance.reserved())
            .bind(balance.updated_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_balance", e))?;
        } else {
            let result = sqlx::query(
                r#"
                UPDATE stock_balances
                SET quantity_on_hand = $3, quantity_reserved = $4, version = version + 1, updated_at = $5
                WHERE product_id = $1 AND location_id = $2 AND version = $6
                "#,
            )
            .bind(key.product_id.as_uuid())
            .bind(key.location_id.as_uuid())
            .bind(balance.on_hand())
            .bind(balance.reserved())
            .bind(balance.updated_at())
            .bind(balance.version() as i64)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_balance", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "stock balance {key} was modified by another transaction"
                )));
            }
        }
        balance.set_persisted_version(balance.version() + 1);
        Ok(())
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, kind, product_id, location_id, quantity, balance_before, balance_after,
                reference_id, reference_number, created_at, actor
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.key.product_id.as_uuid())
        .bind(entry.key.location_id.as_uuid())
        .bind(entry.quantity)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.reference.id)
        .bind(&entry.reference.number)
        .bind(entry.created_at)
        .bind(&entry.actor)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;
        Ok(())
    }

    async fn ledger_entries(&mut self, key: StockKey) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, product_id, location_id, quantity, balance_before, balance_after,
                   reference_id, reference_number, created_at, actor
            FROM ledger_entries
            WHERE product_id = $1 AND location_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("ledger_entries", e))?;

        rows.iter()
            .map(|row| {
                LedgerRow::from_row(row)
                    .map_err(|e| map_sqlx_error("ledger_entries", e))?
                    .try_into()
            })
            .collect()
    }
}

#[async_trait]
impl InboundRepository for PostgresTx {
    async fn load_inbound(&mut self, id: InboundId) -> Result<Option<InboundDocument>, StoreError> {
        let loaded = self
            .load_document::<InboundDocument>("inbound_documents", "id", *id.as_uuid())
            .await?;
        Ok(loaded.map(|(_, mut doc, version)| {
            doc.set_persisted_version(version);
            doc
        }))
    }

    async fn save_inbound(&mut self, doc: &mut InboundDocument) -> Result<(), StoreError> {
        let row = DocumentRow {
            table: "inbound_documents",
            id: *doc.id_typed().as_uuid(),
            number: doc.number(),
            status: doc.status().as_str(),
            version: doc.version(),
            updated_at: doc.audit().updated_at,
        };
        self.save_document(row, &*doc, &[], None).await?;
        doc.set_persisted_version(doc.version() + 1);
        Ok(())
    }
}

#[async_trait]
impl OutboundRepository for PostgresTx {
    async fn load_outbound(
        &mut self,
        id: OutboundId,
    ) -> Result<Option<OutboundDocument>, StoreError> {
        let loaded = self
            .load_document::<OutboundDocument>("outbound_documents", "id", *id.as_uuid())
            .await?;
        Ok(loaded.map(|(_, mut doc, version)| {
            doc.set_persisted_version(version);
            doc
        }))
    }

    async fn save_outbound(&mut self, doc: &mut OutboundDocument) -> Result<(), StoreError> {
        let row = DocumentRow {
            table: "outbound_documents",
            id: *doc.id_typed().as_uuid(),
            number: doc.number(),
            status: doc.status().as_str(),
            version: doc.version(),
            updated_at: doc.audit().updated_at,
        };
        self.save_document(row, &*doc, &[], None).await?;
        doc.set_persisted_version(doc.version() + 1);
        Ok(())
    }
}

impl PostgresTx {
    async fn hydrate_payment(
        &mut self,
        loaded: Option<(Uuid, Payment, u64)>,
    ) -> Result<Option<Payment>, StoreError> {
        let Some((id, payment, version)) = loaded else { return Ok(None) };
        let events: Vec<PaymentEvent> = self.load_events("payment_events", "payment_id", id).await?;
        let mut payment = payment.with_events(events);
        payment.set_persisted_version(version);
        Ok(Some(payment))
    }

    async fn hydrate_delivery(
        &mut self,
        loaded: Option<(Uuid, Delivery, u64)>,
    ) -> Result<Option<Delivery>, StoreError> {
        let Some((id, delivery, version)) = loaded else { return Ok(None) };
        let events: Vec<DeliveryEvent> = self.load_events("delivery_events", "delivery_id", id).await?;
        let mut delivery = delivery.with_events(events);
        delivery.set_persisted_version(version);
        Ok(Some(delivery))
    }
}

#[async_trait]
impl PaymentRepository for PostgresTx {
    async fn load_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let loaded = self.load_document("payments", "id", *id.as_uuid()).await?;
        self.hydrate_payment(loaded).await
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let loaded = self
            .load_document_for_update("payments", "id", *id.as_uuid())
            .await?;
        self.hydrate_payment(loaded).await
    }

    async fn find_payment_by_external_id(
        &mut self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let loaded = self
            .load_document("payments", "external_payment_id", external_payment_id.to_string())
            .await?;
        self.hydrate_payment(loaded).await
    }

    async fn save_payment(&mut self, payment: &mut Payment) -> Result<(), StoreError> {
        let owner = *payment.id_typed().as_uuid();
        let row = DocumentRow {
            table: "payments",
            id: owner,
            number: payment.number(),
            status: payment.status().as_str(),
            version: payment.version(),
            updated_at: payment.audit().updated_at,
        };
        let extra = [(
            "external_payment_id",
            payment.external_payment_id().map(str::to_string),
        )];
        self.save_document(row, &*payment, &extra, Some(*payment.outbound_id().as_uuid()))
            .await?;

        for event in payment.events() {
            self.append_event(
                "payment_events",
                "payment_id",
                owner,
                event.id,
                event.kind.as_str(),
                event.idempotency_key.as_deref(),
                event.processed,
                event.recorded_at,
                event,
            )
            .await?;
        }
        payment.set_persisted_version(payment.version() + 1);
        Ok(())
    }
}

#[async_trait]
impl DeliveryRepository for PostgresTx {
    async fn load_delivery(&mut self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        let loaded = self.load_document("deliveries", "id", *id.as_uuid()).await?;
        self.hydrate_delivery(loaded).await
    }

    async fn find_delivery_by_tracking(
        &mut self,
        tracking_number: &str,
    ) -> Result<Option<Delivery>, StoreError> {
        let loaded = self
            .load_document("deliveries", "tracking_number", tracking_number.to_string())
            .await?;
        self.hydrate_delivery(loaded).await
    }

    async fn save_delivery(&mut self, delivery: &mut Delivery) -> Result<(), StoreError> {
        let owner = *delivery.id_typed().as_uuid();
        let row = DocumentRow {
            table: "deliveries",
            id: owner,
            number: delivery.number(),
            status: delivery.status().as_str(),
            version: delivery.version(),
            updated_at: delivery.audit().updated_at,
        };
        let extra = [("tracking_number", Some(delivery.tracking_number().to_string()))];
        self.save_document(row, &*delivery, &extra, Some(*delivery.outbound_id().as_uuid()))
            .await?;

        for event in delivery.events() {
            self.append_event(
                "delivery_events",
                "delivery_id",
                owner,
                event.id,
                event.kind.as_str(),
                event.idempotency_key.as_deref(),
                event.processed,
                event.recorded_at,
                event,
            )
            .await?;
        }
        delivery.set_persisted_version(delivery.version() + 1);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresTx {
    async fn highest_sequence(
        &mut self,
        kind: DocumentKind,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError> {
        let table = match kind {
            DocumentKind::Inbound => "inbound_documents",
            DocumentKind::Outbound => "outbound_documents",
            DocumentKind::Payment => "payments",
            DocumentKind::Delivery => "deliveries",
        };
        let sql = format!("SELECT number FROM {table} WHERE number LIKE $1");
        let rows = sqlx::query(&sql)
            .bind(format!("{}%", kind.day_prefix(date)))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("highest_sequence", e))?;

        let numbers = rows
            .iter()
            .map(|r| r.try_get::<String, _>("number"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("highest_sequence", e))?;
        Ok(kind.highest_sequence(date, numbers.iter().map(String::as_str)))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to store errors.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("undecodable row in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct BalanceRow {
    quantity_on_hand: i64,
    quantity_reserved: i64,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BalanceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BalanceRow {
            quantity_on_hand: row.try_get("quantity_on_hand")?,
            quantity_reserved: row.try_get("quantity_reserved")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug)]
struct LedgerRow {
    id: Uuid,
    kind: String,
    product_id: Uuid,
    location_id: Uuid,
    quantity: i64,
    balance_before: i64,
    balance_after: i64,
    reference_id: Option<Uuid>,
    reference_number: String,
    created_at: DateTime<Utc>,
    actor: String,
}

impl<'r> FromRow<'r, PgRow> for LedgerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            product_id: row.try_get("product_id")?,
            location_id: row.try_get("location_id")?,
            quantity: row.try_get("quantity")?,
            balance_before: row.try_get("balance_before")?,
            balance_after: row.try_get("balance_after")?,
            reference_id: row.try_get("reference_id")?,
            reference_number: row.try_get("reference_number")?,
            created_at: row.try_get("created_at")?,
            actor: row.try_get("actor")?,
        })
    }
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::parse(&row.kind)
            .map_err(|e| StoreError::Corrupt(format!("ledger entry {}: {e}", row.id)))?;
        Ok(LedgerEntry {
            id: EntryId::from_uuid(row.id),
            kind,
            key: StockKey::new(
                ProductId::from_uuid(row.product_id),
                LocationId::from_uuid(row.location_id),
            ),
            quantity: row.quantity,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reference: DocumentRef {
                id: row.reference_id,
                number: row.reference_number,
            },
            created_at: row.created_at,
            actor: row.actor,
        })
    }
}
