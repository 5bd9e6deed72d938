//! Payment-gateway and delivery-partner webhook processors.
//!
//! Both run the idempotency algorithm of [`wms_core::webhook::ingest`] inside
//! one unit of work, so the audit entry and any status change are committed
//! together. A notice racing another writer of the same aggregate is retried
//! from a fresh transaction; on retry an already-applied key resolves as a
//! duplicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use wms_core::webhook::{ingest, required};
use wms_core::{DomainError, DomainResult, WebhookNotice, WebhookOutcome, WebhookTarget};
use wms_delivery::{Delivery, DeliveryDetails};
use wms_payments::Payment;

use crate::directory::Directory;
use crate::flows::{FlowResult, MAX_ATTEMPTS, Warehouse, finish};
use crate::store::{DeliveryRepository, PaymentRepository, StoreError, UnitOfWork, WarehouseStore};

/// Payment-gateway notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    pub external_payment_id: Option<String>,
    pub gateway_event_id: Option<String>,
    pub status: Option<String>,
    pub event_data: Option<JsonValue>,
    pub gateway_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl PaymentWebhook {
    /// Correlation key plus the validated notice.
    pub fn into_notice(self) -> DomainResult<(String, WebhookNotice<()>)> {
        let external_payment_id = required("externalPaymentId", self.external_payment_id)?;
        let idempotency_key = required("gatewayEventId", self.gateway_event_id)?;
        let status = required("status", self.status)?;
        let event_data = match self.event_data {
            Some(data) if !data.is_null() => data,
            _ => return Err(DomainError::missing_field("eventData")),
        };
        Ok((
            external_payment_id,
            WebhookNotice {
                idempotency_key,
                status,
                event_data,
                occurred_at: self.gateway_timestamp,
                notes: self.notes,
                details: (),
            },
        ))
    }
}

/// Delivery-partner notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWebhook {
    pub tracking_number: Option<String>,
    pub partner_event_id: Option<String>,
    pub status: Option<String>,
    pub current_location: Option<String>,
    pub event_timestamp: Option<DateTime<Utc>>,
    pub event_data: Option<JsonValue>,
    pub notes: Option<String>,
}

impl DeliveryWebhook {
    pub fn into_notice(self) -> DomainResult<(String, WebhookNotice<DeliveryDetails>)> {
        let tracking_number = required("trackingNumber", self.tracking_number)?;
        let idempotency_key = required("partnerEventId", self.partner_event_id)?;
        let status = required("status", self.status)?;
        Ok((
            tracking_number,
            WebhookNotice {
                idempotency_key,
                status,
                event_data: self.event_data.unwrap_or(JsonValue::Null),
                occurred_at: self.event_timestamp,
                notes: self.notes,
                details: DeliveryDetails {
                    current_location: self.current_location.filter(|l| !l.trim().is_empty()),
                },
            },
        ))
    }
}

/// An aggregate located by an external correlation key.
#[async_trait]
trait Correlated: WebhookTarget + Send + Sized {
    const SOURCE: &'static str;

    async fn find<Tx: UnitOfWork>(tx: &mut Tx, key: &str) -> Result<Option<Self>, StoreError>;

    async fn store<Tx: UnitOfWork>(tx: &mut Tx, target: &mut Self) -> Result<(), StoreError>;
}

#[async_trait]
impl Correlated for Payment {
    const SOURCE: &'static str = "payment";

    async fn find<Tx: UnitOfWork>(tx: &mut Tx, key: &str) -> Result<Option<Self>, StoreError> {
        tx.find_payment_by_external_id(key).await
    }

    async fn store<Tx: UnitOfWork>(tx: &mut Tx, target: &mut Self) -> Result<(), StoreError> {
        tx.save_payment(target).await
    }
}

#[async_trait]
impl Correlated for Delivery {
    const SOURCE: &'static str = "delivery";

    async fn find<Tx: UnitOfWork>(tx: &mut Tx, key: &str) -> Result<Option<Self>, StoreError> {
        tx.find_delivery_by_tracking(key).await
    }

    async fn store<Tx: UnitOfWork>(tx: &mut Tx, target: &mut Self) -> Result<(), StoreError> {
        tx.save_delivery(target).await
    }
}

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Apply a payment-gateway notification.
    ///
    /// Only missing fields fail; every other result is reported as an outcome.
    #[instrument(
        skip(self, payload),
        fields(gateway_event_id = payload.gateway_event_id.as_deref().unwrap_or_default()),
        err
    )]
    pub async fn process_payment_webhook(
        &self,
        payload: PaymentWebhook,
    ) -> FlowResult<WebhookOutcome> {
        let (external_payment_id, notice) = payload.into_notice()?;
        self.ingest_with_retry::<Payment>(&external_payment_id, &notice)
            .await
    }

    /// Apply a delivery-partner notification.
    #[instrument(
        skip(self, payload),
        fields(partner_event_id = payload.partner_event_id.as_deref().unwrap_or_default()),
        err
    )]
    pub async fn process_delivery_webhook(
        &self,
        payload: DeliveryWebhook,
    ) -> FlowResult<WebhookOutcome> {
        let (tracking_number, notice) = payload.into_notice()?;
        self.ingest_with_retry::<Delivery>(&tracking_number, &notice)
            .await
    }

    async fn ingest_with_retry<T>(
        &self,
        key: &str,
        notice: &WebhookNotice<T::Details>,
    ) -> FlowResult<WebhookOutcome>
    where
        T: Correlated,
        T::Details: Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store().begin().await?;
            let result = ingest_once::<T, _>(&mut tx, key, notice).await;
            match finish(tx, result).await {
                Err(err) if err.is_conflict() && attempt < MAX_ATTEMPTS => {
                    warn!(source = T::SOURCE, attempt, error = %err, "webhook raced another writer, retrying");
                }
                Ok(outcome) => {
                    report(T::SOURCE, key, &notice.idempotency_key, &outcome);
                    return Ok(outcome);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn ingest_once<T, Tx>(
    tx: &mut Tx,
    key: &str,
    notice: &WebhookNotice<T::Details>,
) -> FlowResult<WebhookOutcome>
where
    T: Correlated,
    T::Details: Send + Sync,
    Tx: UnitOfWork,
{
    let Some(mut target) = T::find(tx, key).await? else {
        return Ok(WebhookOutcome::NotFound {
            key: key.to_string(),
        });
    };
    let outcome = ingest(&mut target, notice, Utc::now());
    T::store(tx, &mut target).await?;
    Ok(outcome)
}

fn report(source: &str, key: &str, event_id: &str, outcome: &WebhookOutcome) {
    match outcome {
        WebhookOutcome::Processed { status } => {
            info!(source, key, event_id, status = %status, "webhook processed");
        }
        WebhookOutcome::Duplicate { .. } => {
            info!(source, key, event_id, "duplicate webhook ignored");
        }
        rejected => {
            warn!(source, key, event_id, reason = %rejected.message(), "webhook rejected");
        }
    }
}
