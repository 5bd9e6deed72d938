use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use wms_core::{
    AggregateRoot, AuditStamp, DomainError, DomainResult, EntryId, OutboundId, PaymentId,
    Rejection, StatusMachine, WebhookNotice, WebhookTarget,
};

/// Actor recorded on entries written by gateway notifications.
pub const GATEWAY_ACTOR: &str = "payment-gateway";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl StatusMachine for PaymentStatus {
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (PaymentStatus::Pending, PaymentStatus::Confirmed),
        (PaymentStatus::Pending, PaymentStatus::Failed),
        (PaymentStatus::Pending, PaymentStatus::Cancelled),
        (PaymentStatus::Failed, PaymentStatus::Pending),
    ];
    const ALL: &'static [Self] = &[
        PaymentStatus::Pending,
        PaymentStatus::Confirmed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
    ];

    fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Confirmed => "Confirmed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Cancelled => "Cancelled",
        }
    }
}

wms_core::status_text!(PaymentStatus);

/// When the money is collected relative to shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    /// Paid before shipping; shipping waits for confirmation.
    Prepaid,
    /// Cash on delivery.
    #[serde(rename = "COD")]
    Cod,
    /// Invoiced after delivery.
    Postpaid,
}

impl PaymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Prepaid => "Prepaid",
            PaymentType::Cod => "COD",
            PaymentType::Postpaid => "Postpaid",
        }
    }
}

impl core::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentEventKind {
    Created,
    StatusChanged,
    WebhookReceived,
    Duplicate,
    InvalidStatus,
    InvalidTransition,
}

impl PaymentEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentEventKind::Created => "Created",
            PaymentEventKind::StatusChanged => "StatusChanged",
            PaymentEventKind::WebhookReceived => "WebhookReceived",
            PaymentEventKind::Duplicate => "Duplicate",
            PaymentEventKind::InvalidStatus => "InvalidStatus",
            PaymentEventKind::InvalidTransition => "InvalidTransition",
        }
    }
}

/// Append-only audit entry of a payment.
///
/// Only processed gateway entries carry the gateway event id, which makes the
/// key unique per payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: EntryId,
    pub kind: PaymentEventKind,
    pub idempotency_key: Option<String>,
    pub previous_status: PaymentStatus,
    pub new_status: PaymentStatus,
    pub event_data: JsonValue,
    pub gateway_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub processed: bool,
    pub recorded_at: DateTime<Utc>,
    pub actor: String,
}

/// Command: create a payment for an outbound document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub outbound_id: OutboundId,
    pub payment_type: PaymentType,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub external_payment_id: Option<String>,
    pub notes: Option<String>,
}

/// Aggregate root: Payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    number: String,
    outbound_id: OutboundId,
    payment_type: PaymentType,
    status: PaymentStatus,
    amount: i64,
    currency: String,
    external_payment_id: Option<String>,
    confirmed_date: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    notes: Option<String>,
    audit: AuditStamp,
    #[serde(skip)]
    events: Vec<PaymentEvent>,
    #[serde(skip)]
    version: u64,
}

impl Payment {
    pub fn create(
        id: PaymentId,
        number: String,
        cmd: NewPayment,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if cmd.amount <= 0 {
            return Err(DomainError::validation(format!(
                "payment amount must be positive (got {})",
                cmd.amount
            )));
        }
        let currency = cmd.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter code (got '{}')",
                cmd.currency
            )));
        }
        let external_payment_id = match cmd.external_payment_id {
            Some(ext) if ext.trim().is_empty() => {
                return Err(DomainError::validation("external payment id cannot be blank"));
            }
            other => other.map(|e| e.trim().to_string()),
        };

        let mut payment = Self {
            id,
            number,
            outbound_id: cmd.outbound_id,
            payment_type: cmd.payment_type,
            status: PaymentStatus::Pending,
            amount: cmd.amount,
            currency,
            external_payment_id,
            confirmed_date: None,
            failure_reason: None,
            notes: cmd.notes,
            audit: AuditStamp::new(actor, now),
            events: Vec::new(),
            version: 0,
        };
        payment.log(
            PaymentEventKind::Created,
            PaymentStatus::Pending,
            None,
            true,
            None,
            actor,
            now,
        );
        Ok(payment)
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn outbound_id(&self) -> OutboundId {
        self.outbound_id
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn external_payment_id(&self) -> Option<&str> {
        self.external_payment_id.as_deref()
    }

    pub fn confirmed_date(&self) -> Option<DateTime<Utc>> {
        self.confirmed_date
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn audit(&self) -> &AuditStamp {
        &self.audit
    }

    pub fn events(&self) -> &[PaymentEvent] {
        &self.events
    }

    pub fn set_persisted_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Reattach the stored event log when loading from storage.
    pub fn with_events(mut self, events: Vec<PaymentEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn confirm(&mut self, notes: Option<String>, actor: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.change_status(PaymentStatus::Confirmed, notes, actor, now)
    }

    pub fn fail(&mut self, reason: Option<String>, actor: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.change_status(PaymentStatus::Failed, reason, actor, now)
    }

    pub fn cancel(&mut self, notes: Option<String>, actor: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.change_status(PaymentStatus::Cancelled, notes, actor, now)
    }

    fn change_status(
        &mut self,
        next: PaymentStatus,
        notes: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let previous = self.status;
        self.status = previous.transition_to(next)?;
        self.stamp_derived(next, notes.as_deref(), now);
        self.audit.touch(actor, now);
        self.log(PaymentEventKind::StatusChanged, previous, None, true, notes, actor, now);
        Ok(())
    }

    fn stamp_derived(&mut self, next: PaymentStatus, notes: Option<&str>, now: DateTime<Utc>) {
        match next {
            PaymentStatus::Confirmed if self.confirmed_date.is_none() => {
                self.confirmed_date = Some(now);
            }
            PaymentStatus::Failed => {
                if let Some(reason) = notes {
                    self.failure_reason = Some(reason.to_string());
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn log(
        &mut self,
        kind: PaymentEventKind,
        previous_status: PaymentStatus,
        notice: Option<&WebhookNotice<()>>,
        processed: bool,
        notes: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        let key = notice
            .filter(|_| processed)
            .map(|n| n.idempotency_key.clone());
        self.events.push(PaymentEvent {
            id: EntryId::new(),
            kind,
            idempotency_key: key,
            previous_status,
            new_status: self.status,
            event_data: notice.map(|n| n.event_data.clone()).unwrap_or(JsonValue::Null),
            gateway_timestamp: notice.and_then(|n| n.occurred_at),
            notes,
            processed,
            recorded_at: now,
            actor: actor.to_string(),
        });
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl WebhookTarget for Payment {
    type Status = PaymentStatus;
    type Details = ();

    fn current_status(&self) -> PaymentStatus {
        self.status
    }

    fn processed_key_recorded_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .find(|e| e.processed && e.idempotency_key.as_deref() == Some(key))
            .map(|e| e.recorded_at)
    }

    /// The gateway is authoritative; its status is applied as sent.
    fn accepts(&self, _next: PaymentStatus) -> bool {
        true
    }

    fn log_duplicate(
        &mut self,
        notice: &WebhookNotice<()>,
        original_recorded_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let notes = format!(
            "duplicate gateway event {} (originally processed at {})",
            notice.idempotency_key,
            original_recorded_at.to_rfc3339()
        );
        let status = self.status;
        self.log(PaymentEventKind::Duplicate, status, Some(notice), false, Some(notes), GATEWAY_ACTOR, now);
    }

    fn log_rejection(
        &mut self,
        notice: &WebhookNotice<()>,
        rejection: Rejection,
        message: &str,
        now: DateTime<Utc>,
    ) {
        let kind = match rejection {
            Rejection::InvalidStatus => PaymentEventKind::InvalidStatus,
            Rejection::InvalidTransition => PaymentEventKind::InvalidTransition,
        };
        let notes = format!("gateway event {}: {message}", notice.idempotency_key);
        let status = self.status;
        self.log(kind, status, Some(notice), false, Some(notes), GATEWAY_ACTOR, now);
    }

    fn apply(&mut self, next: PaymentStatus, notice: &WebhookNotice<()>, now: DateTime<Utc>) {
        let previous = self.status;
        self.status = next;
        self.stamp_derived(next, notice.notes.as_deref(), now);
        self.audit.touch(GATEWAY_ACTOR, now);
        self.log(
            PaymentEventKind::WebhookReceived,
            previous,
            Some(notice),
            true,
            notice.notes.clone(),
            GATEWAY_ACTOR,
            now,
        );
    }
}
