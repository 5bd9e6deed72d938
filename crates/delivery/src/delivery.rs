use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use wms_core::{
    AggregateRoot, AuditStamp, DeliveryId, DomainError, DomainResult, EntryId, OutboundId,
    Rejection, StatusMachine, WebhookNotice, WebhookTarget,
};

/// Actor recorded on entries written by partner notifications.
pub const PARTNER_ACTOR: &str = "delivery-partner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
    Returned,
}

impl StatusMachine for DeliveryStatus {
    // Repeated notices for the current state are accepted as no-ops.
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (DeliveryStatus::Pending, DeliveryStatus::InTransit),
        (DeliveryStatus::InTransit, DeliveryStatus::Delivered),
        (DeliveryStatus::InTransit, DeliveryStatus::Failed),
        (DeliveryStatus::Pending, DeliveryStatus::Cancelled),
        (DeliveryStatus::Pending, DeliveryStatus::Pending),
        (DeliveryStatus::InTransit, DeliveryStatus::InTransit),
        (DeliveryStatus::Delivered, DeliveryStatus::Delivered),
        (DeliveryStatus::Failed, DeliveryStatus::Failed),
        (DeliveryStatus::Cancelled, DeliveryStatus::Cancelled),
        (DeliveryStatus::Returned, DeliveryStatus::Returned),
    ];
    const ALL: &'static [Self] = &[
        DeliveryStatus::Pending,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Returned,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::InTransit => "InTransit",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Cancelled => "Cancelled",
            DeliveryStatus::Returned => "Returned",
        }
    }
}

wms_core::status_text!(DeliveryStatus);

/// Kind of a delivery log entry. Applied notices are named after the status they set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryEventKind {
    Created,
    Status(DeliveryStatus),
    Duplicate,
    InvalidStatus,
    InvalidTransition,
}

impl DeliveryEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryEventKind::Created => "Created",
            DeliveryEventKind::Status(s) => s.as_str(),
            DeliveryEventKind::Duplicate => "Duplicate",
            DeliveryEventKind::InvalidStatus => "InvalidStatus",
            DeliveryEventKind::InvalidTransition => "InvalidTransition",
        }
    }
}

/// Partner-specific part of a delivery notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub current_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: EntryId,
    pub kind: DeliveryEventKind,
    /// Partner event id; only present on processed entries.
    pub idempotency_key: Option<String>,
    pub status: DeliveryStatus,
    pub location: Option<String>,
    pub event_data: JsonValue,
    pub event_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub processed: bool,
    pub recorded_at: DateTime<Utc>,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDelivery {
    pub outbound_id: OutboundId,
    pub tracking_number: String,
    pub carrier: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Aggregate root: Delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    id: DeliveryId,
    number: String,
    outbound_id: OutboundId,
    tracking_number: String,
    carrier: Option<String>,
    status: DeliveryStatus,
    current_location: Option<String>,
    estimated_delivery_date: Option<NaiveDate>,
    pickup_date: Option<DateTime<Utc>>,
    actual_delivery_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    audit: AuditStamp,
    #[serde(skip)]
    events: Vec<DeliveryEvent>,
    #[serde(skip)]
    version: u64,
}

impl Delivery {
    pub fn create(
        id: DeliveryId,
        number: String,
        cmd: NewDelivery,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let tracking_number = cmd.tracking_number.trim().to_string();
        if tracking_number.is_empty() {
            return Err(DomainError::missing_field("trackingNumber"));
        }

        let mut delivery = Self {
            id,
            number,
            outbound_id: cmd.outbound_id,
            tracking_number,
            carrier: cmd.carrier,
            status: DeliveryStatus::Pending,
            current_location: None,
            estimated_delivery_date: cmd.estimated_delivery_date,
            pickup_date: None,
            actual_delivery_date: None,
            notes: cmd.notes,
            audit: AuditStamp::new(actor, now),
            events: Vec::new(),
            version: 0,
        };
        delivery.log(DeliveryEventKind::Created, None, true, None, actor, now);
        Ok(delivery)
    }

    pub fn id_typed(&self) -> DeliveryId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn outbound_id(&self) -> OutboundId {
        self.outbound_id
    }

    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }

    pub fn carrier(&self) -> Option<&str> {
        self.carrier.as_deref()
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn current_location(&self) -> Option<&str> {
        self.current_location.as_deref()
    }

    pub fn estimated_delivery_date(&self) -> Option<NaiveDate> {
        self.estimated_delivery_date
    }

    pub fn pickup_date(&self) -> Option<DateTime<Utc>> {
        self.pickup_date
    }

    pub fn actual_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.actual_delivery_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn audit(&self) -> &AuditStamp {
        &self.audit
    }

    pub fn events(&self) -> &[DeliveryEvent] {
        &self.events
    }

    pub fn set_persisted_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn with_events(mut self, events: Vec<DeliveryEvent>) -> Self {
        self.events = events;
        self
    }

    fn log(
        &mut self,
        kind: DeliveryEventKind,
        notice: Option<&WebhookNotice<DeliveryDetails>>,
        processed: bool,
        notes: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        self.events.push(DeliveryEvent {
            id: EntryId::new(),
            kind,
            idempotency_key: notice.filter(|_| processed).map(|n| n.idempotency_key.clone()),
            status: self.status,
            location: notice.and_then(|n| n.details.current_location.clone()),
            event_data: notice.map(|n| n.event_data.clone()).unwrap_or(JsonValue::Null),
            event_timestamp: notice.and_then(|n| n.occurred_at),
            notes,
            processed,
            recorded_at: now,
            actor: actor.to_string(),
        });
    }
}

impl AggregateRoot for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl WebhookTarget for Delivery {
    type Status = DeliveryStatus;
    type Details = DeliveryDetails;

    fn current_status(&self) -> DeliveryStatus {
        self.status
    }

    fn processed_key_recorded_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .find(|e| e.processed && e.idempotency_key.as_deref() == Some(key))
            .map(|e| e.recorded_at)
    }

    fn accepts(&self, next: DeliveryStatus) -> bool {
        self.status.can_transition_to(next)
    }

    fn log_duplicate(
        &mut self,
        notice: &WebhookNotice<DeliveryDetails>,
        original_recorded_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let notes = format!(
            "duplicate partner event {} (originally processed at {})",
            notice.idempotency_key,
            original_recorded_at.to_rfc3339()
        );
        self.log(DeliveryEventKind::Duplicate, Some(notice), false, Some(notes), PARTNER_ACTOR, now);
    }

    fn log_rejection(
        &mut self,
        notice: &WebhookNotice<DeliveryDetails>,
        rejection: Rejection,
        message: &str,
        now: DateTime<Utc>,
    ) {
        let kind = match rejection {
            Rejection::InvalidStatus => DeliveryEventKind::InvalidStatus,
            Rejection::InvalidTransition => DeliveryEventKind::InvalidTransition,
        };
        let notes = format!("partner event {}: {message}", notice.idempotency_key);
        self.log(kind, Some(notice), false, Some(notes), PARTNER_ACTOR, now);
    }

    fn apply(
        &mut self,
        next: DeliveryStatus,
        notice: &WebhookNotice<DeliveryDetails>,
        now: DateTime<Utc>,
    ) {
        self.status = next;
        let at = notice.occurred_at.unwrap_or(now);
        match next {
            DeliveryStatus::InTransit if self.pickup_date.is_none() => self.pickup_date = Some(at),
            DeliveryStatus::Delivered if self.actual_delivery_date.is_none() => {
                self.actual_delivery_date = Some(at)
            }
            _ => {}
        }
        if let Some(location) = &notice.details.current_location {
            self.current_location = Some(location.clone());
        }
        self.audit.touch(PARTNER_ACTOR, now);
        self.log(
            DeliveryEventKind::Status(next),
            Some(notice),
            true,
            notice.notes.clone(),
            PARTNER_ACTOR,
            now,
        );
    }
}
