//! Idempotent ingestion of partner/gateway status notifications.
//!
//! The same algorithm drives payment-gateway and delivery-partner webhooks:
//!
//! 1. a notice whose idempotency key was already processed is logged as a
//!    duplicate and ignored,
//! 2. an unparseable status is logged and rejected,
//! 3. a transition the target refuses is logged and rejected,
//! 4. otherwise the status is applied and a processed entry carrying the key
//!    is logged.
//!
//! Every branch appends exactly one entry to the target's own event log, so
//! persisting the target persists the audit trail together with any status
//! change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::status::{StatusMachine, parse_status};

/// A validated inbound notification, already matched to its target.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotice<D> {
    /// Sender-assigned event id used for duplicate detection.
    pub idempotency_key: String,
    /// Raw target status as sent.
    pub status: String,
    /// Opaque payload kept for audit.
    pub event_data: JsonValue,
    /// Sender-side timestamp, when provided.
    pub occurred_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Target-specific extras (e.g. a courier's current location).
    pub details: D,
}

/// Why a notice was logged without being applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rejection {
    InvalidStatus,
    InvalidTransition,
}

/// Result of ingesting one notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed {
        status: String,
    },
    Duplicate {
        original_recorded_at: DateTime<Utc>,
    },
    InvalidStatus {
        status: String,
    },
    InvalidTransition {
        from: String,
        to: String,
    },
    /// No aggregate matches the correlation key; nothing was written.
    NotFound {
        key: String,
    },
}

impl WebhookOutcome {
    /// Processed and duplicate notices are both acknowledged as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Processed { .. } | Self::Duplicate { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Processed { status } => format!("status updated to {status}"),
            Self::Duplicate {
                original_recorded_at,
            } => format!(
                "duplicate event ignored (originally processed at {})",
                original_recorded_at.to_rfc3339()
            ),
            Self::InvalidStatus { status } => format!("invalid status '{status}'"),
            Self::InvalidTransition { from, to } => {
                format!("invalid status transition from {from} to {to}")
            }
            Self::NotFound { key } => format!("no record found for '{key}'"),
        }
    }
}

/// An aggregate that accepts status notifications from an external sender.
pub trait WebhookTarget {
    type Status: StatusMachine;
    type Details;

    fn current_status(&self) -> Self::Status;

    /// When the processed entry bearing `key` was recorded, if any.
    fn processed_key_recorded_at(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Whether a notice may move the target to `next`.
    fn accepts(&self, next: Self::Status) -> bool;

    fn log_duplicate(
        &mut self,
        notice: &WebhookNotice<Self::Details>,
        original_recorded_at: DateTime<Utc>,
        now: DateTime<Utc>,
    );

    fn log_rejection(
        &mut self,
        notice: &WebhookNotice<Self::Details>,
        rejection: Rejection,
        message: &str,
        now: DateTime<Utc>,
    );

    /// Set the new status and its derived timestamps, then log a processed entry.
    fn apply(
        &mut self,
        next: Self::Status,
        notice: &WebhookNotice<Self::Details>,
        now: DateTime<Utc>,
    );
}

/// Run one notice through the idempotency algorithm.
pub fn ingest<T: WebhookTarget>(
    target: &mut T,
    notice: &WebhookNotice<T::Details>,
    now: DateTime<Utc>,
) -> WebhookOutcome {
    if let Some(original) = target.processed_key_recorded_at(&notice.idempotency_key) {
        target.log_duplicate(notice, original, now);
        return WebhookOutcome::Duplicate {
            original_recorded_at: original,
        };
    }

    let next = match parse_status::<T::Status>(&notice.status) {
        Ok(status) => status,
        Err(e) => {
            let outcome = WebhookOutcome::InvalidStatus {
                status: notice.status.clone(),
            };
            target.log_rejection(notice, Rejection::InvalidStatus, &e.to_string(), now);
            return outcome;
        }
    };

    let current = target.current_status();
    if !target.accepts(next) {
        let outcome = WebhookOutcome::InvalidTransition {
            from: current.to_string(),
            to: next.to_string(),
        };
        target.log_rejection(notice, Rejection::InvalidTransition, &outcome.message(), now);
        return outcome;
    }

    target.apply(next, notice, now);
    WebhookOutcome::Processed {
        status: next.to_string(),
    }
}

/// Require a non-blank string field of an inbound payload.
pub fn required(field: &str, value: Option<String>) -> DomainResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(DomainError::missing_field(field)),
    }
}
