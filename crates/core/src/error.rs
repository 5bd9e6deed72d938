//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, ledger invariants, state
/// machine rejections, conflicts). Storage failures live in the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A required input field was absent or blank.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Several lines of a document failed validation at once.
    #[error("{} line(s) failed validation", .0.len())]
    InvalidLines(Vec<String>),

    /// A stock movement was requested with a non-positive quantity.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A requested aggregate or directory entry does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("insufficient reservation: requested {requested}, reserved {reserved}")]
    InsufficientReservation { requested: i64, reserved: i64 },

    /// A state machine rejected the move.
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// A business rule blocked the operation (payment gate, damaged > received, ...).
    #[error("business rule violated: {0}")]
    BusinessRule(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Per-line messages for multi-field failures; empty for single-cause errors.
    pub fn errors(&self) -> &[String] {
        match self {
            Self::InvalidLines(errors) => errors,
            _ => &[],
        }
    }
}
