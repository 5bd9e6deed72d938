//! `wms-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod audit;
pub mod error;
pub mod id;
pub mod numbering;
pub mod status;
pub mod webhook;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use audit::AuditStamp;
pub use error::{DomainError, DomainResult};
pub use id::{DeliveryId, EntryId, InboundId, LineId, LocationId, OutboundId, PaymentId, ProductId};
pub use numbering::DocumentKind;
pub use status::StatusMachine;
pub use webhook::{Rejection, WebhookNotice, WebhookOutcome, WebhookTarget};
