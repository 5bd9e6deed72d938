//! Payments domain module.
//!
//! Payments gate shipping of their outbound document and are driven either by
//! manual confirmation or by payment-gateway webhooks. Every change is kept in
//! an append-only event log that doubles as the webhook idempotency record.

pub mod gate;
pub mod payment;

pub use gate::PaymentGate;
pub use payment::{
    NewPayment, Payment, PaymentEvent, PaymentEventKind, PaymentStatus, PaymentType,
};
