//! Request bodies and JSON views of the domain aggregates.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use wms_core::{AggregateRoot, ExpectedVersion, LocationId, ProductId};
use wms_delivery::{Delivery, NewDelivery};
use wms_inbound::{InboundDocument, NewInbound, ReceiveInbound};
use wms_inventory::{LedgerEntry, StockBalance, StockKey};
use wms_outbound::{LinePick, NewOutbound, OutboundDocument};
use wms_payments::{NewPayment, Payment};

#[derive(Debug, Deserialize)]
pub struct ReceiveInboundRequest {
    #[serde(flatten)]
    pub receipt: ReceiveInbound,
    pub expected_version: Option<u64>,
}

/// Body of state-only transitions (pack, ship, inbound cancel).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionedRequest {
    pub expected_version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PickOutboundRequest {
    #[serde(default)]
    pub lines: Vec<LinePick>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelOutboundRequest {
    pub reason: Option<String>,
    pub expected_version: Option<u64>,
}

/// Manual payment transition; `notes` doubles as the failure reason.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentTransitionRequest {
    pub notes: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub delta: i64,
    pub reason: String,
}

impl AdjustStockRequest {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

pub type CreateInboundRequest = NewInbound;
pub type CreateOutboundRequest = NewOutbound;
pub type CreatePaymentRequest = NewPayment;
pub type CreateDeliveryRequest = NewDelivery;

pub fn expected(version: Option<u64>) -> ExpectedVersion {
    ExpectedVersion::from(version)
}

/// Serialize an aggregate and attach its optimistic version.
fn versioned<T>(value: &T, version: u64) -> JsonValue
where
    T: serde::Serialize,
{
    let mut body = serde_json::to_value(value).unwrap_or(JsonValue::Null);
    if let JsonValue::Object(map) = &mut body {
        map.insert("version".to_string(), json!(version));
    }
    body
}

pub fn inbound_json(doc: &InboundDocument) -> JsonValue {
    versioned(doc, doc.version())
}

pub fn outbound_json(doc: &OutboundDocument) -> JsonValue {
    versioned(doc, doc.version())
}

pub fn payment_json(payment: &Payment) -> JsonValue {
    let mut body = versioned(payment, payment.version());
    if let JsonValue::Object(map) = &mut body {
        map.insert("events".to_string(), json!(payment.events()));
    }
    body
}

pub fn delivery_json(delivery: &Delivery) -> JsonValue {
    let mut body = versioned(delivery, delivery.version());
    if let JsonValue::Object(map) = &mut body {
        map.insert("events".to_string(), json!(delivery.events()));
    }
    body
}

pub fn balance_json(balance: &StockBalance) -> JsonValue {
    let key = balance.key();
    json!({
        "product_id": key.product_id,
        "location_id": key.location_id,
        "quantity_on_hand": balance.on_hand(),
        "quantity_reserved": balance.reserved(),
        "quantity_available": balance.available(),
        "updated_at": balance.updated_at(),
    })
}

pub fn ledger_json(entries: &[LedgerEntry]) -> JsonValue {
    json!({ "entries": entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_request_flattens_receipt_fields() {
        let body: ReceiveInboundRequest = serde_json::from_value(json!({
            "lines": [],
            "notes": "dock 3",
            "expected_version": 2
        }))
        .unwrap();
        assert_eq!(body.receipt.notes.as_deref(), Some("dock 3"));
        assert_eq!(expected(body.expected_version), ExpectedVersion::Exact(2));
    }

    #[test]
    fn misspelled_transition_field_is_rejected() {
        let body = serde_json::from_value::<VersionedRequest>(json!({ "expectedVersion": 3 }));
        assert!(body.is_err());
    }

    #[test]
    fn empty_pick_body_picks_everything() {
        let body: PickOutboundRequest = serde_json::from_value(json!({})).unwrap();
        assert!(body.lines.is_empty());
        assert_eq!(expected(body.expected_version), ExpectedVersion::Any);
    }
}
