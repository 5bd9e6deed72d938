//! Shipping precondition derived from an order's payment.

use wms_core::{DomainError, DomainResult};

use crate::payment::{Payment, PaymentStatus, PaymentType};

pub struct PaymentGate;

impl PaymentGate {
    /// Whether an outbound with this payment (if any) may ship.
    ///
    /// No payment, COD and Postpaid always pass; Prepaid needs `Confirmed`.
    pub fn can_ship(payment: Option<&Payment>) -> DomainResult<()> {
        let Some(payment) = payment else {
            return Ok(());
        };
        match payment.payment_type() {
            PaymentType::Cod | PaymentType::Postpaid => Ok(()),
            PaymentType::Prepaid if payment.status() == PaymentStatus::Confirmed => Ok(()),
            PaymentType::Prepaid => Err(DomainError::business_rule(format!(
                "prepaid payment {} must be Confirmed before shipping (current status: {})",
                payment.number(),
                payment.status()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::NewPayment;
    use chrono::Utc;
    use wms_core::{OutboundId, PaymentId};

    fn payment(payment_type: PaymentType) -> Payment {
        let cmd = NewPayment {
            outbound_id: OutboundId::new(),
            payment_type,
            amount: 100,
            currency: "EUR".into(),
            external_payment_id: None,
            notes: None,
        };
        Payment::create(PaymentId::new(), "PAY-20240101-0001".into(), cmd, "clerk", Utc::now()).unwrap()
    }

    #[test]
    fn no_payment_ships() {
        assert!(PaymentGate::can_ship(None).is_ok());
    }

    #[test]
    fn pending_prepaid_is_blocked_with_its_status() {
        let err = PaymentGate::can_ship(Some(&payment(PaymentType::Prepaid))).unwrap_err();
        match err {
            DomainError::BusinessRule(msg) => assert!(msg.contains("Pending")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn confirmed_prepaid_ships() {
        let mut p = payment(PaymentType::Prepaid);
        p.confirm(None, "clerk", Utc::now()).unwrap();
        assert!(PaymentGate::can_ship(Some(&p)).is_ok());
    }

    #[test]
    fn cod_and_postpaid_ship_in_any_status() {
        let mut cod = payment(PaymentType::Cod);
        assert!(PaymentGate::can_ship(Some(&cod)).is_ok());
        cod.fail(Some("card declined".into()), "clerk", Utc::now()).unwrap();
        assert!(PaymentGate::can_ship(Some(&cod)).is_ok());
        assert!(PaymentGate::can_ship(Some(&payment(PaymentType::Postpaid))).is_ok());
    }
}
