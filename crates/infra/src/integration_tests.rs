//! Integration tests for the warehouse flows over the in-memory store.
//!
//! Tests: flow → ledger → unit of work → commit/rollback
//!
//! Verifies:
//! - Stock arithmetic of receiving, picking, shipping and cancelling
//! - The payment gate on shipping
//! - Webhook idempotency and transition rejection
//! - Atomic rollback and optimistic concurrency

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use std::sync::atomic::{AtomicU32, Ordering};

    use wms_core::{
        AggregateRoot, DocumentKind, DomainError, ExpectedVersion, InboundId, LocationId,
        OutboundId, ProductId, WebhookOutcome,
    };
    use wms_delivery::{DeliveryEventKind, DeliveryStatus, NewDelivery};
    use wms_inbound::{InboundDocument, InboundStatus, LineReceipt, NewInbound, NewInboundLine, ReceiveInbound};
    use wms_inventory::{MovementKind, StockKey, verify_chain};
    use wms_outbound::{LinePick, NewOutbound, NewOutboundLine, OutboundDocument, OutboundStatus};
    use wms_payments::{NewPayment, PaymentEventKind, PaymentStatus, PaymentType};

    use crate::directory::InMemoryDirectory;
    use crate::flows::{FlowError, FlowResult, Warehouse, next_number, outbound};
    use crate::store::{
        DeliveryRepository, InMemoryTx, InMemoryWarehouseStore, InboundRepository,
        OutboundRepository, PaymentRepository, StoreError, UnitOfWork, WarehouseStore,
    };
    use crate::webhooks::{DeliveryWebhook, PaymentWebhook};

    type TestWarehouse = Warehouse<InMemoryWarehouseStore, InMemoryDirectory>;

    const ANY: ExpectedVersion = ExpectedVersion::Any;

    fn setup() -> (TestWarehouse, StockKey) {
        let directory = InMemoryDirectory::new();
        let key = StockKey::new(ProductId::new(), LocationId::new());
        directory.register_product(key.product_id, true).unwrap();
        directory.register_location(key.location_id, true).unwrap();
        (Warehouse::new(InMemoryWarehouseStore::new(), directory), key)
    }

    fn new_inbound(key: StockKey, expected: i64) -> NewInbound {
        NewInbound {
            supplier: Some("Acme".into()),
            expected_date: None,
            notes: None,
            lines: vec![NewInboundLine {
                product_id: key.product_id,
                location_id: key.location_id,
                expected_quantity: expected,
                notes: None,
            }],
        }
    }

    fn receipt(doc: &InboundDocument, received: i64, damaged: i64) -> ReceiveInbound {
        ReceiveInbound {
            lines: vec![LineReceipt {
                line_id: doc.lines()[0].id,
                received_quantity: received,
                damaged_quantity: damaged,
                notes: None,
            }],
            notes: None,
        }
    }

    fn new_outbound(lines: &[(StockKey, i64)]) -> NewOutbound {
        NewOutbound {
            customer: Some("Globex".into()),
            shipping_address: Some("1 Main St".into()),
            notes: None,
            lines: lines
                .iter()
                .map(|(key, qty)| NewOutboundLine {
                    product_id: key.product_id,
                    location_id: key.location_id,
                    ordered_quantity: *qty,
                    notes: None,
                })
                .collect(),
        }
    }

    async fn stock(wh: &TestWarehouse, key: StockKey, quantity: i64) {
        let doc = wh.create_inbound(new_inbound(key, quantity), "receiver").await.unwrap();
        wh.receive_inbound(doc.id_typed(), receipt(&doc, quantity, 0), ANY, "receiver")
            .await
            .unwrap();
    }

    async fn picked_order(wh: &TestWarehouse, key: StockKey, quantity: i64) -> OutboundDocument {
        let doc = wh.create_outbound(new_outbound(&[(key, quantity)]), "clerk").await.unwrap();
        wh.pick_outbound(doc.id_typed(), vec![], ANY, "picker").await.unwrap()
    }

    async fn attach_payment(
        wh: &TestWarehouse,
        outbound_id: OutboundId,
        payment_type: PaymentType,
        external: &str,
    ) -> wms_payments::Payment {
        let cmd = NewPayment {
            outbound_id,
            payment_type,
            amount: 10_000,
            currency: "USD".into(),
            external_payment_id: Some(external.into()),
            notes: None,
        };
        wh.create_payment(cmd, "clerk").await.unwrap()
    }

    async fn attach_delivery(wh: &TestWarehouse, outbound_id: OutboundId, tracking: &str) {
        let cmd = NewDelivery {
            outbound_id,
            tracking_number: tracking.into(),
            carrier: Some("FastShip".into()),
            estimated_delivery_date: None,
            notes: None,
        };
        wh.create_delivery(cmd, "clerk").await.unwrap();
    }

    fn delivery_notice(tracking: &str, event_id: &str, status: &str) -> DeliveryWebhook {
        DeliveryWebhook {
            tracking_number: Some(tracking.into()),
            partner_event_id: Some(event_id.into()),
            status: Some(status.into()),
            ..Default::default()
        }
    }

    fn payment_notice(external: &str, event_id: &str, status: &str) -> PaymentWebhook {
        PaymentWebhook {
            external_payment_id: Some(external.into()),
            gateway_event_id: Some(event_id.into()),
            status: Some(status.into()),
            event_data: Some(json!({ "status": status })),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn receiving_stocks_only_the_good_quantity() {
        let (wh, key) = setup();
        let doc = wh.create_inbound(new_inbound(key, 100), "receiver").await.unwrap();
        assert_eq!(doc.status(), InboundStatus::Pending);

        let received = wh
            .receive_inbound(doc.id_typed(), receipt(&doc, 100, 10), ANY, "receiver")
            .await
            .unwrap();
        assert_eq!(received.status(), InboundStatus::Received);
        assert!(received.received_date().is_some());

        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (90, 0));

        let ledger = wh.stock_ledger(key).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].kind, MovementKind::Inbound);
        assert_eq!((ledger[0].quantity, ledger[0].balance_before, ledger[0].balance_after), (90, 0, 90));
        assert_eq!(ledger[0].reference.number, doc.number());
        assert_eq!(ledger[0].actor, "receiver");
    }

    #[tokio::test]
    async fn damaged_above_received_leaves_document_pending() {
        let (wh, key) = setup();
        let doc = wh.create_inbound(new_inbound(key, 10), "receiver").await.unwrap();

        let err = wh
            .receive_inbound(doc.id_typed(), receipt(&doc, 5, 6), ANY, "receiver")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Domain(DomainError::BusinessRule(_))));
        assert_eq!(wh.get_inbound(doc.id_typed()).await.unwrap().status(), InboundStatus::Pending);
        assert!(wh.stock_ledger(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn receipt_overflowing_on_hand_is_rejected_and_rolled_back() {
        let (wh, key) = setup();
        stock(&wh, key, i64::MAX).await;

        let doc = wh.create_inbound(new_inbound(key, 1), "receiver").await.unwrap();
        let err = wh
            .receive_inbound(doc.id_typed(), receipt(&doc, 1, 0), ANY, "receiver")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Domain(DomainError::Validation(_))));

        assert_eq!(wh.get_inbound(doc.id_typed()).await.unwrap().status(), InboundStatus::Pending);
        assert_eq!(wh.stock_balance(key).await.unwrap().on_hand(), i64::MAX);
        assert_eq!(wh.stock_ledger(key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_inbound_cannot_be_received() {
        let (wh, key) = setup();
        let doc = wh.create_inbound(new_inbound(key, 10), "receiver").await.unwrap();
        wh.cancel_inbound(doc.id_typed(), ANY, "receiver").await.unwrap();

        let err = wh
            .receive_inbound(doc.id_typed(), receipt(&doc, 10, 0), ANY, "receiver")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Domain(DomainError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn inactive_directory_entries_reject_the_whole_document() {
        let (wh, key) = setup();
        let retired = ProductId::new();
        wh.directory().register_product(retired, false).unwrap();

        let mut cmd = new_inbound(key, 10);
        cmd.lines.push(NewInboundLine {
            product_id: retired,
            location_id: LocationId::new(),
            expected_quantity: 0,
            notes: None,
        });

        let err = wh.create_inbound(cmd, "receiver").await.unwrap_err();
        assert_eq!(err.errors().len(), 3);
        assert!(err.errors().iter().all(|e| e.starts_with("line 2:")));

        let next = wh.create_inbound(new_inbound(key, 1), "receiver").await.unwrap();
        assert!(next.number().ends_with("-0001"));
    }

    #[tokio::test]
    async fn document_numbers_follow_the_days_sequence() {
        let (wh, key) = setup();
        let first = wh.create_inbound(new_inbound(key, 1), "r").await.unwrap();
        let second = wh.create_inbound(new_inbound(key, 1), "r").await.unwrap();

        let today = Utc::now().format("%Y%m%d").to_string();
        assert_eq!(first.number(), format!("IB-{today}-0001"));
        assert_eq!(second.number(), format!("IB-{today}-0002"));
    }

    #[tokio::test]
    async fn outbound_creation_requires_available_stock() {
        let (wh, key) = setup();
        stock(&wh, key, 5).await;

        let err = wh
            .create_outbound(new_outbound(&[(key, 3), (key, 3)]), "clerk")
            .await
            .unwrap_err();
        assert!(err.errors()[0].contains("requested 6, available 5"));
    }

    #[tokio::test]
    async fn picking_reserves_and_shipping_deducts() {
        let (wh, key) = setup();
        stock(&wh, key, 100).await;

        let order = picked_order(&wh, key, 10).await;
        assert_eq!(order.status(), OutboundStatus::Picked);
        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (100, 10));

        let shipped = wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap();
        assert_eq!(shipped.status(), OutboundStatus::Shipped);
        assert_eq!(shipped.lines()[0].shipped_quantity, 10);
        assert!(shipped.ship_date().is_some());

        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (90, 0));

        let ledger = wh.stock_ledger(key).await.unwrap();
        let last = ledger.last().unwrap();
        assert_eq!(last.kind, MovementKind::Outbound);
        assert_eq!((last.quantity, last.balance_before, last.balance_after), (-10, 100, 90));
        verify_chain(&ledger).unwrap();
    }

    #[tokio::test]
    async fn packed_order_ships_too() {
        let (wh, key) = setup();
        stock(&wh, key, 20).await;
        let order = picked_order(&wh, key, 20).await;

        let packed = wh.pack_outbound(order.id_typed(), ANY, "packer").await.unwrap();
        assert_eq!(packed.status(), OutboundStatus::Packed);
        let shipped = wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap();
        assert_eq!(shipped.status(), OutboundStatus::Shipped);
        assert_eq!(wh.stock_balance(key).await.unwrap().on_hand(), 0);
    }

    #[tokio::test]
    async fn picking_beyond_available_fails_and_mutates_nothing() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let later = wh.create_outbound(new_outbound(&[(key, 10)]), "clerk").await.unwrap();
        picked_order(&wh, key, 5).await;

        let err = wh
            .pick_outbound(later.id_typed(), vec![], ANY, "picker")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FlowError::Domain(DomainError::InsufficientStock { requested: 10, available: 5 })
        );

        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (10, 5));
        let reloaded = wh.get_outbound(later.id_typed()).await.unwrap();
        assert_eq!(reloaded.status(), OutboundStatus::Pending);
        assert_eq!(reloaded.lines()[0].picked_quantity, 0);
    }

    #[tokio::test]
    async fn failed_line_rolls_back_earlier_reservations() {
        let (wh, key) = setup();
        let scarce = StockKey::new(key.product_id, LocationId::new());
        wh.directory()
            .register_location(scarce.location_id, true)
            .unwrap();
        stock(&wh, key, 10).await;
        stock(&wh, scarce, 2).await;

        let order = wh
            .create_outbound(new_outbound(&[(key, 4), (scarce, 2)]), "clerk")
            .await
            .unwrap();
        // Drain the scarce location so the second line cannot be reserved.
        wh.adjust_stock(scarce, -2, "breakage", "auditor").await.unwrap();

        let err = wh.pick_outbound(order.id_typed(), vec![], ANY, "picker").await.unwrap_err();
        assert!(matches!(err, FlowError::Domain(DomainError::InsufficientStock { .. })));
        assert_eq!(wh.stock_balance(key).await.unwrap().reserved(), 0);
    }

    #[tokio::test]
    async fn partial_pick_reserves_only_the_picked_quantity() {
        let (wh, key) = setup();
        stock(&wh, key, 50).await;
        let order = wh.create_outbound(new_outbound(&[(key, 20)]), "clerk").await.unwrap();

        let picks = vec![LinePick { line_id: order.lines()[0].id, picked_quantity: 15 }];
        wh.pick_outbound(order.id_typed(), picks, ANY, "picker").await.unwrap();
        assert_eq!(wh.stock_balance(key).await.unwrap().reserved(), 15);

        wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap();
        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (35, 0));
    }

    #[tokio::test]
    async fn cancelling_a_picked_order_releases_its_reservation() {
        let (wh, key) = setup();
        stock(&wh, key, 30).await;
        let order = picked_order(&wh, key, 12).await;

        let cancelled = wh
            .cancel_outbound(order.id_typed(), Some("customer request".into()), ANY, "clerk")
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OutboundStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some("customer request"));

        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (30, 0));
        assert_eq!(wh.stock_ledger(key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shipped_order_cannot_be_cancelled() {
        let (wh, key) = setup();
        stock(&wh, key, 5).await;
        let order = picked_order(&wh, key, 5).await;
        wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap();

        let err = wh.cancel_outbound(order.id_typed(), None, ANY, "clerk").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Domain(DomainError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn pending_prepaid_payment_blocks_shipping() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let order = picked_order(&wh, key, 10).await;
        attach_payment(&wh, order.id_typed(), PaymentType::Prepaid, "ext-prepaid").await;

        let err = wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap_err();
        match err {
            FlowError::Domain(DomainError::BusinessRule(msg)) => assert!(msg.contains("Pending")),
            other => panic!("expected business rule error, got {other:?}"),
        }
        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (10, 10));
        assert_eq!(wh.get_outbound(order.id_typed()).await.unwrap().status(), OutboundStatus::Picked);
    }

    #[tokio::test]
    async fn pending_cod_payment_does_not_block_shipping() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let order = picked_order(&wh, key, 10).await;
        attach_payment(&wh, order.id_typed(), PaymentType::Cod, "ext-cod").await;

        let shipped = wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap();
        assert_eq!(shipped.status(), OutboundStatus::Shipped);
    }

    #[tokio::test]
    async fn gateway_confirmation_unblocks_prepaid_shipping() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let order = picked_order(&wh, key, 10).await;
        let payment = attach_payment(&wh, order.id_typed(), PaymentType::Prepaid, "ext-9").await;

        let outcome = wh
            .process_payment_webhook(payment_notice("ext-9", "gw-1", "Confirmed"))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed { status: "Confirmed".into() });

        let confirmed = wh.get_payment(payment.id_typed()).await.unwrap();
        assert_eq!(confirmed.status(), PaymentStatus::Confirmed);
        assert!(confirmed.confirmed_date().is_some());
        wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap();
    }

    #[tokio::test]
    async fn payment_failing_while_shipping_conflicts_the_shipment() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let order = picked_order(&wh, key, 10).await;
        let payment = attach_payment(&wh, order.id_typed(), PaymentType::Prepaid, "ext-race").await;
        wh.confirm_payment(payment.id_typed(), None, ANY, "clerk").await.unwrap();

        let mut shipping = wh.store().begin().await.unwrap();
        outbound::ship(&mut shipping, order.id_typed(), ANY, "shipper", Utc::now())
            .await
            .unwrap();
        wh.process_payment_webhook(payment_notice("ext-race", "gw-1", "Failed"))
            .await
            .unwrap();

        assert!(matches!(shipping.commit().await, Err(StoreError::Conflict(_))));
        let balance = wh.stock_balance(key).await.unwrap();
        assert_eq!((balance.on_hand(), balance.reserved()), (10, 10));
        assert_eq!(wh.get_outbound(order.id_typed()).await.unwrap().status(), OutboundStatus::Picked);
        let payment = wh.get_payment(payment.id_typed()).await.unwrap();
        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(payment.version(), 3);

        let err = wh.ship_outbound(order.id_typed(), ANY, "shipper").await.unwrap_err();
        assert!(matches!(err, FlowError::Domain(DomainError::BusinessRule(_))));
    }

    #[tokio::test]
    async fn one_payment_per_outbound_and_unique_external_ids() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let first = wh.create_outbound(new_outbound(&[(key, 5)]), "clerk").await.unwrap();
        let second = wh.create_outbound(new_outbound(&[(key, 5)]), "clerk").await.unwrap();
        let payment = attach_payment(&wh, first.id_typed(), PaymentType::Postpaid, "ext-1").await;
        assert!(payment.number().starts_with("PAY-"));

        let again = NewPayment {
            outbound_id: first.id_typed(),
            payment_type: PaymentType::Cod,
            amount: 1,
            currency: "USD".into(),
            external_payment_id: None,
            notes: None,
        };
        let err = wh.create_payment(again, "clerk").await.unwrap_err();
        assert!(matches!(err, FlowError::Domain(DomainError::BusinessRule(_))));

        let clash = NewPayment {
            outbound_id: second.id_typed(),
            payment_type: PaymentType::Cod,
            amount: 1,
            currency: "USD".into(),
            external_payment_id: Some("ext-1".into()),
            notes: None,
        };
        let err = wh.create_payment(clash, "clerk").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            wh.get_outbound(first.id_typed()).await.unwrap().payment_id(),
            Some(payment.id_typed())
        );
    }

    #[tokio::test]
    async fn manual_payment_transitions_follow_the_state_machine() {
        let (wh, key) = setup();
        stock(&wh, key, 1).await;
        let order = wh.create_outbound(new_outbound(&[(key, 1)]), "clerk").await.unwrap();
        let payment = attach_payment(&wh, order.id_typed(), PaymentType::Prepaid, "ext-m").await;

        let failed = wh
            .fail_payment(payment.id_typed(), Some("card declined".into()), ANY, "clerk")
            .await
            .unwrap();
        assert_eq!(failed.failure_reason(), Some("card declined"));

        let err = wh
            .confirm_payment(payment.id_typed(), None, ANY, "clerk")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Domain(DomainError::InvalidStatusTransition { .. })));
    }

    #[tokio::test]
    async fn duplicate_payment_webhook_changes_status_once() {
        let (wh, key) = setup();
        stock(&wh, key, 1).await;
        let order = wh.create_outbound(new_outbound(&[(key, 1)]), "clerk").await.unwrap();
        let payment = attach_payment(&wh, order.id_typed(), PaymentType::Prepaid, "ext-d").await;

        let first = wh
            .process_payment_webhook(payment_notice("ext-d", "gw-7", "Confirmed"))
            .await
            .unwrap();
        let second = wh
            .process_payment_webhook(payment_notice("ext-d", "gw-7", "Confirmed"))
            .await
            .unwrap();
        assert!(matches!(first, WebhookOutcome::Processed { .. }));
        assert!(matches!(second, WebhookOutcome::Duplicate { .. }));
        assert!(second.is_success());

        let payment = wh.get_payment(payment.id_typed()).await.unwrap();
        let processed: Vec<_> = payment.events().iter().filter(|e| e.processed).collect();
        assert_eq!(processed.iter().filter(|e| e.idempotency_key.as_deref() == Some("gw-7")).count(), 1);
        assert_eq!(payment.events().last().unwrap().kind, PaymentEventKind::Duplicate);
    }

    #[tokio::test]
    async fn unparseable_payment_status_is_logged_not_applied() {
        let (wh, key) = setup();
        stock(&wh, key, 1).await;
        let order = wh.create_outbound(new_outbound(&[(key, 1)]), "clerk").await.unwrap();
        let payment = attach_payment(&wh, order.id_typed(), PaymentType::Prepaid, "ext-x").await;

        let outcome = wh
            .process_payment_webhook(payment_notice("ext-x", "gw-1", "Refunded"))
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::InvalidStatus { .. }));
        assert!(!outcome.is_success());

        let payment = wh.get_payment(payment.id_typed()).await.unwrap();
        assert_eq!(payment.status(), PaymentStatus::Pending);
        let last = payment.events().last().unwrap();
        assert_eq!(last.kind, PaymentEventKind::InvalidStatus);
        assert!(!last.processed);
    }

    #[tokio::test]
    async fn delivery_webhooks_track_the_shipment() {
        let (wh, key) = setup();
        stock(&wh, key, 1).await;
        let order = picked_order(&wh, key, 1).await;
        attach_delivery(&wh, order.id_typed(), "TRK-100").await;

        let mut in_transit = delivery_notice("TRK-100", "p-1", "InTransit");
        in_transit.current_location = Some("Hub A".into());
        wh.process_delivery_webhook(in_transit).await.unwrap();
        let outcome = wh
            .process_delivery_webhook(delivery_notice("TRK-100", "p-2", "Delivered"))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed { status: "Delivered".into() });

        let delivery_id = wh.get_outbound(order.id_typed()).await.unwrap().delivery_id().unwrap();
        let delivery = wh.get_delivery(delivery_id).await.unwrap();
        assert_eq!(delivery.status(), DeliveryStatus::Delivered);
        assert_eq!(delivery.current_location(), Some("Hub A"));
        assert!(delivery.pickup_date().is_some());
        assert!(delivery.actual_delivery_date().is_some());
    }

    #[tokio::test]
    async fn backwards_delivery_transition_is_rejected_and_logged() {
        let (wh, key) = setup();
        stock(&wh, key, 1).await;
        let order = picked_order(&wh, key, 1).await;
        attach_delivery(&wh, order.id_typed(), "TRK-200").await;
        wh.process_delivery_webhook(delivery_notice("TRK-200", "p-1", "InTransit")).await.unwrap();
        wh.process_delivery_webhook(delivery_notice("TRK-200", "p-2", "Delivered")).await.unwrap();

        let outcome = wh
            .process_delivery_webhook(delivery_notice("TRK-200", "p-3", "Pending"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::InvalidTransition { from: "Delivered".into(), to: "Pending".into() }
        );

        let delivery_id = wh.get_outbound(order.id_typed()).await.unwrap().delivery_id().unwrap();
        let delivery = wh.get_delivery(delivery_id).await.unwrap();
        assert_eq!(delivery.status(), DeliveryStatus::Delivered);
        let last = delivery.events().last().unwrap();
        assert_eq!(last.kind, DeliveryEventKind::InvalidTransition);
        assert!(!last.processed);
    }

    #[tokio::test]
    async fn unknown_correlation_keys_create_nothing() {
        let (wh, _) = setup();

        let payment = wh
            .process_payment_webhook(payment_notice("nope", "gw-1", "Confirmed"))
            .await
            .unwrap();
        assert_eq!(payment, WebhookOutcome::NotFound { key: "nope".into() });

        let delivery = wh
            .process_delivery_webhook(delivery_notice("TRK-404", "p-1", "InTransit"))
            .await
            .unwrap();
        assert!(matches!(delivery, WebhookOutcome::NotFound { .. }));
        assert!(!delivery.is_success());

        let mut tx = wh.store().begin().await.unwrap();
        assert!(tx.find_payment_by_external_id("nope").await.unwrap().is_none());
        assert!(tx.find_delivery_by_tracking("TRK-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_idempotency_key_is_rejected_before_lookup() {
        let (wh, _) = setup();
        let mut notice = delivery_notice("TRK-1", "p-1", "InTransit");
        notice.partner_event_id = None;

        let err = wh.process_delivery_webhook(notice).await.unwrap_err();
        assert_eq!(err, FlowError::Domain(DomainError::MissingField("partnerEventId".into())));
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_conflict() {
        let (wh, key) = setup();
        let doc = wh.create_inbound(new_inbound(key, 10), "receiver").await.unwrap();

        let err = wh
            .receive_inbound(doc.id_typed(), receipt(&doc, 10, 0), ExpectedVersion::Exact(7), "r")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(wh.stock_balance(key).await.unwrap().on_hand(), 0);
    }

    #[tokio::test]
    async fn concurrent_writers_of_one_document_conflict() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        let order = wh.create_outbound(new_outbound(&[(key, 5)]), "clerk").await.unwrap();

        let mut first = wh.store().begin().await.unwrap();
        let mut second = wh.store().begin().await.unwrap();
        let mut a = first.load_outbound(order.id_typed()).await.unwrap().unwrap();
        let mut b = second.load_outbound(order.id_typed()).await.unwrap().unwrap();
        a.cancel(None, "x", Utc::now()).unwrap();
        b.cancel(Some("dup".into()), "y", Utc::now()).unwrap();

        first.save_outbound(&mut a).await.unwrap();
        second.save_outbound(&mut b).await.unwrap();
        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(wh.get_outbound(order.id_typed()).await.unwrap().cancel_reason(), None);
    }

    /// Number the document in `tx`, letting a rival commit the same number first when asked.
    async fn create_after_rival(
        wh: &TestWarehouse,
        tx: &mut InMemoryTx,
        cmd: NewInbound,
        rival: bool,
    ) -> FlowResult<InboundDocument> {
        let now = Utc::now();
        let number = next_number(tx, DocumentKind::Inbound, now).await?;
        if rival {
            let mut other = wh.store().begin().await?;
            let mut doc =
                InboundDocument::create(InboundId::new(), number.clone(), cmd.clone(), "rival", now)?;
            other.save_inbound(&mut doc).await?;
            other.commit().await?;
        }
        let mut doc = InboundDocument::create(InboundId::new(), number, cmd, "clerk", now)?;
        tx.save_inbound(&mut doc).await?;
        Ok(doc)
    }

    #[tokio::test]
    async fn create_retries_when_a_rival_takes_its_number() {
        let (wh, key) = setup();
        let cmd = new_inbound(key, 5);
        let attempts = AtomicU32::new(0);

        let doc = wh
            .create_with_retry(DocumentKind::Inbound, |mut tx| {
                let rival = attempts.fetch_add(1, Ordering::SeqCst) == 0;
                let cmd = cmd.clone();
                let wh = &wh;
                async move {
                    let result = create_after_rival(wh, &mut tx, cmd, rival).await;
                    (tx, result)
                }
            })
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(doc.number().ends_with("-0002"), "{}", doc.number());
        assert_eq!(wh.get_inbound(doc.id_typed()).await.unwrap().number(), doc.number());
    }

    #[tokio::test]
    async fn stock_adjustment_cannot_consume_reserved_stock() {
        let (wh, key) = setup();
        stock(&wh, key, 10).await;
        picked_order(&wh, key, 8).await;

        let err = wh.adjust_stock(key, -3, "shrinkage", "auditor").await.unwrap_err();
        assert_eq!(
            err,
            FlowError::Domain(DomainError::InsufficientStock { requested: 3, available: 2 })
        );
        let entry = wh.adjust_stock(key, 4, "found", "auditor").await.unwrap();
        assert_eq!(entry.kind, MovementKind::Adjustment);
        assert_eq!(entry.reference.number, "found");
        verify_chain(&wh.stock_ledger(key).await.unwrap()).unwrap();
    }
}
