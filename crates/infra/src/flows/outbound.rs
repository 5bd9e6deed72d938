//! Outbound fulfillment flow: create, pick, pack, ship, cancel.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use wms_core::{
    AggregateRoot, DocumentKind, DomainError, ExpectedVersion, OutboundId, StatusMachine,
};
use wms_inventory::DocumentRef;
use wms_outbound::{LinePick, NewOutbound, OutboundDocument, OutboundStatus};
use wms_payments::PaymentGate;

use super::{FlowResult, Warehouse, finish, next_number, reject_lines};
use crate::directory::Directory;
use crate::ledger;
use crate::store::{OutboundRepository, PaymentRepository, UnitOfWork, WarehouseStore};

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Create a `Pending` outbound document numbered `OUT-<date>-<seq>`.
    ///
    /// Every line must reference an active product and location, and the
    /// ordered quantity per product+location must currently be available.
    #[instrument(skip(self, cmd), fields(lines = cmd.lines.len()), err)]
    pub async fn create_outbound(
        &self,
        cmd: NewOutbound,
        actor: &str,
    ) -> FlowResult<OutboundDocument> {
        let shape = cmd.line_errors();
        let directory_errors = self
            .directory_errors(cmd.lines.iter().map(|l| (l.product_id, l.location_id)).collect::<Vec<_>>())
            .await?;
        reject_lines(shape, directory_errors)?;

        let doc = self
            .create_with_retry(DocumentKind::Outbound, |mut tx| {
                let cmd = cmd.clone();
                async move {
                    let result = create(&mut tx, cmd, actor, Utc::now()).await;
                    (tx, result)
                }
            })
            .await?;
        info!(outbound = %doc.number(), "outbound document created");
        Ok(doc)
    }

    /// Reserve stock for the picked quantities. Lines left out are picked in full.
    #[instrument(skip(self, picks), fields(outbound_id = %id), err)]
    pub async fn pick_outbound(
        &self,
        id: OutboundId,
        picks: Vec<LinePick>,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<OutboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = pick(&mut tx, id, &picks, expected, actor, Utc::now()).await;
        let doc = finish(tx, result).await?;
        info!(outbound = %doc.number(), "outbound document picked");
        Ok(doc)
    }

    #[instrument(skip(self), fields(outbound_id = %id), err)]
    pub async fn pack_outbound(
        &self,
        id: OutboundId,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<OutboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = pack(&mut tx, id, expected, actor, Utc::now()).await;
        let doc = finish(tx, result).await?;
        info!(outbound = %doc.number(), "outbound document packed");
        Ok(doc)
    }

    /// Pass the payment gate, then permanently deduct the reserved stock.
    #[instrument(skip(self), fields(outbound_id = %id), err)]
    pub async fn ship_outbound(
        &self,
        id: OutboundId,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<OutboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = ship(&mut tx, id, expected, actor, Utc::now()).await;
        let doc = finish(tx, result).await?;
        info!(outbound = %doc.number(), "outbound document shipped");
        Ok(doc)
    }

    /// Cancel anything not shipped, releasing reservations held by picked lines.
    #[instrument(skip(self, reason), fields(outbound_id = %id), err)]
    pub async fn cancel_outbound(
        &self,
        id: OutboundId,
        reason: Option<String>,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<OutboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = cancel(&mut tx, id, reason, expected, actor, Utc::now()).await;
        let doc = finish(tx, result).await?;
        info!(outbound = %doc.number(), "outbound document cancelled");
        Ok(doc)
    }

    pub async fn get_outbound(&self, id: OutboundId) -> FlowResult<OutboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = load(&mut tx, id).await;
        finish(tx, result).await
    }
}

pub(crate) async fn load<Tx: UnitOfWork>(tx: &mut Tx, id: OutboundId) -> FlowResult<OutboundDocument> {
    tx.load_outbound(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("outbound document {id}")).into())
}

async fn load_at<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: OutboundId,
    expected: ExpectedVersion,
) -> FlowResult<OutboundDocument> {
    let doc = load(tx, id).await?;
    expected.check(doc.version())?;
    Ok(doc)
}

fn reference(doc: &OutboundDocument) -> DocumentRef {
    DocumentRef::document(*doc.id_typed().as_uuid(), doc.number())
}

async fn create<Tx: UnitOfWork>(
    tx: &mut Tx,
    cmd: NewOutbound,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<OutboundDocument> {
    let mut shortages = Vec::new();
    for (key, requested) in cmd.demand() {
        let available = ledger::available(tx, key).await?;
        if available < requested {
            shortages.push(format!(
                "product {} at location {}: requested {requested}, available {available}",
                key.product_id, key.location_id
            ));
        }
    }
    reject_lines(shortages, Vec::new())?;

    let number = next_number(tx, DocumentKind::Outbound, now).await?;
    let mut doc = OutboundDocument::create(OutboundId::new(), number, cmd, actor, now)?;
    tx.save_outbound(&mut doc).await?;
    Ok(doc)
}

async fn pick<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: OutboundId,
    picks: &[LinePick],
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<OutboundDocument> {
    let mut doc = load_at(tx, id, expected).await?;
    let reservations = doc.pick(picks, actor, now)?;
    for allocation in reservations {
        ledger::reserve(tx, allocation.key, allocation.quantity, now).await?;
    }
    tx.save_outbound(&mut doc).await?;
    Ok(doc)
}

async fn pack<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: OutboundId,
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<OutboundDocument> {
    let mut doc = load_at(tx, id, expected).await?;
    doc.pack(actor, now)?;
    tx.save_outbound(&mut doc).await?;
    Ok(doc)
}

pub(crate) async fn ship<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: OutboundId,
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<OutboundDocument> {
    let mut doc = load_at(tx, id, expected).await?;
    doc.status().transition_to(OutboundStatus::Shipped)?;

    let payment = match doc.payment_id() {
        Some(payment_id) => Some(
            tx.lock_payment(payment_id)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("payment {payment_id}")))?,
        ),
        None => None,
    };
    if let Err(denied) = PaymentGate::can_ship(payment.as_ref()) {
        warn!(outbound = %doc.number(), reason = %denied, "shipment blocked by payment gate");
        return Err(denied.into());
    }

    let commits = doc.ship(actor, now)?;
    for allocation in commits {
        ledger::commit(tx, allocation.key, allocation.quantity, reference(&doc), actor, now).await?;
    }
    tx.save_outbound(&mut doc).await?;
    Ok(doc)
}

async fn cancel<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: OutboundId,
    reason: Option<String>,
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<OutboundDocument> {
    let mut doc = load_at(tx, id, expected).await?;
    let releases = doc.cancel(reason, actor, now)?;
    for allocation in releases {
        ledger::release(tx, allocation.key, allocation.quantity, now).await?;
    }
    tx.save_outbound(&mut doc).await?;
    Ok(doc)
}
