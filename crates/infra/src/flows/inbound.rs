//! Inbound receiving flow.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use wms_core::{AggregateRoot, DocumentKind, DomainError, ExpectedVersion, InboundId};
use wms_inbound::{InboundDocument, NewInbound, ReceiveInbound};
use wms_inventory::DocumentRef;

use super::{FlowResult, Warehouse, finish, next_number, reject_lines};
use crate::directory::Directory;
use crate::ledger;
use crate::store::{InboundRepository, UnitOfWork, WarehouseStore};

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Create a `Pending` inbound document numbered `IB-<date>-<seq>`.
    ///
    /// All lines are validated first; any failure rejects the whole document.
    #[instrument(skip(self, cmd), fields(lines = cmd.lines.len()), err)]
    pub async fn create_inbound(&self, cmd: NewInbound, actor: &str) -> FlowResult<InboundDocument> {
        let directory_errors = self
            .directory_errors(cmd.lines.iter().map(|l| (l.product_id, l.location_id)).collect::<Vec<_>>())
            .await?;
        reject_lines(cmd.line_errors(), directory_errors)?;

        let doc = self
            .create_with_retry(DocumentKind::Inbound, |mut tx| {
                let cmd = cmd.clone();
                async move {
                    let result = create(&mut tx, cmd, actor, Utc::now()).await;
                    (tx, result)
                }
            })
            .await?;
        info!(inbound = %doc.number(), "inbound document created");
        Ok(doc)
    }

    /// Record received/damaged quantities and stock the good quantity.
    #[instrument(skip(self, cmd), fields(inbound_id = %id), err)]
    pub async fn receive_inbound(
        &self,
        id: InboundId,
        cmd: ReceiveInbound,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<InboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = receive(&mut tx, id, &cmd, expected, actor, Utc::now()).await;
        let doc = finish(tx, result).await?;
        info!(inbound = %doc.number(), "inbound document received");
        Ok(doc)
    }

    #[instrument(skip(self), fields(inbound_id = %id), err)]
    pub async fn cancel_inbound(
        &self,
        id: InboundId,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<InboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = cancel(&mut tx, id, expected, actor, Utc::now()).await;
        let doc = finish(tx, result).await?;
        info!(inbound = %doc.number(), "inbound document cancelled");
        Ok(doc)
    }

    pub async fn get_inbound(&self, id: InboundId) -> FlowResult<InboundDocument> {
        let mut tx = self.store().begin().await?;
        let result = load(&mut tx, id).await;
        finish(tx, result).await
    }
}

async fn load<Tx: UnitOfWork>(tx: &mut Tx, id: InboundId) -> FlowResult<InboundDocument> {
    tx.load_inbound(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("inbound document {id}")).into())
}

async fn load_at<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: InboundId,
    expected: ExpectedVersion,
) -> FlowResult<InboundDocument> {
    let doc = load(tx, id).await?;
    expected.check(doc.version())?;
    Ok(doc)
}

async fn create<Tx: UnitOfWork>(
    tx: &mut Tx,
    cmd: NewInbound,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<InboundDocument> {
    let number = next_number(tx, DocumentKind::Inbound, now).await?;
    let mut doc = InboundDocument::create(InboundId::new(), number, cmd, actor, now)?;
    tx.save_inbound(&mut doc).await?;
    Ok(doc)
}

async fn receive<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: InboundId,
    cmd: &ReceiveInbound,
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<InboundDocument> {
    let mut doc = load_at(tx, id, expected).await?;
    let goods = doc.receive(cmd, actor, now)?;

    for item in goods {
        let reference = DocumentRef::document(*id.as_uuid(), doc.number());
        ledger::increase(tx, item.key, item.quantity, reference, actor, now).await?;
    }
    tx.save_inbound(&mut doc).await?;
    Ok(doc)
}

async fn cancel<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: InboundId,
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<InboundDocument> {
    let mut doc = load_at(tx, id, expected).await?;
    doc.cancel(actor, now)?;
    tx.save_inbound(&mut doc).await?;
    Ok(doc)
}
