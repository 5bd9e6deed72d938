//! Delivery creation and lookup. Status changes arrive through partner webhooks.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use wms_core::{DeliveryId, DocumentKind, DomainError};
use wms_delivery::{Delivery, NewDelivery};

use super::{FlowResult, Warehouse, finish, next_number, outbound};
use crate::directory::Directory;
use crate::store::{DeliveryRepository, OutboundRepository, UnitOfWork, WarehouseStore};

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Create a `Pending` delivery numbered `DEL-<date>-<seq>` and link it to its outbound.
    #[instrument(skip(self, cmd), fields(outbound_id = %cmd.outbound_id), err)]
    pub async fn create_delivery(&self, cmd: NewDelivery, actor: &str) -> FlowResult<Delivery> {
        let delivery = self
            .create_with_retry(DocumentKind::Delivery, |mut tx| {
                let cmd = cmd.clone();
                async move {
                    let result = create(&mut tx, cmd, actor, Utc::now()).await;
                    (tx, result)
                }
            })
            .await?;
        info!(
            delivery = %delivery.number(),
            tracking_number = %delivery.tracking_number(),
            "delivery created"
        );
        Ok(delivery)
    }

    /// The delivery with its full event log.
    pub async fn get_delivery(&self, id: DeliveryId) -> FlowResult<Delivery> {
        let mut tx = self.store().begin().await?;
        let result = load(&mut tx, id).await;
        finish(tx, result).await
    }
}

async fn load<Tx: UnitOfWork>(tx: &mut Tx, id: DeliveryId) -> FlowResult<Delivery> {
    tx.load_delivery(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("delivery {id}")).into())
}

async fn create<Tx: UnitOfWork>(
    tx: &mut Tx,
    cmd: NewDelivery,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<Delivery> {
    let mut order = outbound::load(tx, cmd.outbound_id).await?;

    let tracking = cmd.tracking_number.trim();
    if !tracking.is_empty() && tx.find_delivery_by_tracking(tracking).await?.is_some() {
        return Err(DomainError::conflict(format!(
            "tracking number '{tracking}' is already in use"
        ))
        .into());
    }

    let number = next_number(tx, DocumentKind::Delivery, now).await?;
    let mut delivery = Delivery::create(DeliveryId::new(), number, cmd, actor, now)?;
    order.link_delivery(delivery.id_typed(), actor, now)?;

    tx.save_delivery(&mut delivery).await?;
    tx.save_outbound(&mut order).await?;
    Ok(delivery)
}
