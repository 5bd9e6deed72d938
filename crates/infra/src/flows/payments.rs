//! Payment creation and manual status changes.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use wms_core::{AggregateRoot, DocumentKind, DomainError, ExpectedVersion, PaymentId};
use wms_payments::{NewPayment, Payment};

use super::{FlowResult, Warehouse, finish, next_number, outbound};
use crate::directory::Directory;
use crate::store::{OutboundRepository, PaymentRepository, UnitOfWork, WarehouseStore};

/// Manual payment transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PaymentAction {
    Confirm,
    Fail,
    Cancel,
}

impl<S, D> Warehouse<S, D>
where
    S: WarehouseStore,
    D: Directory,
{
    /// Create a `Pending` payment numbered `PAY-<date>-<seq>` and link it to its outbound.
    #[instrument(skip(self, cmd), fields(outbound_id = %cmd.outbound_id), err)]
    pub async fn create_payment(&self, cmd: NewPayment, actor: &str) -> FlowResult<Payment> {
        let payment = self
            .create_with_retry(DocumentKind::Payment, |mut tx| {
                let cmd = cmd.clone();
                async move {
                    let result = create(&mut tx, cmd, actor, Utc::now()).await;
                    (tx, result)
                }
            })
            .await?;
        info!(
            payment = %payment.number(),
            payment_type = %payment.payment_type(),
            "payment created"
        );
        Ok(payment)
    }

    #[instrument(skip(self, notes), fields(payment_id = %id), err)]
    pub async fn transition_payment(
        &self,
        id: PaymentId,
        action: PaymentAction,
        notes: Option<String>,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<Payment> {
        let mut tx = self.store().begin().await?;
        let result = transition(&mut tx, id, action, notes, expected, actor, Utc::now()).await;
        let payment = finish(tx, result).await?;
        info!(payment = %payment.number(), status = %payment.status(), "payment status changed");
        Ok(payment)
    }

    pub async fn confirm_payment(
        &self,
        id: PaymentId,
        notes: Option<String>,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<Payment> {
        self.transition_payment(id, PaymentAction::Confirm, notes, expected, actor)
            .await
    }

    pub async fn fail_payment(
        &self,
        id: PaymentId,
        reason: Option<String>,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<Payment> {
        self.transition_payment(id, PaymentAction::Fail, reason, expected, actor)
            .await
    }

    pub async fn cancel_payment(
        &self,
        id: PaymentId,
        notes: Option<String>,
        expected: ExpectedVersion,
        actor: &str,
    ) -> FlowResult<Payment> {
        self.transition_payment(id, PaymentAction::Cancel, notes, expected, actor)
            .await
    }

    /// The payment with its full event log.
    pub async fn get_payment(&self, id: PaymentId) -> FlowResult<Payment> {
        let mut tx = self.store().begin().await?;
        let result = load(&mut tx, id).await;
        finish(tx, result).await
    }
}

async fn load<Tx: UnitOfWork>(tx: &mut Tx, id: PaymentId) -> FlowResult<Payment> {
    tx.load_payment(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("payment {id}")).into())
}

async fn create<Tx: UnitOfWork>(
    tx: &mut Tx,
    cmd: NewPayment,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<Payment> {
    let mut order = outbound::load(tx, cmd.outbound_id).await?;

    if let Some(external) = cmd.external_payment_id.as_deref().map(str::trim) {
        if !external.is_empty() && tx.find_payment_by_external_id(external).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "external payment id '{external}' is already in use"
            ))
            .into());
        }
    }

    let number = next_number(tx, DocumentKind::Payment, now).await?;
    let mut payment = Payment::create(PaymentId::new(), number, cmd, actor, now)?;
    order.link_payment(payment.id_typed(), actor, now)?;

    tx.save_payment(&mut payment).await?;
    tx.save_outbound(&mut order).await?;
    Ok(payment)
}

#[allow(clippy::too_many_arguments)]
async fn transition<Tx: UnitOfWork>(
    tx: &mut Tx,
    id: PaymentId,
    action: PaymentAction,
    notes: Option<String>,
    expected: ExpectedVersion,
    actor: &str,
    now: DateTime<Utc>,
) -> FlowResult<Payment> {
    let mut payment = load(tx, id).await?;
    expected.check(payment.version())?;
    match action {
        PaymentAction::Confirm => payment.confirm(notes, actor, now)?,
        PaymentAction::Fail => payment.fail(notes, actor, now)?,
        PaymentAction::Cancel => payment.cancel(notes, actor, now)?,
    }
    tx.save_payment(&mut payment).await?;
    Ok(payment)
}
