use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{
    AggregateRoot, AuditStamp, DeliveryId, DomainError, DomainResult, LineId, LocationId,
    OutboundId, PaymentId, ProductId, StatusMachine,
};
use wms_inventory::StockKey;

/// Outbound lifecycle: Pending → Picked → (Packed) → Shipped.
///
/// Anything not yet shipped may be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboundStatus {
    Pending,
    Picked,
    Packed,
    Shipped,
    Cancelled,
}

impl StatusMachine for OutboundStatus {
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (OutboundStatus::Pending, OutboundStatus::Picked),
        (OutboundStatus::Picked, OutboundStatus::Packed),
        (OutboundStatus::Picked, OutboundStatus::Shipped),
        (OutboundStatus::Packed, OutboundStatus::Shipped),
        (OutboundStatus::Pending, OutboundStatus::Cancelled),
        (OutboundStatus::Picked, OutboundStatus::Cancelled),
        (OutboundStatus::Packed, OutboundStatus::Cancelled),
    ];
    const ALL: &'static [Self] = &[
        OutboundStatus::Pending,
        OutboundStatus::Picked,
        OutboundStatus::Packed,
        OutboundStatus::Shipped,
        OutboundStatus::Cancelled,
    ];

    fn as_str(self) -> &'static str {
        match self {
            OutboundStatus::Pending => "Pending",
            OutboundStatus::Picked => "Picked",
            OutboundStatus::Packed => "Packed",
            OutboundStatus::Shipped => "Shipped",
            OutboundStatus::Cancelled => "Cancelled",
        }
    }
}

wms_core::status_text!(OutboundStatus);

impl OutboundStatus {
    /// Stock is reserved for the order in these states.
    pub fn holds_reservation(self) -> bool {
        matches!(self, OutboundStatus::Picked | OutboundStatus::Packed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundLine {
    pub id: LineId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub ordered_quantity: i64,
    pub picked_quantity: i64,
    pub shipped_quantity: i64,
    pub notes: Option<String>,
}

impl OutboundLine {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

/// Command: create an outbound document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutbound {
    pub customer: Option<String>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewOutboundLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutboundLine {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub ordered_quantity: i64,
    pub notes: Option<String>,
}

impl NewOutbound {
    pub fn line_errors(&self) -> Vec<String> {
        if self.lines.is_empty() {
            return vec!["at least one line is required".to_string()];
        }
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.ordered_quantity <= 0)
            .map(|(i, l)| {
                format!(
                    "line {}: ordered quantity must be positive (got {})",
                    i + 1,
                    l.ordered_quantity
                )
            })
            .collect()
    }

    /// Total ordered quantity per stock key, for the availability check.
    ///
    /// Totals saturate at `i64::MAX`, which no balance can cover.
    pub fn demand(&self) -> BTreeMap<StockKey, i64> {
        let mut demand: BTreeMap<StockKey, i64> = BTreeMap::new();
        for line in &self.lines {
            let total = demand
                .entry(StockKey::new(line.product_id, line.location_id))
                .or_insert(0);
            *total = total.saturating_add(line.ordered_quantity);
        }
        demand
    }
}

/// Picked quantity for one line. Lines left out are picked in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePick {
    pub line_id: LineId,
    pub picked_quantity: i64,
}

/// Stock effect planned for one line: a reservation, a commit or a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub line_id: LineId,
    pub key: StockKey,
    pub quantity: i64,
}

/// Aggregate root: OutboundDocument.
///
/// Payment and delivery are referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundDocument {
    id: OutboundId,
    number: String,
    customer: Option<String>,
    shipping_address: Option<String>,
    status: OutboundStatus,
    lines: Vec<OutboundLine>,
    notes: Option<String>,
    payment_id: Option<PaymentId>,
    delivery_id: Option<DeliveryId>,
    pick_date: Option<DateTime<Utc>>,
    pack_date: Option<DateTime<Utc>>,
    ship_date: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    audit: AuditStamp,
    #[serde(skip)]
    version: u64,
}

impl OutboundDocument {
    /// Build a new `Pending` document. Availability must already be checked.
    pub fn create(
        id: OutboundId,
        number: String,
        cmd: NewOutbound,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let errors = cmd.line_errors();
        if !errors.is_empty() {
            return Err(DomainError::InvalidLines(errors));
        }

        let lines = cmd
            .lines
            .into_iter()
            .map(|l| OutboundLine {
                id: LineId::new(),
                product_id: l.product_id,
                location_id: l.location_id,
                ordered_quantity: l.ordered_quantity,
                picked_quantity: 0,
                shipped_quantity: 0,
                notes: l.notes,
            })
            .collect();

        Ok(Self {
            id,
            number,
            customer: cmd.customer,
            shipping_address: cmd.shipping_address,
            status: OutboundStatus::Pending,
            lines,
            notes: cmd.notes,
            payment_id: None,
            delivery_id: None,
            pick_date: None,
            pack_date: None,
            ship_date: None,
            cancel_reason: None,
            audit: AuditStamp::new(actor, now),
            version: 0,
        })
    }

    pub fn id_typed(&self) -> OutboundId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer(&self) -> Option<&str> {
        self.customer.as_deref()
    }

    pub fn shipping_address(&self) -> Option<&str> {
        self.shipping_address.as_deref()
    }

    pub fn status(&self) -> OutboundStatus {
        self.status
    }

    pub fn lines(&self) -> &[OutboundLine] {
        &self.lines
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    pub fn delivery_id(&self) -> Option<DeliveryId> {
        self.delivery_id
    }

    pub fn pick_date(&self) -> Option<DateTime<Utc>> {
        self.pick_date
    }

    pub fn pack_date(&self) -> Option<DateTime<Utc>> {
        self.pack_date
    }

    pub fn ship_date(&self) -> Option<DateTime<Utc>> {
        self.ship_date
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn audit(&self) -> &AuditStamp {
        &self.audit
    }

    pub fn set_persisted_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Set picked quantities and move to `Picked`.
    ///
    /// Returns the reservations to make. Availability is enforced by the
    /// ledger when the reservations are applied.
    pub fn pick(
        &mut self,
        picks: &[LinePick],
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Allocation>> {
        let next = self.status.transition_to(OutboundStatus::Picked)?;

        let mut requested: HashMap<LineId, i64> = HashMap::with_capacity(picks.len());
        for pick in picks {
            let line = self
                .lines
                .iter()
                .find(|l| l.id == pick.line_id)
                .ok_or_else(|| DomainError::not_found(format!("outbound line {}", pick.line_id)))?;
            if pick.picked_quantity < 0 {
                return Err(DomainError::validation(format!(
                    "line {}: picked quantity cannot be negative",
                    line.id
                )));
            }
            if pick.picked_quantity > line.ordered_quantity {
                return Err(DomainError::validation(format!(
                    "line {}: picked quantity ({}) exceeds ordered quantity ({})",
                    line.id, pick.picked_quantity, line.ordered_quantity
                )));
            }
            if requested.insert(pick.line_id, pick.picked_quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "line {} submitted more than once",
                    pick.line_id
                )));
            }
        }

        let planned: Vec<(usize, i64)> = self
            .lines
            .iter()
            .enumerate()
            .map(|(i, l)| (i, requested.get(&l.id).copied().unwrap_or(l.ordered_quantity)))
            .collect();
        if planned.iter().all(|(_, q)| *q == 0) {
            return Err(DomainError::validation("nothing to pick"));
        }

        let mut reservations = Vec::new();
        for (idx, quantity) in planned {
            let line = &mut self.lines[idx];
            line.picked_quantity = quantity;
            if quantity > 0 {
                reservations.push(Allocation {
                    line_id: line.id,
                    key: line.key(),
                    quantity,
                });
            }
        }

        self.status = next;
        self.pick_date = Some(now);
        self.audit.touch(actor, now);
        Ok(reservations)
    }

    /// Picked → Packed. Stock stays reserved.
    pub fn pack(&mut self, actor: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition_to(OutboundStatus::Packed)?;
        self.pack_date = Some(now);
        self.audit.touch(actor, now);
        Ok(())
    }

    /// Ship everything picked. Returns the reservations to commit.
    ///
    /// The payment gate is the caller's responsibility and must pass first.
    pub fn ship(&mut self, actor: &str, now: DateTime<Utc>) -> DomainResult<Vec<Allocation>> {
        let next = self.status.transition_to(OutboundStatus::Shipped)?;

        let mut commits = Vec::new();
        for line in &mut self.lines {
            line.shipped_quantity = line.picked_quantity;
            if line.shipped_quantity > 0 {
                commits.push(Allocation {
                    line_id: line.id,
                    key: line.key(),
                    quantity: line.shipped_quantity,
                });
            }
        }

        self.status = next;
        self.ship_date = Some(now);
        self.audit.touch(actor, now);
        Ok(commits)
    }

    /// Cancel anything not yet shipped. Returns reservations to release.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Allocation>> {
        let releases = if self.status.holds_reservation() {
            self.lines
                .iter()
                .filter(|l| l.picked_quantity > 0)
                .map(|l| Allocation {
                    line_id: l.id,
                    key: l.key(),
                    quantity: l.picked_quantity,
                })
                .collect()
        } else {
            Vec::new()
        };

        self.status = self.status.transition_to(OutboundStatus::Cancelled)?;
        self.cancel_reason = reason;
        self.audit.touch(actor, now);
        Ok(releases)
    }

    /// Attach the order's payment (at most one).
    pub fn link_payment(
        &mut self,
        payment_id: PaymentId,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status == OutboundStatus::Cancelled {
            return Err(DomainError::business_rule(
                "cannot attach a payment to a cancelled outbound",
            ));
        }
        if let Some(existing) = self.payment_id {
            return Err(DomainError::business_rule(format!(
                "outbound {} already has payment {existing}",
                self.number
            )));
        }
        self.payment_id = Some(payment_id);
        self.audit.touch(actor, now);
        Ok(())
    }

    /// Attach the order's delivery (at most one).
    pub fn link_delivery(
        &mut self,
        delivery_id: DeliveryId,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status == OutboundStatus::Cancelled {
            return Err(DomainError::business_rule(
                "cannot attach a delivery to a cancelled outbound",
            ));
        }
        if let Some(existing) = self.delivery_id {
            return Err(DomainError::business_rule(format!(
                "outbound {} already has delivery {existing}",
                self.number
            )));
        }
        self.delivery_id = Some(delivery_id);
        self.audit.touch(actor, now);
        Ok(())
    }
}

impl AggregateRoot for OutboundDocument {
    type Id = OutboundId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
