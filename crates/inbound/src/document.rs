use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{
    AggregateRoot, AuditStamp, DomainError, DomainResult, InboundId, LineId, LocationId,
    ProductId, StatusMachine,
};
use wms_inventory::StockKey;

/// Inbound document lifecycle. Both exits from `Pending` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InboundStatus {
    Pending,
    Received,
    Cancelled,
}

impl StatusMachine for InboundStatus {
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (InboundStatus::Pending, InboundStatus::Received),
        (InboundStatus::Pending, InboundStatus::Cancelled),
    ];
    const ALL: &'static [Self] = &[
        InboundStatus::Pending,
        InboundStatus::Received,
        InboundStatus::Cancelled,
    ];

    fn as_str(self) -> &'static str {
        match self {
            InboundStatus::Pending => "Pending",
            InboundStatus::Received => "Received",
            InboundStatus::Cancelled => "Cancelled",
        }
    }
}

wms_core::status_text!(InboundStatus);

/// Expected goods for one product at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundLine {
    pub id: LineId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub expected_quantity: i64,
    /// Set once, by the receiving operation.
    pub received_quantity: i64,
    /// Subset of `received_quantity` that cannot be stocked.
    pub damaged_quantity: i64,
    pub notes: Option<String>,
}

impl InboundLine {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    pub fn good_quantity(&self) -> i64 {
        self.received_quantity - self.damaged_quantity
    }
}

/// Command: create an inbound document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInbound {
    pub supplier: Option<String>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<NewInboundLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInboundLine {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub expected_quantity: i64,
    pub notes: Option<String>,
}

impl NewInbound {
    /// Shape problems of the submitted lines, one message per failing line.
    ///
    /// Directory checks (active product/location) are added by the caller so
    /// that every problem is reported at once.
    pub fn line_errors(&self) -> Vec<String> {
        if self.lines.is_empty() {
            return vec!["at least one line is required".to_string()];
        }
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.expected_quantity <= 0)
            .map(|(i, l)| {
                format!(
                    "line {}: expected quantity must be positive (got {})",
                    i + 1,
                    l.expected_quantity
                )
            })
            .collect()
    }
}

/// Command: record what actually arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveInbound {
    pub lines: Vec<LineReceipt>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReceipt {
    pub line_id: LineId,
    pub received_quantity: i64,
    pub damaged_quantity: i64,
    pub notes: Option<String>,
}

/// Good stock produced by a receipt, to be added to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedGoods {
    pub line_id: LineId,
    pub key: StockKey,
    pub quantity: i64,
}

/// Aggregate root: InboundDocument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundDocument {
    id: InboundId,
    number: String,
    supplier: Option<String>,
    expected_date: Option<NaiveDate>,
    status: InboundStatus,
    lines: Vec<InboundLine>,
    notes: Option<String>,
    received_date: Option<DateTime<Utc>>,
    audit: AuditStamp,
    #[serde(skip)]
    version: u64,
}

impl InboundDocument {
    /// Build a new `Pending` document. Lines must already be validated.
    pub fn create(
        id: InboundId,
        number: String,
        cmd: NewInbound,
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
            .map(|l| InboundLine {
                id: LineId::new(),
                product_id: l.product_id,
                location_id: l.location_id,
                expected_quantity: l.expected_quantity,
                received_quantity: 0,
                damaged_quantity: 0,
                notes: l.notes,
            })
            .collect();

        Ok(Self {
            id,
            number,
            supplier: cmd.supplier,
            expected_date: cmd.expected_date,
            status: InboundStatus::Pending,
            lines,
            notes: cmd.notes,
            received_date: None,
            audit: AuditStamp::new(actor, now),
            version: 0,
        })
    }

    pub fn id_typed(&self) -> InboundId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn supplier(&self) -> Option<&str> {
        self.supplier.as_deref()
    }

    pub fn expected_date(&self) -> Option<NaiveDate> {
        self.expected_date
    }

    pub fn status(&self) -> InboundStatus {
        self.status
    }

    pub fn lines(&self) -> &[InboundLine] {
        &self.lines
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn received_date(&self) -> Option<DateTime<Utc>> {
        self.received_date
    }

    pub fn audit(&self) -> &AuditStamp {
        &self.audit
    }

    /// Called by storage after a successful save or load.
    pub fn set_persisted_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Record received/damaged quantities and move to `Received`.
    ///
    /// Validates every submitted line before touching the document, so an
    /// error leaves it unchanged. Returns the good quantities (> 0) to stock.
    pub fn receive(
        &mut self,
        cmd: &ReceiveInbound,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<ReceivedGoods>> {
        let next = self.status.transition_to(InboundStatus::Received)?;

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("no lines submitted for receiving"));
        }

        let mut seen = HashSet::new();
        let mut updates = Vec::with_capacity(cmd.lines.len());
        for receipt in &cmd.lines {
            if !seen.insert(receipt.line_id) {
                return Err(DomainError::validation(format!(
                    "line {} submitted more than once",
                    receipt.line_id
                )));
            }
            let idx = self
                .lines
                .iter()
                .position(|l| l.id == receipt.line_id)
                .ok_or_else(|| DomainError::not_found(format!("inbound line {}", receipt.line_id)))?;
            if receipt.received_quantity < 0 || receipt.damaged_quantity < 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantities cannot be negative",
                    receipt.line_id
                )));
            }
            if receipt.damaged_quantity > receipt.received_quantity {
                return Err(DomainError::business_rule(format!(
                    "line {}: damaged quantity ({}) exceeds received quantity ({})",
                    receipt.line_id, receipt.damaged_quantity, receipt.received_quantity
                )));
            }
            updates.push((idx, receipt));
        }

        let mut goods = Vec::new();
        for (idx, receipt) in updates {
            let line = &mut self.lines[idx];
            line.received_quantity = receipt.received_quantity;
            line.damaged_quantity = receipt.damaged_quantity;
            if receipt.notes.is_some() {
                line.notes = receipt.notes.clone();
            }
            if line.good_quantity() > 0 {
                goods.push(ReceivedGoods {
                    line_id: line.id,
                    key: line.key(),
                    quantity: line.good_quantity(),
                });
            }
        }

        if cmd.notes.is_some() {
            self.notes = cmd.notes.clone();
        }
        self.status = next;
        self.received_date = Some(now);
        self.audit.touch(actor, now);
        Ok(goods)
    }

    /// Cancel a pending document. Nothing was stocked, so there is no ledger effect.
    pub fn cancel(&mut self, actor: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition_to(InboundStatus::Cancelled)?;
        self.audit.touch(actor, now);
        Ok(())
    }
}

impl AggregateRoot for InboundDocument {
    type Id = InboundId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
