//! Human-readable document numbers: `<PREFIX>-<yyyyMMdd>-<seq>`.
//!
//! The sequence restarts at `0001` every day and is the next integer after the
//! highest suffix already issued for that day, padded to at least 4 digits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Inbound,
    Outbound,
    Payment,
    Delivery,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Inbound => "IB",
            DocumentKind::Outbound => "OUT",
            DocumentKind::Payment => "PAY",
            DocumentKind::Delivery => "DEL",
        }
    }

    /// Shared leading part of every number issued on `date`, e.g. `IB-20240131-`.
    pub fn day_prefix(self, date: NaiveDate) -> String {
        format!("{}-{}-", self.prefix(), date.format("%Y%m%d"))
    }

    /// Sequence suffix of `number` if it was issued for this kind on `date`.
    pub fn sequence_of(self, date: NaiveDate, number: &str) -> Option<u32> {
        let rest = number.strip_prefix(&self.day_prefix(date))?;
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()
    }

    /// Highest sequence among `numbers` issued for this kind on `date`.
    pub fn highest_sequence<'a>(
        self,
        date: NaiveDate,
        numbers: impl IntoIterator<Item = &'a str>,
    ) -> Option<u32> {
        numbers
            .into_iter()
            .filter_map(|n| self.sequence_of(date, n))
            .max()
    }

    /// Number following `highest` (or the first of the day).
    pub fn next_number(self, date: NaiveDate, highest: Option<u32>) -> String {
        let seq = highest.map(|h| h + 1).unwrap_or(1);
        format!("{}{:04}", self.day_prefix(date), seq)
    }
}
