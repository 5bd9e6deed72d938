//! Aggregate root trait and the optimistic version token.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// Aggregates own their child collections (document lines, event logs) and are
/// persisted as a unit. They never hold references to other aggregates, only ids.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Optimistic version token of the persisted row.
    ///
    /// `0` means the aggregate has never been persisted. Storage bumps the
    /// version on every successful save.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation supplied by a caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// Skip version checking (webhooks, internal callers).
    #[default]
    Any,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

impl From<Option<u64>> for ExpectedVersion {
    fn from(value: Option<u64>) -> Self {
        value.map(ExpectedVersion::Exact).unwrap_or(ExpectedVersion::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_mismatch_is_a_conflict() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        assert!(matches!(
            ExpectedVersion::Exact(2).check(3),
            Err(DomainError::Conflict(_))
        ));
        assert!(ExpectedVersion::Any.check(42).is_ok());
    }

    #[test]
    fn optional_version_maps_to_expectation() {
        assert_eq!(ExpectedVersion::from(None), ExpectedVersion::Any);
        assert_eq!(ExpectedVersion::from(Some(7)), ExpectedVersion::Exact(7));
    }
}
