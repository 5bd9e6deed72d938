//! Lifecycle state machines.
//!
//! Each lifecycle status is a closed enum with an explicit table of legal
//! `(from, to)` pairs. Legality is checked against the table before any
//! mutation; same-state moves are legal only when the table lists them.

use core::fmt::Display;

use crate::error::{DomainError, DomainResult};

pub trait StatusMachine: Copy + Eq + Display + 'static {
    /// Every legal transition.
    const TRANSITIONS: &'static [(Self, Self)];

    /// Every variant, used for parsing external status strings.
    const ALL: &'static [Self];

    fn as_str(self) -> &'static str;

    fn can_transition_to(self, next: Self) -> bool {
        Self::TRANSITIONS.contains(&(self, next))
    }

    /// Validate a move, returning the new status.
    fn transition_to(self, next: Self) -> DomainResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_transition(self, next))
        }
    }
}

/// Parse an external status string against a state machine's variants.
///
/// Matching ignores ASCII case, `_`, `-` and spaces, so `InTransit`,
/// `in_transit` and `IN-TRANSIT` all resolve to the same variant.
pub fn parse_status<S: StatusMachine>(raw: &str) -> DomainResult<S> {
    let wanted = normalize(raw);
    if wanted.is_empty() {
        return Err(DomainError::missing_field("status"));
    }
    S::ALL
        .iter()
        .copied()
        .find(|s| normalize(s.as_str()) == wanted)
        .ok_or_else(|| DomainError::validation(format!("unknown status '{raw}'")))
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Implements `Display` and `FromStr` for a status enum in terms of [`StatusMachine`].
#[macro_export]
macro_rules! status_text {
    ($t:ty) => {
        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str($crate::status::StatusMachine::as_str(*self))
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::status::parse_status::<$t>(s)
            }
        }
    };
}
