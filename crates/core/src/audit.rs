//! Who/when bookkeeping shared by every document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl AuditStamp {
    pub fn new(actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            created_by: actor.to_string(),
            updated_at: now,
            updated_by: actor.to_string(),
        }
    }

    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.updated_at = now;
        self.updated_by = actor.to_string();
    }
}
