//! # Audit Columns and Soft Delete
//!
//! Every persisted row carries the same audit block. Instead of a base type,
//! entities embed an [`Audit`] value and implement [`Audited`].
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Part / Warehouse / Batch …  │
//! │  ──────────────────────────  │
//! │  domain fields               │
//! │  audit: Audit  ◄── flattened │──► created_at / created_by
//! └──────────────────────────────┘    updated_at / updated_by
//!                                     deleted_at / deleted_by / is_deleted
//! ```
//!
//! Rows are never physically removed: a soft delete sets `is_deleted`,
//! `deleted_at` and `deleted_by`, and every default read filters them out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard audit block shared by every persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub is_deleted: bool,
}

impl Audit {
    /// Fresh audit block for a row created now.
    pub fn created(at: DateTime<Utc>, by: Option<String>) -> Self {
        Audit {
            created_at: at,
            created_by: by,
            updated_at: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            is_deleted: false,
        }
    }

    /// Marks the block as soft-deleted.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>, by: Option<String>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = by;
    }
}

/// Capability implemented by every entity that embeds an [`Audit`] block.
pub trait Audited {
    fn audit(&self) -> &Audit;

    #[inline]
    fn is_deleted(&self) -> bool {
        self.audit().is_deleted
    }

    #[inline]
    fn created_at(&self) -> DateTime<Utc> {
        self.audit().created_at
    }
}

/// Implements [`Audited`] for types with an `audit: Audit` field.
#[macro_export]
macro_rules! impl_audited {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::audit::Audited for $ty {
                #[inline]
                fn audit(&self) -> &$crate::audit::Audit {
                    &self.audit
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        audit: Audit,
    }

    crate::impl_audited!(Row);

    #[test]
    fn test_soft_delete_marks_block() {
        let now = Utc::now();
        let mut row = Row {
            audit: Audit::created(now, Some("clerk".into())),
        };
        assert!(!row.is_deleted());

        row.audit.mark_deleted(now, Some("manager".into()));
        assert!(row.is_deleted());
        assert_eq!(row.audit().deleted_by.as_deref(), Some("manager"));
        assert_eq!(row.created_at(), now);
    }
}
