//! Shared list-filter shape accepted by every store list operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filter + pagination + ordering for list operations.
///
/// All fields are optional; an empty filter lists everything non-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListFilter {
    /// Exact-match constraints on whitelisted columns.
    #[serde(default)]
    pub equals: HashMap<String, String>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    /// Records must carry every listed tag.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive substring over name/title/description.
    #[serde(default)]
    pub search: Option<String>,
    /// Sort column; must be on the entity's whitelist.
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl ListFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 500;

    /// Effective limit, clamped to `[1, MAX_LIMIT]`.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// One page of results plus the total count under the same filter.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_clamping() {
        let mut f = ListFilter::default();
        assert_eq!(f.effective_limit(), ListFilter::DEFAULT_LIMIT);

        f.limit = Some(10_000);
        assert_eq!(f.effective_limit(), ListFilter::MAX_LIMIT);

        f.limit = Some(0);
        assert_eq!(f.effective_limit(), 1);

        f.offset = Some(-5);
        assert_eq!(f.effective_offset(), 0);
    }
}
