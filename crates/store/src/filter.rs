//! Translate the shared [`ListFilter`] into SQL.
//!
//! Every list operation funnels through this builder so filtering,
//! search, ordering, and pagination behave identically across entities.
//! Column names are whitelisted per entity; anything else is rejected
//! before touching SQL.

use sqlx::{Postgres, QueryBuilder};

use vigil_core::filter::ListFilter;

use crate::error::StoreError;

/// Per-entity column whitelists.
pub(crate) struct FilterColumns {
    /// Columns usable in exact-match `equals` constraints.
    pub equals: &'static [&'static str],
    /// Columns scanned by the case-insensitive substring search.
    pub search: &'static [&'static str],
    /// Columns usable as sort keys.
    pub sort: &'static [&'static str],
    /// Fallback ordering when the filter names no sort key.
    pub default_sort: &'static str,
}

/// Append `WHERE`-clause conditions (beyond the caller's base predicate)
/// for `filter`. The caller must already have emitted `WHERE <base>`.
pub(crate) fn push_conditions(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &ListFilter,
    columns: &FilterColumns,
) -> Result<(), StoreError> {
    for (column, value) in &filter.equals {
        if !columns.equals.contains(&column.as_str()) {
            return Err(StoreError::InvalidInput(format!(
                "cannot filter on '{column}'"
            )));
        }
        qb.push(format!(" AND {column} = "));
        qb.push_bind(value.clone());
    }

    if let Some(after) = filter.created_after {
        qb.push(" AND created_at >= ");
        qb.push_bind(after);
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND created_at < ");
        qb.push_bind(before);
    }

    if !filter.tags.is_empty() {
        // Containment: the record's tag array must include every
        // requested tag.
        let tags_json = serde_json::to_value(&filter.tags)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        qb.push(" AND tags @> ");
        qb.push_bind(tags_json);
    }

    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (");
        for (i, column) in columns.search.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("{column} ILIKE "));
            qb.push_bind(pattern.clone());
        }
        qb.push(")");
    }

    Ok(())
}

/// Append `ORDER BY … LIMIT … OFFSET …`.
pub(crate) fn push_ordering(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &ListFilter,
    columns: &FilterColumns,
) -> Result<(), StoreError> {
    let sort_column = match filter.sort_by.as_deref() {
        Some(col) => {
            if !columns.sort.contains(&col) {
                return Err(StoreError::InvalidInput(format!("cannot sort by '{col}'")));
            }
            col
        }
        None => columns.default_sort,
    };

    qb.push(format!(
        " ORDER BY {sort_column} {}",
        filter.sort_direction.as_sql()
    ));
    qb.push(" LIMIT ");
    qb.push_bind(filter.effective_limit());
    qb.push(" OFFSET ");
    qb.push_bind(filter.effective_offset());
    Ok(())
}

/// Escape LIKE wildcards in user-supplied search text.
fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::filter::SortDirection;

    const COLUMNS: FilterColumns = FilterColumns {
        equals: &["status", "severity"],
        search: &["title", "description"],
        sort: &["created_at", "severity"],
        default_sort: "created_at",
    };

    fn render(filter: &ListFilter) -> Result<String, StoreError> {
        let mut qb = QueryBuilder::new("SELECT * FROM alerts WHERE deleted_at IS NULL");
        push_conditions(&mut qb, filter, &COLUMNS)?;
        push_ordering(&mut qb, filter, &COLUMNS)?;
        Ok(qb.sql().to_string())
    }

    #[test]
    fn empty_filter_defaults() {
        let sql = render(&ListFilter::default()).unwrap();
        assert!(sql.contains("ORDER BY created_at DESC"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn equals_whitelist_enforced() {
        let mut filter = ListFilter::default();
        filter.equals.insert("status".to_string(), "open".to_string());
        assert!(render(&filter).is_ok());

        let mut filter = ListFilter::default();
        filter
            .equals
            .insert("password; DROP TABLE alerts".to_string(), "x".to_string());
        assert!(matches!(render(&filter), Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn sort_whitelist_enforced() {
        let mut filter = ListFilter::default();
        filter.sort_by = Some("severity".to_string());
        filter.sort_direction = SortDirection::Asc;
        let sql = render(&filter).unwrap();
        assert!(sql.contains("ORDER BY severity ASC"));

        filter.sort_by = Some("evil".to_string());
        assert!(matches!(render(&filter), Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn search_covers_all_columns() {
        let mut filter = ListFilter::default();
        filter.search = Some("wire".to_string());
        let sql = render(&filter).unwrap();
        assert!(sql.contains("title ILIKE"));
        assert!(sql.contains("description ILIKE"));
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50%_done"), "50\\%\\_done");
    }
}
