use anyhow::{Context, Result};
use procurement_core::RecordId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::entities::StoredEntity;
use crate::SqliteStore;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Optional list filters; unset fields do not constrain the query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cfo: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// One-based page number; out-of-range values are clamped.
    #[must_use]
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

fn filter_clause<E: StoredEntity>(filter: &RecordFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if E::HAS_STATUS {
        if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(Value::Text(status.to_ascii_uppercase()));
            conditions.push(format!("status = ?{}", values.len()));
        }
    }
    if let Some(cfo) = filter.cfo.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        values.push(Value::Text(cfo.to_string()));
        conditions.push(format!("cfo = ?{}", values.len()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let escaped = search.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        values.push(Value::Text(format!("%{escaped}%")));
        let placeholder = values.len();
        let any_column = E::SEARCH_COLUMNS
            .iter()
            .map(|column| format!("{column} LIKE ?{placeholder} ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        conditions.push(format!("({any_column})"));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

impl SqliteStore {
    /// # Errors
    /// Returns an error when the lookup fails or the row cannot be decoded.
    pub fn get<E: StoredEntity>(&self, id: RecordId) -> Result<Option<E>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} WHERE id = ?1", E::TABLE))
            .with_context(|| format!("failed to prepare {} lookup", E::TABLE))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(E::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Delete one record by surrogate id; links pointing at it are cleared.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete<E: StoredEntity>(&mut self, id: RecordId) -> Result<bool> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        let deleted = tx
            .execute(&format!("DELETE FROM {} WHERE id = ?1", E::TABLE), params![id.to_string()])
            .with_context(|| format!("failed to delete from {}", E::TABLE))?;
        tx.commit().context("failed to commit delete")?;
        Ok(deleted > 0)
    }

    /// # Errors
    /// Returns an error when a query fails or a row cannot be decoded.
    pub fn list<E: StoredEntity>(&self, filter: &RecordFilter, page: PageRequest) -> Result<Page<E>> {
        let (where_clause, mut values) = filter_clause::<E>(filter);

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}{where_clause}", E::TABLE),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .with_context(|| format!("failed to count {}", E::TABLE))?;

        values.push(Value::Integer(i64::from(page.page_size)));
        values.push(Value::Integer(page.offset()));
        let sql = format!(
            "SELECT * FROM {}{where_clause} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            E::TABLE,
            E::ORDER_BY,
            values.len() - 1,
            values.len()
        );
        let mut stmt = self.conn.prepare(&sql).with_context(|| format!("failed to prepare {sql}"))?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(E::from_row(row)?);
        }

        Ok(Page { items, page: page.page, page_size: page.page_size, total })
    }

    /// Every record of one entity type, for whole-table passes.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn list_all<E: StoredEntity>(&self) -> Result<Vec<E>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY {}", E::TABLE, E::ORDER_BY))
            .with_context(|| format!("failed to prepare {} scan", E::TABLE))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(E::from_row(row)?);
        }
        Ok(items)
    }
}
