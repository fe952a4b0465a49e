//! Lazy, single-pass walk over a collection index.

use std::collections::VecDeque;

use rusqlite::types::Value;
use rusqlite::Row;

use super::collection::{Collection, Order};
use super::{Store, StoreError};

const PAGE_SIZE: usize = 32;

type Entry<C> = (<C as Collection>::Key, <C as Collection>::Value);

/// Ordered entries of one collection, fetched a page at a time.
///
/// Each page is read in its own transaction using keyset pagination on
/// `(index column, key)`, so a scan never loads the whole collection and
/// rows inserted behind the cursor are not revisited. Once `next` returns
/// `None` it keeps returning `None`.
pub struct Scan<'s, C: Collection> {
    store: &'s Store,
    column: &'static str,
    order: Order,
    buffer: VecDeque<Entry<C>>,
    cursor: Option<(Value, C::Key)>,
    exhausted: bool,
}

impl<'s, C: Collection> Scan<'s, C> {
    pub(crate) fn new(store: &'s Store, column: &'static str, order: Order) -> Self {
        Self {
            store,
            column,
            order,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Entry<C>>, StoreError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Consume up to `limit` entries.
    pub async fn take(mut self, limit: usize) -> Result<Vec<Entry<C>>, StoreError> {
        let mut entries = Vec::with_capacity(limit.min(PAGE_SIZE));
        while entries.len() < limit {
            match self.next().await? {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }
        Ok(entries)
    }

    /// Consume every remaining entry.
    pub async fn collect(self) -> Result<Vec<Entry<C>>, StoreError> {
        self.take(usize::MAX).await
    }

    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let column = self.column;
        let key = C::KEY_COLUMN;
        let filter = if self.cursor.is_some() {
            format!("WHERE ({column}, {key}) {} (?1, ?2) ", self.order.after())
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT {column}, {key}, {columns} FROM {table} {filter}ORDER BY {column} {dir}, {key} {dir} LIMIT {PAGE_SIZE}",
            columns = C::COLUMNS.join(", "),
            table = C::NAME,
            dir = self.order.sql(),
        );
        let cursor = self.cursor.clone();

        let rows = self
            .store
            .transact(C::NAME, move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let decode = |row: &Row<'_>| -> rusqlite::Result<(Value, C::Key, C::Value)> {
                    Ok((
                        row.get::<_, Value>(0)?,
                        row.get::<_, C::Key>(1)?,
                        C::from_row(row, 2)?,
                    ))
                };
                let rows = match &cursor {
                    Some((position, key)) => stmt
                        .query_map(rusqlite::params![position, key], decode)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                    None => stmt
                        .query_map([], decode)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                };
                Ok(rows)
            })
            .await?;

        if rows.len() < PAGE_SIZE {
            self.exhausted = true;
        }
        for (position, key, value) in rows {
            self.cursor = Some((position, key.clone()));
            self.buffer.push_back((key, value));
        }
        Ok(())
    }
}
