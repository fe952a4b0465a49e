//! Typed view of one store table.
//!
//! A [`Collection`] names a table, its key column, the value columns it reads,
//! and the indexes a [`Scan`](super::Scan) may walk. Several collections can
//! share a table to project different column sets (the gallery list never
//! reads full-resolution blobs).

use rusqlite::types::{FromSql, ToSql, ToSqlOutput};
use rusqlite::Row;

/// Scan direction over an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }

    /// Comparison that selects rows strictly after the cursor.
    pub(crate) fn after(self) -> &'static str {
        match self {
            Order::Ascending => ">",
            Order::Descending => "<",
        }
    }
}

pub trait Collection: 'static {
    /// Table name.
    const NAME: &'static str;
    const KEY_COLUMN: &'static str;
    /// Value columns, in the order [`Collection::from_row`] reads them.
    const COLUMNS: &'static [&'static str];
    /// `(index name, column)` pairs usable with `Store::scan`.
    const INDEXES: &'static [(&'static str, &'static str)] = &[];

    type Key: ToSql + FromSql + Clone + Send + 'static;
    type Value: Send + 'static;

    /// Decode a value whose first column sits at `offset`.
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self::Value>;

    fn index_column(name: &str) -> Option<&'static str> {
        Self::INDEXES
            .iter()
            .find(|(index, _)| *index == name)
            .map(|(_, column)| *column)
    }
}

/// A collection whose values can be written back in full.
pub trait WritableCollection: Collection {
    /// Encode `value` as one SQL parameter per entry of `COLUMNS`.
    fn to_row(value: &Self::Value) -> rusqlite::Result<Vec<ToSqlOutput<'_>>>;
}

pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
