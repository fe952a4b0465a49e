//! Row mappings for the `gallery` table.
//!
//! `Gallery` reads and writes full rows. `GalleryPreviews` and
//! `GalleryTimeline` are narrower projections of the same table so that
//! listing and eviction never pull full-resolution blobs.

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::Row;

use crate::db::{Collection, WritableCollection};

pub const CREATED_AT_INDEX: &str = "created_at";

const INDEXES: &[(&str, &str)] = &[(CREATED_AT_INDEX, "created_at")];

/// A full gallery row, minus its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub name: String,
    pub mime_type: String,
    pub blob: Vec<u8>,
    pub thumbnail: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// What the gallery grid needs: everything except the full image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryThumbnail {
    pub id: i64,
    pub name: String,
    pub mime_type: String,
    pub thumbnail: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

pub(crate) struct PreviewRow {
    pub name: String,
    pub mime_type: String,
    pub thumbnail: Vec<u8>,
    pub created_at: i64,
}

impl PreviewRow {
    pub fn into_thumbnail(self, id: i64) -> GalleryThumbnail {
        GalleryThumbnail {
            id,
            name: self.name,
            mime_type: self.mime_type,
            thumbnail: self.thumbnail,
            created_at: millis_to_datetime(self.created_at),
        }
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub(crate) struct Gallery;

impl Collection for Gallery {
    const NAME: &'static str = "gallery";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["name", "mime_type", "blob", "thumbnail", "created_at"];
    const INDEXES: &'static [(&'static str, &'static str)] = INDEXES;

    type Key = i64;
    type Value = StoredEntry;

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<StoredEntry> {
        Ok(StoredEntry {
            name: row.get(offset)?,
            mime_type: row.get(offset + 1)?,
            blob: row.get(offset + 2)?,
            thumbnail: row.get(offset + 3)?,
            created_at: row.get(offset + 4)?,
        })
    }
}

impl WritableCollection for Gallery {
    fn to_row(value: &StoredEntry) -> rusqlite::Result<Vec<ToSqlOutput<'_>>> {
        Ok(vec![
            value.name.to_sql()?,
            value.mime_type.to_sql()?,
            value.blob.to_sql()?,
            value.thumbnail.to_sql()?,
            value.created_at.to_sql()?,
        ])
    }
}

pub(crate) struct GalleryPreviews;

impl Collection for GalleryPreviews {
    const NAME: &'static str = "gallery";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["name", "mime_type", "thumbnail", "created_at"];
    const INDEXES: &'static [(&'static str, &'static str)] = INDEXES;

    type Key = i64;
    type Value = PreviewRow;

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<PreviewRow> {
        Ok(PreviewRow {
            name: row.get(offset)?,
            mime_type: row.get(offset + 1)?,
            thumbnail: row.get(offset + 2)?,
            created_at: row.get(offset + 3)?,
        })
    }
}

/// Ids and timestamps only; used to pick eviction victims.
pub(crate) struct GalleryTimeline;

impl Collection for GalleryTimeline {
    const NAME: &'static str = "gallery";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["created_at"];
    const INDEXES: &'static [(&'static str, &'static str)] = INDEXES;

    type Key = i64;
    type Value = i64;

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<i64> {
        row.get(offset)
    }
}
