//! Persistence for the current editing session.
//!
//! The whole undo/redo stack is stored as one record under a fixed key and
//! replaced on every save. Losing it never breaks editing, so every failure
//! here is logged and swallowed.

pub mod debounce;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, Type};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::db::{Collection, Store, WritableCollection};
use crate::imaging::ImageFile;

pub use debounce::Debouncer;

/// Key of the single session record.
pub const SESSION_KEY: &str = "current";

/// The persisted undo/redo stack, oldest version first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub images: Vec<ImageFile>,
    pub history_index: usize,
    pub saved_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    /// The version currently on screen.
    pub fn current(&self) -> Option<&ImageFile> {
        self.images.get(self.history_index)
    }
}

/// JSON shape of one image inside the `images` column.
#[derive(Serialize, Deserialize)]
struct StoredImage {
    name: String,
    mime_type: String,
    data: String,
}

pub(crate) struct Workflow;

impl Collection for Workflow {
    const NAME: &'static str = "workflow";
    const KEY_COLUMN: &'static str = "key";
    const COLUMNS: &'static [&'static str] = &["images", "history_index", "saved_at"];

    type Key = String;
    type Value = WorkflowSnapshot;

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<WorkflowSnapshot> {
        let json: String = row.get(offset)?;
        let stored: Vec<StoredImage> = serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(offset, Type::Text, Box::new(e)))?;
        let images = stored
            .into_iter()
            .map(|image| -> rusqlite::Result<ImageFile> {
                let bytes = STANDARD.decode(&image.data).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(offset, Type::Text, Box::new(e))
                })?;
                Ok(ImageFile::new(image.name, image.mime_type, bytes))
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let history_index: i64 = row.get(offset + 1)?;
        let saved_at: String = row.get(offset + 2)?;
        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(offset + 2, Type::Text, Box::new(e)))?;

        Ok(WorkflowSnapshot {
            images,
            history_index: history_index.max(0) as usize,
            saved_at,
        })
    }
}

impl WritableCollection for Workflow {
    fn to_row(value: &WorkflowSnapshot) -> rusqlite::Result<Vec<ToSqlOutput<'_>>> {
        let stored: Vec<StoredImage> = value
            .images
            .iter()
            .map(|image| StoredImage {
                name: image.name.clone(),
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.bytes),
            })
            .collect();
        let json = serde_json::to_string(&stored)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        Ok(vec![
            ToSqlOutput::from(json),
            ToSqlOutput::from(value.history_index as i64),
            ToSqlOutput::from(value.saved_at.to_rfc3339()),
        ])
    }
}

/// Saves and restores the editing session, with debounced writes.
pub struct SessionManager {
    store: Arc<Store>,
    debouncer: Debouncer,
}

impl SessionManager {
    pub fn new(store: Arc<Store>, config: &SessionConfig) -> Self {
        Self {
            store,
            debouncer: Debouncer::new(Duration::from_millis(config.debounce_ms)),
        }
    }

    /// Replace the stored session. An empty stack clears it instead.
    /// Supersedes any scheduled save.
    pub async fn save(&self, images: Vec<ImageFile>, history_index: usize) {
        self.debouncer.cancel().await;
        persist(&self.store, images, history_index).await;
    }

    /// Restore the stored session, or `None` if there is nothing usable.
    pub async fn load(&self) -> Option<WorkflowSnapshot> {
        match self.store.read::<Workflow>(SESSION_KEY.to_string()).await {
            Ok(Some(mut snapshot)) if !snapshot.images.is_empty() => {
                snapshot.history_index = clamp_index(snapshot.history_index, snapshot.images.len());
                debug!(
                    images = snapshot.images.len(),
                    history_index = snapshot.history_index,
                    "Restored workflow session"
                );
                Some(snapshot)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load workflow session");
                None
            }
        }
    }

    /// Delete the stored session and drop any scheduled save.
    pub async fn clear_session(&self) {
        self.debouncer.cancel().await;
        clear(&self.store).await;
    }

    /// Save after the debounce delay, unless another call supersedes this one.
    /// Must be called from within a tokio runtime.
    pub fn schedule_save(&self, images: Vec<ImageFile>, history_index: usize) {
        let store = Arc::clone(&self.store);
        self.debouncer.schedule(async move {
            persist(&store, images, history_index).await;
        });
    }

    /// Write any scheduled save now and wait for it.
    pub async fn flush(&self) {
        self.debouncer.flush().await;
    }

    pub fn has_pending_save(&self) -> bool {
        self.debouncer.is_pending()
    }
}

async fn persist(store: &Store, images: Vec<ImageFile>, history_index: usize) {
    if images.is_empty() {
        clear(store).await;
        return;
    }

    let clamped = clamp_index(history_index, images.len());
    if clamped != history_index {
        warn!(history_index, images = images.len(), "History index out of range; clamping");
    }

    let snapshot = WorkflowSnapshot {
        images,
        history_index: clamped,
        saved_at: Utc::now(),
    };
    let count = snapshot.images.len();
    match store.write::<Workflow>(SESSION_KEY.to_string(), snapshot).await {
        Ok(()) => debug!(images = count, history_index = clamped, "Saved workflow session"),
        Err(e) => warn!(error = %e, "Failed to save workflow session"),
    }
}

async fn clear(store: &Store) {
    match store.delete::<Workflow>(SESSION_KEY.to_string()).await {
        Ok(()) => debug!("Cleared workflow session"),
        Err(e) => warn!(error = %e, "Failed to clear workflow session"),
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}
