//! On-device persistence for an image editor: the in-progress undo/redo
//! session and a bounded gallery of past results, both kept in one versioned
//! SQLite file.
//!
//! ```no_run
//! use std::sync::Arc;
//! use workbench::{Config, GalleryManager, SessionManager, Store};
//!
//! # async fn run() {
//! let config = Config::default();
//! let store = Arc::new(Store::new(&config.db_path));
//! let gallery = GalleryManager::new(Arc::clone(&store), &config.gallery, &config.thumbnails);
//! let sessions = SessionManager::new(store, &config.session);
//!
//! if let Some(session) = sessions.load().await {
//!     println!("resuming {} versions", session.images.len());
//! }
//! for entry in gallery.list().await {
//!     println!("{} {}", entry.id, entry.name);
//! }
//! # }
//! ```

pub mod config;
pub mod db;
pub mod gallery;
pub mod imaging;
pub mod logging;
pub mod session;

pub use config::Config;
pub use db::{Store, StoreError};
pub use gallery::{GalleryError, GalleryManager, GalleryThumbnail};
pub use imaging::{compress, ImageFile, ImagingError, ThumbnailDeriver};
pub use session::{SessionManager, WorkflowSnapshot};
