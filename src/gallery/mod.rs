//! Bounded gallery of past results.
//!
//! Entries are appended with a derived thumbnail and never modified. After
//! every insert the oldest entries beyond `max_images` are deleted. Listing
//! returns thumbnails only; the full image is fetched on demand by id.

mod records;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{GalleryConfig, ThumbnailConfig};
use crate::db::{Order, Store, StoreError};
use crate::imaging::{ImageFile, ImagingError, ThumbnailDeriver};

pub use records::GalleryThumbnail;

use records::{Gallery, GalleryPreviews, GalleryTimeline, StoredEntry, CREATED_AT_INDEX};

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error("thumbnail task failed: {0}")]
    Task(String),
}

pub struct GalleryManager {
    store: Arc<Store>,
    max_images: usize,
    thumbnails: ThumbnailDeriver,
}

impl GalleryManager {
    pub fn new(store: Arc<Store>, config: &GalleryConfig, thumbnails: &ThumbnailConfig) -> Self {
        Self {
            store,
            max_images: config.max_images,
            thumbnails: ThumbnailDeriver::new(thumbnails),
        }
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    /// Append `image`. Failures are logged and reported as `None`.
    pub async fn add(&self, image: ImageFile) -> Option<i64> {
        let name = image.name.clone();
        match self.try_add(image).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to add image to gallery");
                None
            }
        }
    }

    /// Append `image`, derive its thumbnail, then evict past the bound.
    pub async fn try_add(&self, image: ImageFile) -> Result<i64, GalleryError> {
        let deriver = self.thumbnails;
        let (image, thumbnail) = tokio::task::spawn_blocking(move || {
            deriver.derive(&image.bytes).map(|thumbnail| (image, thumbnail))
        })
        .await
        .map_err(|e| GalleryError::Task(e.to_string()))??;

        let entry = StoredEntry {
            name: image.name,
            mime_type: image.mime_type,
            blob: image.bytes,
            thumbnail,
            created_at: Utc::now().timestamp_millis(),
        };
        let id = self.store.insert::<Gallery>(entry).await?;
        debug!(id, "Added gallery entry");

        self.evict().await?;
        Ok(id)
    }

    /// Delete the oldest entries until at most `max_images` remain.
    async fn evict(&self) -> Result<usize, StoreError> {
        let count = self.store.count::<Gallery>().await?;
        if count <= self.max_images {
            return Ok(0);
        }

        let victims = self
            .store
            .scan::<GalleryTimeline>(CREATED_AT_INDEX, Order::Ascending)?
            .take(count - self.max_images)
            .await?;
        for (id, _) in &victims {
            self.store.delete::<Gallery>(*id).await?;
        }
        info!(evicted = victims.len(), kept = self.max_images, "Evicted oldest gallery entries");
        Ok(victims.len())
    }

    /// Thumbnails and metadata, newest first. Empty on failure.
    pub async fn list(&self) -> Vec<GalleryThumbnail> {
        match self.try_list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list gallery");
                Vec::new()
            }
        }
    }

    async fn try_list(&self) -> Result<Vec<GalleryThumbnail>, StoreError> {
        let rows = self
            .store
            .scan::<GalleryPreviews>(CREATED_AT_INDEX, Order::Descending)?
            .collect()
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, row)| row.into_thumbnail(id))
            .collect())
    }

    /// The full-resolution image for `id`.
    pub async fn get(&self, id: i64) -> Option<ImageFile> {
        match self.store.read::<Gallery>(id).await {
            Ok(entry) => entry.map(|e| ImageFile::new(e.name, e.mime_type, e.blob)),
            Err(e) => {
                warn!(id, error = %e, "Failed to read gallery entry");
                None
            }
        }
    }

    /// Delete one entry. Unknown ids are ignored.
    pub async fn remove(&self, id: i64) {
        if let Err(e) = self.store.delete::<Gallery>(id).await {
            warn!(id, error = %e, "Failed to remove gallery entry");
        }
    }

    pub async fn clear(&self) {
        match self.store.clear::<Gallery>().await {
            Ok(()) => info!("Cleared gallery"),
            Err(e) => warn!(error = %e, "Failed to clear gallery"),
        }
    }

    pub async fn len(&self) -> usize {
        match self.store.count::<Gallery>().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count gallery entries");
                0
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::imaging::test_images;
    use crate::session::SessionManager;
    use image::{GenericImageView, ImageFormat};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<Store> {
        Arc::new(Store::new(dir.path().join("workbench.db")))
    }

    fn gallery(dir: &TempDir) -> GalleryManager {
        GalleryManager::new(store(dir), &GalleryConfig::default(), &ThumbnailConfig::default())
    }

    fn pixel(i: usize) -> ImageFile {
        let shade = (i * 11 % 256) as u8;
        ImageFile::new(format!("gen-{}.png", i), "image/png", test_images::pixel_png(shade, 0, 255 - shade))
    }

    #[tokio::test]
    async fn test_twenty_first_add_evicts_first() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);

        let mut ids = Vec::new();
        for i in 1..=21 {
            ids.push(gallery.add(pixel(i)).await.unwrap());
        }

        let listed = gallery.list().await;
        assert_eq!(listed.len(), 20);
        assert_eq!(gallery.len().await, 20);
        assert!(listed.iter().all(|e| e.id != ids[0]));

        // Newest first: exactly the last 20 adds, in reverse.
        let listed_ids: Vec<_> = listed.iter().map(|e| e.id).collect();
        let expected: Vec<_> = ids[1..].iter().rev().copied().collect();
        assert_eq!(listed_ids, expected);
        assert_eq!(listed[0].name, "gen-21.png");
        assert!(gallery.get(ids[0]).await.is_none());
    }

    #[tokio::test]
    async fn test_many_adds_keep_bound() {
        let dir = TempDir::new().unwrap();
        let gallery = GalleryManager::new(
            store(&dir),
            &GalleryConfig { max_images: 5 },
            &ThumbnailConfig::default(),
        );

        for i in 0..40 {
            gallery.add(pixel(i)).await.unwrap();
        }

        let names: Vec<_> = gallery.list().await.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["gen-39.png", "gen-38.png", "gen-37.png", "gen-36.png", "gen-35.png"]);
    }

    #[tokio::test]
    async fn test_get_returns_full_image() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);
        let original = ImageFile::new("big.png", "image/png", test_images::noisy_png(640, 320));

        let id = gallery.add(original.clone()).await.unwrap();
        assert_eq!(gallery.get(id).await.unwrap(), original);
        assert!(gallery.get(id + 1000).await.is_none());
    }

    #[tokio::test]
    async fn test_list_carries_thumbnails() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);
        gallery
            .add(ImageFile::new("big.png", "image/png", test_images::noisy_png(640, 320)))
            .await
            .unwrap();

        let listed = gallery.list().await;
        let thumb = &listed[0].thumbnail;
        assert_eq!(image::guess_format(thumb).unwrap(), ImageFormat::Jpeg);
        assert_eq!(image::load_from_memory(thumb).unwrap().dimensions(), (200, 100));
        assert_eq!(listed[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);
        let keep = gallery.add(pixel(1)).await.unwrap();
        let removed = gallery.add(pixel(2)).await.unwrap();

        gallery.remove(removed).await;
        gallery.remove(removed).await;
        gallery.remove(9999).await;

        let ids: Vec<_> = gallery.list().await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![keep]);
    }

    #[tokio::test]
    async fn test_clear_does_not_reuse_ids() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);
        let first = gallery.add(pixel(1)).await.unwrap();

        gallery.clear().await;
        assert!(gallery.is_empty().await);

        let second = gallery.add(pixel(2)).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_identical_images_are_both_kept() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);
        gallery.add(pixel(7)).await.unwrap();
        gallery.add(pixel(7)).await.unwrap();
        assert_eq!(gallery.len().await, 2);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_not_stored() {
        let dir = TempDir::new().unwrap();
        let gallery = gallery(&dir);
        let broken = ImageFile::new("broken.png", "image/png", b"not a png".to_vec());

        assert!(matches!(
            gallery.try_add(broken.clone()).await,
            Err(GalleryError::Imaging(ImagingError::Decode(_)))
        ));
        assert!(gallery.add(broken).await.is_none());
        assert!(gallery.is_empty().await);
    }

    #[tokio::test]
    async fn test_shares_store_with_session() {
        let dir = TempDir::new().unwrap();
        let shared = store(&dir);
        let gallery = GalleryManager::new(Arc::clone(&shared), &GalleryConfig::default(), &ThumbnailConfig::default());
        let sessions = SessionManager::new(Arc::clone(&shared), &SessionConfig::default());

        let id = gallery.add(pixel(3)).await.unwrap();
        sessions.save(vec![pixel(3)], 0).await;

        assert_eq!(gallery.get(id).await.unwrap(), pixel(3));
        assert_eq!(sessions.load().await.unwrap().images, vec![pixel(3)]);
        assert_eq!(Arc::strong_count(&shared), 3);
    }

    #[tokio::test]
    async fn test_add_recovers_after_table_dropped_externally() {
        let dir = TempDir::new().unwrap();
        let shared = store(&dir);
        let gallery = GalleryManager::new(Arc::clone(&shared), &GalleryConfig::default(), &ThumbnailConfig::default());
        gallery.add(pixel(1)).await.unwrap();

        {
            let other = rusqlite::Connection::open(shared.path()).unwrap();
            other.execute_batch("DROP TABLE gallery").unwrap();
        }

        assert!(matches!(
            gallery.try_add(pixel(2)).await,
            Err(GalleryError::Store(StoreError::SchemaMissing { .. }))
        ));
        assert!(!shared.is_open().await);

        let id = gallery.try_add(pixel(3)).await.unwrap();
        let listed = gallery.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }
}
