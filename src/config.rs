use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub gallery: GalleryConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `WORKBENCH_LOG` overrides this.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for the rolling log file when journald is unavailable.
    /// Defaults to `logs/` beside the database.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryConfig {
    /// Entries kept after every insert; older ones are evicted.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

fn default_max_images() -> usize {
    20
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Quiet period before a scheduled session save is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Longest edge of a gallery thumbnail, in pixels.
    #[serde(default = "default_thumb_max_edge")]
    pub max_edge: u32,

    #[serde(default = "default_thumb_quality")]
    pub quality: f32,
}

fn default_thumb_max_edge() -> u32 {
    200
}

fn default_thumb_quality() -> f32 {
    0.8
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_edge: default_thumb_max_edge(),
            quality: default_thumb_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_target_bytes")]
    pub target_bytes: u64,

    /// Longest edge allowed before any quality pass.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Quality factors tried in order, highest first.
    #[serde(default = "default_quality_ladder")]
    pub quality_ladder: Vec<f32>,

    /// Scale factors tried in order once the quality ladder is exhausted.
    #[serde(default = "default_scale_ladder")]
    pub scale_ladder: Vec<f32>,

    /// Quality used for every scale step.
    #[serde(default = "default_scale_quality")]
    pub scale_quality: f32,
}

fn default_target_bytes() -> u64 {
    20 * 1024 * 1024 // 20MB
}

fn default_max_dimension() -> u32 {
    4096
}

fn default_quality_ladder() -> Vec<f32> {
    vec![0.9, 0.8, 0.7, 0.6, 0.5]
}

fn default_scale_ladder() -> Vec<f32> {
    vec![0.9, 0.8, 0.7, 0.6, 0.5]
}

fn default_scale_quality() -> f32 {
    0.7
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            target_bytes: default_target_bytes(),
            max_dimension: default_max_dimension(),
            quality_ladder: default_quality_ladder(),
            scale_ladder: default_scale_ladder(),
            scale_quality: default_scale_quality(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workbench")
        .join("workbench.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            gallery: GalleryConfig::default(),
            session: SessionConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            compression: CompressionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `WORKBENCH_CONFIG` if set, else the default location,
    /// writing a default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("WORKBENCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("workbench")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Where the file log goes: the configured directory, else `logs/`
    /// next to the database.
    pub fn log_dir(&self) -> PathBuf {
        match &self.logging.dir {
            Some(dir) => dir.clone(),
            None => self
                .db_path
                .parent()
                .map(|parent| parent.join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/wb.db"

            [gallery]
            max_images = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/wb.db"));
        assert_eq!(config.gallery.max_images, 5);
        assert_eq!(config.session.debounce_ms, 500);
        assert_eq!(config.thumbnails.max_edge, 200);
        assert_eq!(config.compression.target_bytes, 20 * 1024 * 1024);
        assert_eq!(config.compression.quality_ladder, vec![0.9, 0.8, 0.7, 0.6, 0.5]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut config = Config::default();
        config.session.debounce_ms = 250;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.session.debounce_ms, 250);
        assert_eq!(loaded.compression.max_dimension, 4096);
    }

    #[test]
    fn test_log_dir_follows_database() {
        let mut config: Config = toml::from_str(r#"db_path = "/var/lib/wb/store.db""#).unwrap();
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.log_dir(), PathBuf::from("/var/lib/wb/logs"));

        config.logging.dir = Some(PathBuf::from("/tmp/wb-logs"));
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/wb-logs"));
    }
}
