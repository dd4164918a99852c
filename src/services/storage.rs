use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Local disk storage for uploaded menu photos.
pub struct UploadStorage {
    dir: PathBuf,
}

impl UploadStorage {
    /// Open the upload directory, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write image bytes under a fresh `menu-<millis>-<random>.<ext>` name.
    ///
    /// The extension comes from the client's file name when it has a sane
    /// one, otherwise from the detected image format.
    pub async fn save(&self, data: &[u8], original_name: Option<&str>) -> Result<PathBuf, StorageError> {
        let ext = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
            .or_else(|| detected_extension(data))
            .unwrap_or_else(|| "img".to_string());

        let random = Uuid::new_v4().as_u128() % 1_000_000_000;
        let file_name = format!("menu-{}-{}.{}", Utc::now().timestamp_millis(), random, ext);
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Remove a stored upload. A file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn detected_extension(data: &[u8]) -> Option<String> {
    image::guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().map(|ext| ext.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
