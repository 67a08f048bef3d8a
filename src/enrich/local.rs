use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{EnrichError, ImageHost};

/// Keeps uploads on local disk, served back under `/uploads/`. Used when
/// no Cloudinary credentials are configured. Images are stored as-is.
pub struct LocalImageHost {
    dir: PathBuf,
}

impl LocalImageHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageHost for LocalImageHost {
    async fn upload(&self, path: &Path) -> Result<String, EnrichError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let id = uuid::Uuid::now_v7().to_string();
        let name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", id, ext.to_ascii_lowercase()),
            None => id,
        };
        tokio::fs::copy(path, self.dir.join(&name)).await?;

        Ok(format!("/uploads/{}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_copies_into_dir_and_keeps_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("dish.JPG");
        std::fs::write(&src, b"fake jpeg").unwrap();

        let host = LocalImageHost::new(tmp.path().join("uploads"));
        let url = host.upload(&src).await.unwrap();

        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".jpg"));
        let stored = tmp.path().join("uploads").join(url.trim_start_matches("/uploads/"));
        assert_eq!(std::fs::read(stored).unwrap(), b"fake jpeg");
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(tmp.path());
        let err = host.upload(&tmp.path().join("nope.png")).await.unwrap_err();
        assert!(matches!(err, EnrichError::Io(_)));
    }
}
