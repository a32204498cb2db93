use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use skp_core::attachment::AttachmentSink;
use skp_core::config::UploadsConfig;
use skp_core::StoreError;

/// Attachment bytes on local disk, served back under `url_prefix`.
#[derive(Clone, Debug)]
pub struct FsAttachmentSink {
    dir: PathBuf,
    url_prefix: String,
}

impl FsAttachmentSink {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str) -> Self {
        let trimmed = url_prefix.trim().trim_end_matches('/');
        let url_prefix = if trimmed.starts_with('/') || trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            dir: dir.into(),
            url_prefix,
        }
    }

    pub fn from_config(cfg: &UploadsConfig) -> Self {
        Self::new(&cfg.dir, &cfg.url_prefix)
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf, StoreError> {
        if stored_name.is_empty()
            || stored_name.contains(['/', '\\'])
            || stored_name.starts_with('.')
        {
            return Err(StoreError::Conflict(format!(
                "refusing to store attachment as {stored_name:?}"
            )));
        }
        Ok(self.dir.join(stored_name))
    }
}

#[async_trait]
impl AttachmentSink for FsAttachmentSink {
    async fn store(&self, stored_name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let path = self.path_for(stored_name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create uploads dir {}", self.dir.display()))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write attachment {}", path.display()))?;
        debug!(target: "skp::http", path = %path.display(), bytes = bytes.len(), "attachment written");
        Ok(format!("{}/{}", self.url_prefix, stored_name))
    }

    async fn discard(&self, stored_name: &str) -> Result<(), StoreError> {
        let path = self.path_for(stored_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("remove attachment {}", path.display()))
                .into()),
        }
    }
}
