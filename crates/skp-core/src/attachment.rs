use async_trait::async_trait;

use crate::config::UploadsConfig;
use crate::error::{StoreError, WorkflowError};

/// A file as received from the client, before any policy checks.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Size and type limits for uploaded attachments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_bytes: u64,
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            allowed_extensions: vec!["pdf".to_string()],
        }
    }
}

impl From<&UploadsConfig> for AttachmentPolicy {
    fn from(cfg: &UploadsConfig) -> Self {
        Self {
            max_bytes: cfg.max_bytes,
            allowed_extensions: cfg
                .allowed_extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

impl AttachmentPolicy {
    /// Validates a file and returns its lowercase extension.
    pub fn check(&self, file: &IncomingFile) -> Result<String, WorkflowError> {
        if file.filename.trim().is_empty() {
            return Err(WorkflowError::validation("file is required"));
        }
        if file.bytes.len() as u64 > self.max_bytes {
            return Err(WorkflowError::validation(format!(
                "file exceeds the {} byte limit",
                self.max_bytes
            )));
        }
        let ext = extension(&file.filename).unwrap_or_default();
        if !self.allowed_extensions.iter().any(|a| *a == ext) {
            return Err(WorkflowError::validation(format!(
                "only {} files are accepted",
                self.allowed_extensions.join(", ")
            )));
        }
        Ok(ext)
    }
}

pub fn extension(filename: &str) -> Option<String> {
    let base = base_name(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

/// Strips any path and replaces characters outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = base_name(filename.trim())
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Where attachment bytes end up.
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    /// Persists `bytes` under `stored_name` and returns the public URL.
    async fn store(&self, stored_name: &str, bytes: &[u8]) -> Result<String, StoreError>;

    /// Removes a previously stored file. Missing files are not an error.
    async fn discard(&self, stored_name: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, len: usize) -> IncomingFile {
        IncomingFile {
            filename: name.to_string(),
            bytes: vec![0u8; len],
        }
    }

    #[test]
    fn pdf_within_limit_passes() {
        let policy = AttachmentPolicy::default();
        assert_eq!(policy.check(&file("Certificate.PDF", 1024)).unwrap(), "pdf");
    }

    #[test]
    fn oversized_or_wrong_type_fails() {
        let policy = AttachmentPolicy {
            max_bytes: 10,
            allowed_extensions: vec!["pdf".into()],
        };
        assert!(matches!(
            policy.check(&file("a.pdf", 11)),
            Err(WorkflowError::Validation(_))
        ));
        assert!(policy.check(&file("a.pdf", 10)).is_ok());
        assert!(policy.check(&file("photo.png", 1)).is_err());
        assert!(policy.check(&file("pdf", 1)).is_err());
        assert!(policy.check(&file("", 1)).is_err());
    }

    #[test]
    fn policy_from_config_normalizes_extensions() {
        let cfg = UploadsConfig {
            allowed_extensions: vec![".PDF".into(), " png ".into(), "".into()],
            ..UploadsConfig::default()
        };
        let policy = AttachmentPolicy::from(&cfg);
        assert_eq!(policy.allowed_extensions, vec!["pdf", "png"]);
    }

    #[test]
    fn sanitize_strips_paths_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\my cert (1).pdf"), "my_cert__1_.pdf");
        assert_eq!(sanitize_filename(".hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("///"), "file");
    }
}
