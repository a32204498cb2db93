use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "configs/skp.toml";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `references.sqlite` and `documents.sqlite`.
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./state"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    pub url_prefix: String,
    pub max_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./uploads"),
            url_prefix: "/uploads".to_string(),
            max_bytes: 5 * 1024 * 1024,
            allowed_extensions: vec!["pdf".to_string()],
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListingConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DirectoryConfig {
    /// TOML file with users, students and lecturers to seed at startup.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<ServiceConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: ServiceConfig =
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl ServiceConfig {
    /// `SKP_CONFIG`, then `configs/skp.toml`, then built-in defaults; env
    /// overrides are applied last.
    pub fn discover() -> Result<Self> {
        let mut cfg = match std::env::var("SKP_CONFIG") {
            Ok(p) if !p.trim().is_empty() => load_config(Path::new(p.trim()))?,
            _ => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    load_config(default)?
                } else {
                    ServiceConfig::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env("SKP_STATE_DIR") {
            self.storage.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("SKP_UPLOADS_DIR") {
            self.uploads.dir = PathBuf::from(dir);
        }
        if let Some(raw) = non_empty_env("SKP_UPLOAD_MAX_BYTES") {
            self.uploads.max_bytes = raw
                .parse()
                .with_context(|| format!("SKP_UPLOAD_MAX_BYTES must be an integer, got {raw:?}"))?;
        }
        if let Some(path) = non_empty_env("SKP_DIRECTORY") {
            self.directory.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.listing.default_limit == 0 || self.listing.max_limit == 0 {
            anyhow::bail!("listing limits must be positive");
        }
        if self.listing.default_limit > self.listing.max_limit {
            anyhow::bail!(
                "listing.default_limit ({}) exceeds listing.max_limit ({})",
                self.listing.default_limit,
                self.listing.max_limit
            );
        }
        if self.uploads.max_bytes == 0 {
            anyhow::bail!("uploads.max_bytes must be positive");
        }
        if !self.uploads.url_prefix.starts_with('/') {
            anyhow::bail!("uploads.url_prefix must start with '/'");
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.uploads.max_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.listing.default_limit, 10);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: ServiceConfig = toml::from_str(
            r#"
            [uploads]
            max_bytes = 1024
            [listing]
            max_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(cfg.uploads.max_bytes, 1024);
        assert_eq!(cfg.uploads.allowed_extensions, vec!["pdf"]);
        assert_eq!(cfg.listing.max_limit, 50);
        assert_eq!(cfg.listing.default_limit, 10);
        assert_eq!(cfg.storage.state_dir, PathBuf::from("./state"));
    }

    #[test]
    fn load_config_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skp.toml");
        std::fs::write(
            &path,
            "[listing]\ndefault_limit = 20\nmax_limit = 10\n",
        )
        .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("default_limit"));

        std::fs::write(&path, "[storage]\nstate_dir = \"/tmp/skp\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.storage.state_dir, PathBuf::from("/tmp/skp"));
    }
}
