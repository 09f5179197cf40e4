//! CLI configuration.
//!
//! Stored as TOML with `[signer]` and `[uploader]` tables:
//! - Linux/macOS: `~/.config/blobup/config.toml`
//! - Windows: `%APPDATA%/blobup/config.toml`
//!
//! Command-line flags override file values.

use std::path::{Path, PathBuf};

use anyhow::Context;
use blobup_http::{RequestMethod, SignerConfig};
use blobup_uploader::UploaderConfig;
use serde::{Deserialize, Serialize};

use crate::Cli;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub uploader: UploaderConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(server) = &cli.server {
            self.signer.server_url = server.clone();
        }
        if cli.post {
            self.signer.method = RequestMethod::Post;
        }
        if let Some(part_size) = cli.part_size {
            self.uploader.part_size = part_size;
        }
        if let Some(concurrency) = cli.concurrency {
            self.uploader.max_concurrency = concurrency;
        }
        if let Some(max_tries) = cli.max_tries {
            self.uploader.max_tries = max_tries;
        }
        if cli.hash {
            self.uploader.hash_content = true;
        }
    }
}

pub fn default_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("blobup").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("blobup")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.signer.server_url.is_empty());
        assert_eq!(config.signer.method, RequestMethod::Get);
        assert_eq!(config.uploader.part_size, 5 * 1024 * 1024);
        assert_eq!(config.uploader.max_concurrency, 4);
        assert_eq!(config.uploader.max_tries, 3);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
            [signer]
            server_url = "https://example.com/server.php"

            [uploader]
            max_concurrency = 8
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.signer.server_url, "https://example.com/server.php");
        assert_eq!(config.signer.timeout_secs, 30);
        assert_eq!(config.uploader.max_concurrency, 8);
        assert_eq!(config.uploader.part_size, 5 * 1024 * 1024);
        assert_eq!(config.uploader.retry.initial_delay_ms, 0);
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.signer.server_url = "http://localhost/server.php".into();
        config.signer.method = RequestMethod::Post;
        config.uploader.hash_content = true;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn bad_toml_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[uploader\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn flags_override_file() {
        let mut config = Config::default();
        config.signer.server_url = "http://file".into();

        let cli = Cli::parse_from([
            "blobup",
            "video.mp4",
            "--server",
            "http://flag",
            "--post",
            "--part-size",
            "10485760",
            "-j",
            "2",
            "--hash",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.signer.server_url, "http://flag");
        assert_eq!(config.signer.method, RequestMethod::Post);
        assert_eq!(config.uploader.part_size, 10_485_760);
        assert_eq!(config.uploader.max_concurrency, 2);
        assert_eq!(config.uploader.max_tries, 3);
        assert!(config.uploader.hash_content);
    }

    #[test]
    fn file_is_optional_only_for_init() {
        assert!(Cli::try_parse_from(["blobup"]).is_err());
        assert!(Cli::try_parse_from(["blobup", "--init-config"]).is_ok());
    }

    #[test]
    fn default_path_names_blobup() {
        assert!(default_path().to_string_lossy().contains("blobup"));
    }
}
