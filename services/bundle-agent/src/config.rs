//! Configuration for the bundle agent.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::system::Ownership;

/// Bundle agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory for local state.
    pub data_dir: PathBuf,

    /// Root under which bundle versions are installed.
    pub bundle_install_dir: PathBuf,

    /// Root under which enabled bundles are linked.
    pub bundle_enable_dir: PathBuf,

    /// Directory of the local blob store.
    pub blobs_dir: PathBuf,

    /// Permission bits applied to installed bundles.
    pub bundle_mode: u32,

    /// Owner applied to installed bundles.
    pub bundle_owner: Ownership,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(
            var("GHOST_DATA_DIR").unwrap_or_else(|| "/var/lib/ghost".to_string()),
        );

        let bundle_install_dir = var("GHOST_BUNDLE_INSTALL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("data/packages"));

        let bundle_enable_dir = var("GHOST_BUNDLE_ENABLE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("packages"));

        let blobs_dir = var("GHOST_BLOBS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("data/blobs"));

        let bundle_mode = match var("GHOST_BUNDLE_MODE") {
            Some(raw) => parse_mode(&raw)
                .with_context(|| format!("GHOST_BUNDLE_MODE '{raw}' is not an octal mode"))?,
            None => 0o755,
        };

        let bundle_owner = match var("GHOST_BUNDLE_OWNER") {
            Some(raw) => raw.parse::<Ownership>().context("GHOST_BUNDLE_OWNER")?,
            None => Ownership::default(),
        };

        let log_level = var("GHOST_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            data_dir,
            bundle_install_dir,
            bundle_enable_dir,
            blobs_dir,
            bundle_mode,
            bundle_owner,
            log_level,
        })
    }
}

fn parse_mode(raw: &str) -> Result<u32> {
    let digits = raw.strip_prefix("0o").unwrap_or(raw);
    let mode = u32::from_str_radix(digits, 8)?;
    anyhow::ensure!(mode <= 0o7777, "mode out of range");
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ghost"));
        assert_eq!(
            config.bundle_install_dir,
            PathBuf::from("/var/lib/ghost/data/packages")
        );
        assert_eq!(config.bundle_enable_dir, PathBuf::from("/var/lib/ghost/packages"));
        assert_eq!(config.blobs_dir, PathBuf::from("/var/lib/ghost/data/blobs"));
        assert_eq!(config.bundle_mode, 0o755);
        assert_eq!(config.bundle_owner, Ownership::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("GHOST_DATA_DIR", "/srv/agent"),
            ("GHOST_BLOBS_DIR", "/mnt/blobs"),
            ("GHOST_BUNDLE_MODE", "0750"),
            ("GHOST_BUNDLE_OWNER", "agent:agent"),
        ])
        .unwrap();
        assert_eq!(config.bundle_install_dir, PathBuf::from("/srv/agent/data/packages"));
        assert_eq!(config.blobs_dir, PathBuf::from("/mnt/blobs"));
        assert_eq!(config.bundle_mode, 0o750);
        assert_eq!(config.bundle_owner, Ownership::new("agent", "agent"));
    }

    #[test]
    fn test_invalid_mode() {
        assert!(load(&[("GHOST_BUNDLE_MODE", "rwx")]).is_err());
        assert!(load(&[("GHOST_BUNDLE_MODE", "0o17777")]).is_err());
    }

    #[test]
    fn test_invalid_owner() {
        assert!(load(&[("GHOST_BUNDLE_OWNER", "root")]).is_err());
    }
}
