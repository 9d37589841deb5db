use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "EMPIRE_DASHBOARD_CONFIG";
pub const DATA_DIR_ENV: &str = "EMPIRE_DASHBOARD_DATA_DIR";
const CONFIG_FILE: &str = "config.yaml";
const DATABASE_FILE: &str = "dashboard.db";

/// Process-level settings read before the store is opened. User-facing
/// preferences live in the `settings` table instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BootstrapConfig {
    pub data_dir: PathBuf,
    pub log_filter: String,
    pub log_to_stderr: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_filter: "info".to_string(),
            log_to_stderr: false,
        }
    }
}

impl BootstrapConfig {
    /// Resolves the config from the environment: the data dir override (the
    /// `--data-dir` flag wins over `$EMPIRE_DASHBOARD_DATA_DIR`), then
    /// `$EMPIRE_DASHBOARD_CONFIG` or `<data_dir>/config.yaml` if present.
    pub fn load(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir_override = data_dir.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from));
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::resolve(explicit.as_deref(), data_dir_override)
    }

    pub fn resolve(explicit: Option<&Path>, data_dir_override: Option<PathBuf>) -> anyhow::Result<Self> {
        let base_dir = data_dir_override.clone().unwrap_or_else(default_data_dir);
        let config_path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.join(CONFIG_FILE));

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else if explicit.is_some() {
            anyhow::bail!("config file {} does not exist", config_path.display());
        } else {
            Self {
                data_dir: base_dir,
                ..Self::default()
            }
        };

        if let Some(dir) = data_dir_override {
            config.data_dir = dir;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".empire-dashboard")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BootstrapConfig::resolve(None, Some(dir.path().to_path_buf())).expect("resolve");
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.log_filter, "info");
        assert!(!config.log_to_stderr);
        assert_eq!(config.database_path(), dir.path().join("dashboard.db"));
    }

    #[test]
    fn reads_yaml_and_keeps_data_dir_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("config.yaml"),
            "data_dir: /somewhere/else\nlog_filter: debug\nlog_to_stderr: true\n",
        )
        .expect("write config");

        let config = BootstrapConfig::resolve(None, Some(dir.path().to_path_buf())).expect("resolve");
        assert_eq!(config.log_filter, "debug");
        assert!(config.log_to_stderr);
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn explicit_file_sets_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "data_dir: /srv/dashboard\n").expect("write config");

        let config = BootstrapConfig::resolve(Some(&path), None).expect("resolve");
        assert_eq!(config.data_dir, PathBuf::from("/srv/dashboard"));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn missing_explicit_file_and_bad_yaml_are_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(BootstrapConfig::resolve(Some(&dir.path().join("nope.yaml")), None).is_err());

        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "log_to_stderr: [unterminated").expect("write config");
        let error = BootstrapConfig::resolve(Some(&path), None).expect_err("bad yaml");
        assert!(format!("{:#}", error).contains("failed to parse config"));
    }
}
