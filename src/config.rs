use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use sbom_inventory::Ecosystem;

/// Root configuration structure, deserialized from `.sbom-inventory/config.toml`.
///
/// Every section is optional; missing keys take their built-in defaults.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory walk settings.
    pub scan: ScanConfig,
    /// Which parsers are registered.
    pub ecosystems: EcosystemConfig,
    /// Log filter and output format.
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Directory names never descended into.
    pub exclude_dirs: Vec<String>,
    /// Recursion limit below each scanned root.
    pub max_depth: usize,
    /// Files larger than this many bytes are reported instead of read.
    pub max_file_size: u64,
    /// Parse files on the rayon pool.
    pub parallel: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: ["node_modules", "target", ".git", "vendor", ".venv", "dist", "build"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_depth: 12,
            max_file_size: 10 * 1024 * 1024,
            parallel: true,
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EcosystemConfig {
    pub disabled: Vec<Ecosystem>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `warn` or `sbom_inventory=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl Config {
    /// Reject values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_depth == 0 {
            bail!("scan.max_depth must be greater than 0");
        }
        if self.scan.max_file_size == 0 {
            bail!("scan.max_file_size must be greater than 0");
        }
        if self.log.level.trim().is_empty() {
            bail!("log.level must not be empty");
        }
        Ok(())
    }

    /// Ecosystems to register: all of them minus the disabled ones and `excluded`.
    pub fn enabled_ecosystems(&self, excluded: &[Ecosystem]) -> Vec<Ecosystem> {
        Ecosystem::ALL
            .into_iter()
            .filter(|e| !self.ecosystems.disabled.contains(e) && !excluded.contains(e))
            .collect()
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.sbom-inventory/config.toml`
/// 3. `~/.config/sbom-inventory/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".sbom-inventory").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("sbom-inventory")
            .join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.max_depth, 12);
        assert_eq!(config.scan.max_file_size, 10_485_760);
        assert!(config.scan.parallel);
        assert!(config.scan.exclude_dirs.iter().any(|d| d == "node_modules"));
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[scan]
max_depth = 3

[ecosystems]
disabled = ["maven", "nuget"]

[log]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.scan.max_depth, 3);
        assert!(config.scan.parallel);
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(
            config.enabled_ecosystems(&[Ecosystem::Go]),
            vec![Ecosystem::Cargo, Ecosystem::Npm, Ecosystem::Pypi]
        );
    }

    #[test]
    fn test_unknown_keys_and_formats_are_rejected() {
        assert!(toml::from_str::<Config>("[scan]\nmax_dept = 3\n").is_err());
        assert!(toml::from_str::<Config>("[log]\nformat = \"xml\"\n").is_err());
        assert!(toml::from_str::<Config>("[ecosystems]\ndisabled = [\"ruby\"]\n").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.scan.max_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.max_file_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_project_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".sbom-inventory")).unwrap();
        fs::write(
            dir.path().join(".sbom-inventory").join("config.toml"),
            "[scan]\nparallel = false\n",
        )
        .unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert!(!config.scan.parallel);
    }

    #[test]
    fn test_override_wins_and_is_validated() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".sbom-inventory")).unwrap();
        fs::write(
            dir.path().join(".sbom-inventory").join("config.toml"),
            "[scan]\nparallel = false\n",
        )
        .unwrap();
        let override_path = dir.path().join("custom.toml");
        fs::write(&override_path, "[scan]\nmax_depth = 2\n").unwrap();

        let config = load_config(dir.path(), Some(&override_path)).unwrap();
        assert_eq!(config.scan.max_depth, 2);
        assert!(config.scan.parallel);

        fs::write(&override_path, "[scan]\nmax_depth = 0\n").unwrap();
        assert!(load_config(dir.path(), Some(&override_path)).is_err());
        assert!(load_config(dir.path(), Some(&dir.path().join("missing.toml"))).is_err());
    }
}
