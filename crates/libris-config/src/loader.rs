use std::path::{Path, PathBuf};

use libris_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILE_NAMES: [&str; 3] = ["config.yml", "config.yaml", "config.toml"];

/// Overrides `database.path`.
pub const ENV_DATABASE_PATH: &str = "LIBRIS_DATABASE_PATH";
/// Overrides `log.level`.
pub const ENV_LOG_LEVEL: &str = "LIBRIS_LOG_LEVEL";

/// Reads `AppConfig` from YAML or TOML files and layers environment overrides on top.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default directory searched by [`ConfigLoader::discover`]: `~/.config/libris` on Linux.
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("libris"))
    }

    /// Load the config file at `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let mut config = Self::from_file(path)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse the config file at `path` as written, without environment overrides.
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let config = parse_file(path)?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    /// Look for a config file in `dir`, falling back to defaults when none exists.
    pub fn discover_in(dir: &Path) -> Result<AppConfig> {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }

        debug!("no config file in {}, using defaults", dir.display());
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Same as [`ConfigLoader::discover_in`] for the default config directory.
    pub fn discover() -> Result<AppConfig> {
        match Self::default_config_dir() {
            Some(dir) => Self::discover_in(&dir),
            None => {
                let mut config = AppConfig::default();
                apply_env_overrides(&mut config, |key| std::env::var(key).ok());
                Ok(config)
            }
        }
    }
}

fn parse_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|v| !v.is_empty()) {
        debug!("database path overridden by {ENV_DATABASE_PATH}");
        config.database.path = PathBuf::from(path);
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
        config.log.level = level;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::LogFormat;

    #[test]
    fn parses_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "database:\n  path: /var/lib/libris/app.db\n  busy_timeout_ms: 250\nlog:\n  level: debug\n  format: json\n",
        )
        .unwrap();

        let config = parse_file(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/libris/app.db"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn from_file_reads_the_file_as_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "database:\n  path: shelf.db\n").unwrap();

        let config = ConfigLoader::from_file(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("shelf.db"));
        assert_eq!(config.log.level, "info");

        let missing = dir.path().join("absent.yml");
        assert!(matches!(
            ConfigLoader::from_file(&missing),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn parses_toml_config_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database]\npath = \"books.db\"\n").unwrap();

        let config = parse_file(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("books.db"));
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "path=x").unwrap();

        let err = parse_file(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension: ini"));
    }

    #[test]
    fn reports_parse_errors_as_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "database: [unclosed").unwrap();

        let err = parse_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "/tmp/override.db"),
            (ENV_LOG_LEVEL, "trace"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.log.level, "trace");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |_| Some(String::new()));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn discover_in_prefers_yaml_and_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = ConfigLoader::discover_in(dir.path()).unwrap();
        assert_eq!(defaults.database.busy_timeout_ms, 5_000);

        std::fs::write(
            dir.path().join("config.yml"),
            "database:\n  busy_timeout_ms: 42\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[database]\nbusy_timeout_ms = 7\n",
        )
        .unwrap();

        let config = ConfigLoader::discover_in(dir.path()).unwrap();
        assert_eq!(config.database.busy_timeout_ms, 42);
    }
}
