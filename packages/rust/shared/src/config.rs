//! Application configuration for docweave.
//!
//! User config lives at `~/.docweave/docweave.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocweaveError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docweave.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docweave";

// ---------------------------------------------------------------------------
// Config structs (matching docweave.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Harvest pass settings.
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Rewrite pass settings.
    #[serde(default)]
    pub inject: InjectConfig,
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Slash-delimited trigger/terminal pattern.
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
        }
    }
}

fn default_pattern() -> String {
    "topicref/topicmeta".into()
}

/// `[inject]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectConfig {
    /// File extensions (without the dot) rewritten in map mode.
    #[serde(default = "default_map_extensions")]
    pub map_extensions: Vec<String>,

    /// Maximum number of documents rewritten at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Suffix appended to the target name for the staging file.
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,

    /// Stop scheduling new documents after the first failure.
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            map_extensions: default_map_extensions(),
            concurrency: default_concurrency(),
            temp_suffix: default_temp_suffix(),
            fail_fast: false,
        }
    }
}

fn default_map_extensions() -> Vec<String> {
    vec!["ditamap".into()]
}
fn default_concurrency() -> u32 {
    4
}
fn default_temp_suffix() -> String {
    ".tmp".into()
}

// ---------------------------------------------------------------------------
// Inject options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime rewrite configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct InjectOptions {
    /// Extensions that select map mode.
    pub map_extensions: Vec<String>,
    /// Worker limit for the rewrite batch.
    pub concurrency: usize,
    /// Staging file suffix.
    pub temp_suffix: String,
    /// Abort scheduling after the first failed document.
    pub fail_fast: bool,
}

impl From<&AppConfig> for InjectOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            map_extensions: config.inject.map_extensions.clone(),
            concurrency: config.inject.concurrency.max(1) as usize,
            temp_suffix: config.inject.temp_suffix.clone(),
            fail_fast: config.inject.fail_fast,
        }
    }
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl InjectOptions {
    /// Whether `path` should be rewritten in map mode.
    pub fn is_map(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.map_extensions
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(ext))
            })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docweave/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocweaveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docweave/docweave.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        DocweaveError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocweaveError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocweaveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocweaveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("topicref/topicmeta"));
        assert!(toml_str.contains("map_extensions"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.inject.concurrency, 4);
        assert_eq!(parsed.harvest.pattern, "topicref/topicmeta");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[inject]
concurrency = 8
fail_fast = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.inject.concurrency, 8);
        assert!(config.inject.fail_fast);
        assert_eq!(config.inject.temp_suffix, ".tmp");
        assert_eq!(config.harvest.pattern, "topicref/topicmeta");
    }

    #[test]
    fn inject_options_from_app_config() {
        let mut app = AppConfig::default();
        app.inject.concurrency = 0;
        let opts = InjectOptions::from(&app);
        assert_eq!(opts.concurrency, 1);
        assert!(opts.is_map(Path::new("maps/guide.DITAMAP")));
        assert!(!opts.is_map(Path::new("topics/intro.dita")));
        assert!(!opts.is_map(Path::new("README")));
    }
}
