use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "cadrun.json";
/// Persisted key/value state (reload guard) inside the data directory
pub const STATE_FILE: &str = "cadrun_state.json";
/// Default log file name for `--log` without a value
pub const LOG_FILE: &str = "cadrun.log";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (CADRUN_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("CADRUN_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. CADRUN_CONFIG_DIR environment variable
/// 3. Local folder IF any cadrun files exist there
/// 4. Platform-specific config directory from dirs-next (default)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (state, logs)
///
/// Same priority as [`config_file`], falling back to the platform data dir.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, STATE_FILE, LOG_FILE]
        .iter()
        .any(|f| dir.join(f).exists())
}

fn local_dir() -> Option<PathBuf> {
    std::env::current_dir().ok().filter(|dir| has_local_config_files(dir))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    dirs_next::config_dir()
        .map(|dir| dir.join("cadrun"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    dirs_next::data_dir()
        .map(|dir| dir.join("cadrun"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Feedback timing
    pub progress_delay_ms: u64,     // Delay before the progress indicator shows (default 300)
    pub overlay_hide_delay_ms: u64, // Drop overlay hide debounce (default 300)
    pub reload_guard_ms: u64,       // Registration failure window (default 3000)

    // Project analysis
    pub manifest: String,
    pub default_project_name: String,
    pub legacy_extension: String,
    pub compat_module: String,

    // Store registration
    pub scope: String,
    pub prefix: String,

    // Execution
    pub default_script_url: String,
    pub fit_margin: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            progress_delay_ms: 300,
            overlay_hide_delay_ms: 300,
            reload_guard_ms: 3000,
            manifest: "package.json".to_string(),
            default_project_name: "jscad".to_string(),
            legacy_extension: "jscad".to_string(),
            compat_module: "@jscad/csg".to_string(),
            scope: "/".to_string(),
            prefix: "swfs/".to_string(),
            default_script_url: "./jscad.model.js".to_string(),
            fit_margin: 1.2,
        }
    }
}

impl Settings {
    /// Load settings; a missing file gives defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file(STATE_FILE, &config), PathBuf::from("/custom/cadrun_state.json"));
    }

    #[test]
    fn test_cli_dir_wins() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from/cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from/cli")));
    }

    #[test]
    fn test_settings_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"progress_delay_ms": 50, "prefix": "files/"}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.progress_delay_ms, 50);
        assert_eq!(settings.prefix, "files/");
        assert_eq!(settings.reload_guard_ms, 3000);
        assert_eq!(settings.manifest, "package.json");
    }

    #[test]
    fn test_settings_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.fit_margin = 1.5;
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap().fit_margin, 1.5);
    }

    #[test]
    fn test_bad_settings_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "not json").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings"));
    }
}
