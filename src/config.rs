//! Configuration for voxflow paths and per-module assistant config.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable (VOXFLOW_HOME)
//! 2. Default (~/.voxflow)
//!
//! Each pipeline module (classification, agenda, contacts, ...) owns one JSON
//! config file under `$VOXFLOW_HOME/modules/<module>_assistant_config.json`.
//! The file holds the assistant settings plus the persisted assistant/thread
//! id mappings. Writes are whole-file overwrites: exactly one process is
//! expected to own a module's session state at a time.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// Global cached home directory (stores Result to handle init errors)
static HOME: OnceLock<Result<PathBuf, String>> = OnceLock::new();

fn resolve_home() -> Result<PathBuf> {
    if let Ok(env_home) = std::env::var("VOXFLOW_HOME") {
        return Ok(PathBuf::from(env_home));
    }

    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".voxflow"))
}

/// Get the voxflow home directory (loads once, then cached)
pub fn voxflow_home() -> Result<PathBuf> {
    let result = HOME.get_or_init(|| resolve_home().map_err(|e| e.to_string()));

    match result {
        Ok(home) => Ok(home.clone()),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Directory holding per-module assistant config files
pub fn modules_dir() -> Result<PathBuf> {
    Ok(voxflow_home()?.join("modules"))
}

/// Audio inbox scanned by the pipeline ($VOXFLOW_HOME/inbox)
pub fn inbox_dir() -> Result<PathBuf> {
    Ok(voxflow_home()?.join("inbox"))
}

/// SQLite database path ($VOXFLOW_HOME/voxflow.db)
pub fn db_path() -> Result<PathBuf> {
    Ok(voxflow_home()?.join("voxflow.db"))
}

/// Scheduler state file ($VOXFLOW_HOME/pipeline_state.json)
pub fn state_file_path() -> Result<PathBuf> {
    Ok(voxflow_home()?.join("pipeline_state.json"))
}

/// Path of a module's assistant config file
pub fn module_config_path(module: &str) -> Result<PathBuf> {
    Ok(modules_dir()?.join(format!("{}_assistant_config.json", module)))
}

/// Path of a module's prompts file ($VOXFLOW_HOME/prompts/<module>.yaml)
pub fn module_prompts_path(module: &str) -> Result<PathBuf> {
    Ok(voxflow_home()?.join("prompts").join(format!("{}.yaml", module)))
}

/// A module's assistant configuration: a flat JSON object holding assistant
/// settings (`assistant_name`, `model`, `instructions`, ...) and the persisted
/// id mappings (`assistant_id_*`, `thread_id_*`, `thread_id_*_created_at`).
///
/// This is the single shared mutable resource of the core. It is read once and
/// written back whole on every mutation; the last writer wins.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Backing file (None for in-memory configs used by tests and one-off calls)
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl ModuleConfig {
    /// Create an empty, unbacked config
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Map::new(),
        }
    }

    /// Create an unbacked config from existing values
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self { path: None, values }
    }

    /// Load a config from a file. The file must exist and parse as a JSON object.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let values: Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
        })
    }

    /// Open a config file, creating an empty backed config if it is missing
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self {
                path: Some(path.to_path_buf()),
                values: Map::new(),
            })
        }
    }

    /// Open the config for a named module under the voxflow home
    pub fn open_module(module: &str) -> Result<Self> {
        Self::open(&module_config_path(module)?)
    }

    /// Attach a backing file to this config
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(|v| v.as_f64())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// All keys, in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Persist the config to its backing file, creating parent directories.
    /// A no-op (with a warning) for unbacked configs.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            tracing::warn!("Config has no backing file, skipping save");
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_gives_empty_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("classification_assistant_config.json");

        let config = ModuleConfig::open(&path).unwrap();
        assert!(config.keys().next().is_none());
        assert_eq!(config.path(), Some(path.as_path()));
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");

        let mut config = ModuleConfig::open(&path).unwrap();
        config.set_str("assistant_name", "Classification Assistant");
        config.set_str("model", "gpt-4o");
        config.set("temperature", serde_json::json!(0.2));
        config.save().unwrap();

        let reloaded = ModuleConfig::load(&path).unwrap();
        assert_eq!(
            reloaded.get_str("assistant_name"),
            Some("Classification Assistant")
        );
        assert_eq!(reloaded.get_f64("temperature"), Some(0.2));
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut config = ModuleConfig::in_memory();
        config.set_str("thread_id_x_default", "thread_123");

        assert!(config.remove("thread_id_x_default"));
        assert!(!config.remove("thread_id_x_default"));
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut config = ModuleConfig::in_memory();
        config.set_str("key", "value");
        // No backing file: save must not error
        config.save().unwrap();
    }
}
