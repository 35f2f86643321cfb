use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// The SDK's command-line stitcher.
    #[default]
    Process,
    /// Scripted stand-in, no SDK required.
    Simulated,
}

/// Persistent settings, read from `settings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sdk_binary: Option<PathBuf>,
    pub sdk_library_dirs: Vec<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub engine: EngineKind,
    pub timeout_secs: Option<u64>,
    pub log_filter: Option<String>,
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("panostitch").join("settings.json"))
}

impl Settings {
    /// Load settings. A missing default file means defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("settings file {} does not exist", path.display());
                }
                path.to_path_buf()
            }
            None => match default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing settings in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "engine": "simulated", "model_dir": "/opt/models", "timeout_secs": 600 }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.engine, EngineKind::Simulated);
        assert_eq!(settings.model_dir, Some(PathBuf::from("/opt/models")));
        assert_eq!(settings.timeout_secs, Some(600));
        assert!(settings.sdk_library_dirs.is_empty());
        assert!(settings.sdk_binary.is_none());
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ engine: process").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }
}
