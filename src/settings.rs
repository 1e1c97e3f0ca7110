// Per-project settings, persisted as Project.toml at the project root
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SETTINGS_FILE: &str = "Project.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed {SETTINGS_FILE}: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no {SETTINGS_FILE} found at {0}")]
    NotAProject(PathBuf),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_experiments_dir")]
    pub experiments_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_experiments_dir() -> String {
    "experiments".to_string()
}

fn default_db_path() -> String {
    "trainyard.db".to_string()
}

impl ProjectSettings {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            experiments_dir: default_experiments_dir(),
            db_path: default_db_path(),
        }
    }

    /// Load settings from `<root>/Project.toml`.
    pub fn load(root: &Path) -> SettingsResult<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.is_file() {
            return Err(SettingsError::NotAProject(root.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Write settings to `<root>/Project.toml`.
    pub fn save(&self, root: &Path) -> SettingsResult<()> {
        let raw = toml::to_string_pretty(self)?;
        fs::write(root.join(SETTINGS_FILE), raw)?;
        Ok(())
    }

    pub fn experiments_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.experiments_dir)
    }

    pub fn db_file(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.db_path)
    }
}
