// Project initialization: directory skeleton, settings file, database,
// and the single admin account
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::settings::{ProjectSettings, SettingsError, SETTINGS_FILE};
use crate::state::db::{init_db, DbConnection, DbError};
use crate::state::users::{create_user, validate_password, UserError};

pub const LOGS_DIR: &str = "logs";

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("{0} already contains a project")]
    AlreadyInitialized(PathBuf),
    #[error("invalid password: {0}")]
    InvalidPassword(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    User(#[from] UserError),
}

pub type ScaffoldResult<T> = Result<T, ScaffoldError>;

/// Create a new project at `root`: skeleton directories, Project.toml, the
/// database schema, and the admin account that owns the dashboard login.
pub fn init_project(
    root: &Path,
    name: &str,
    username: &str,
    password: &str,
) -> ScaffoldResult<(ProjectSettings, DbConnection)> {
    if root.join(SETTINGS_FILE).is_file() {
        return Err(ScaffoldError::AlreadyInitialized(root.to_path_buf()));
    }
    validate_password(password).map_err(ScaffoldError::InvalidPassword)?;

    let settings = ProjectSettings::new(name);
    fs::create_dir_all(settings.experiments_root(root))?;
    fs::create_dir_all(root.join(LOGS_DIR))?;
    settings.save(root)?;

    let db = init_db(&settings.db_file(root))?;
    create_user(&db, username, password)?;

    log::info!("initialized project '{}' at {}", name, root.display());
    Ok((settings, db))
}
