// State management module
// Handles SQLite persistence for user accounts

pub mod db;
pub mod models;
pub mod users;

pub use db::{init_db, reset_db, DbConnection, DbError, DbResult};
pub use models::{Run, RunId, RunMeta, RunStatus, RunSummary, User};
pub use users::{
    change_password, count_users, create_user, get_user_by_username, validate_password,
    verify_credentials, UserError,
};
