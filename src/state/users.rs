// User account storage and credential checks
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rusqlite::{params, ErrorCode};
use thiserror::Error;

use super::db::DbConnection;
use super::models::User;

// Verified against when a username does not exist, so a lookup for a
// missing account costs the same as a wrong password. Hash of an
// unguessable throwaway string.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$wpgzzhUkhvJfnQStX2T6PQ$Ws6srQ3PFcX0rcHesSsjsCVEJC3PjG07MRZmw9ZZGWc";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username already taken: {0}")]
    DuplicateUsername(String),
    #[error("password hash error: {0}")]
    Hash(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type UserResult<T> = Result<T, UserError>;

/// Create a new account. The password is hashed with argon2id before it
/// touches the database; the UNIQUE constraint on `username` is the only
/// duplicate check.
pub fn create_user(db: &DbConnection, username: &str, password: &str) -> UserResult<User> {
    let hashed = hash_password(password)?;

    let conn = db.lock();
    let result = conn.execute(
        "INSERT INTO users (alt_id, username, password) VALUES (?1, ?2, ?3)",
        params![0i64, username, hashed],
    );

    match result {
        Ok(_) => Ok(User {
            id: conn.last_insert_rowid(),
            alt_id: 0,
            username: username.to_string(),
            password: hashed,
        }),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(UserError::DuplicateUsername(username.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Look up an account by its unique username.
pub fn get_user_by_username(db: &DbConnection, username: &str) -> UserResult<Option<User>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, alt_id, username, password FROM users WHERE username = ?1",
    )?;

    let result = stmt.query_row([username], |row| {
        Ok(User {
            id: row.get(0)?,
            alt_id: row.get(1)?,
            username: row.get(2)?,
            password: row.get(3)?,
        })
    });

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Check a supplied password against the stored hash. Returns false for an
/// unknown username rather than erroring, after burning a dummy
/// verification so the two cases are not distinguishable by timing.
pub fn verify_credentials(db: &DbConnection, username: &str, password: &str) -> UserResult<bool> {
    match get_user_by_username(db, username)? {
        Some(user) => verify_hash(&user.password, password),
        None => {
            let _ = verify_hash(DUMMY_HASH, password);
            Ok(false)
        }
    }
}

/// Rehash and store a new password, bumping `alt_id` so existing sessions
/// for the account stop validating. Returns false if the username does not
/// exist.
pub fn change_password(db: &DbConnection, username: &str, new_password: &str) -> UserResult<bool> {
    let hashed = hash_password(new_password)?;

    let conn = db.lock();
    let updated = conn.execute(
        "UPDATE users SET password = ?1, alt_id = alt_id + 1 WHERE username = ?2",
        params![hashed, username],
    )?;

    Ok(updated > 0)
}

/// Number of accounts in the user table.
pub fn count_users(db: &DbConnection) -> UserResult<i64> {
    let conn = db.lock();
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

/// Password acceptance policy for new credentials.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("password must be at least 8 characters");
    }
    if password.contains("password") {
        return Err("password cannot contain the word 'password'");
    }
    Ok(())
}

fn hash_password(password: &str) -> UserResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| UserError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_hash(stored: &str, password: &str) -> UserResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| UserError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::db::init_db_in_memory;

    #[test]
    fn test_create_and_verify() {
        let db = init_db_in_memory().unwrap();
        let user = create_user(&db, "admin", "correct horse").unwrap();
        assert_eq!(user.alt_id, 0);
        assert!(user.password.starts_with("$argon2id$"));

        assert!(verify_credentials(&db, "admin", "correct horse").unwrap());
        assert!(!verify_credentials(&db, "admin", "wrong horse").unwrap());
    }

    #[test]
    fn test_unknown_username_is_false_not_error() {
        let db = init_db_in_memory().unwrap();
        assert!(!verify_credentials(&db, "nobody", "whatever").unwrap());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let db = init_db_in_memory().unwrap();
        create_user(&db, "admin", "first secret").unwrap();

        let err = create_user(&db, "admin", "second secret").unwrap_err();
        assert!(matches!(err, UserError::DuplicateUsername(ref u) if u == "admin"));

        // Original row untouched
        assert!(verify_credentials(&db, "admin", "first secret").unwrap());
        let user = get_user_by_username(&db, "admin").unwrap().unwrap();
        assert_eq!(user.alt_id, 0);
    }

    #[test]
    fn test_usernames_are_case_sensitive() {
        let db = init_db_in_memory().unwrap();
        create_user(&db, "Admin", "some secret").unwrap();
        assert!(get_user_by_username(&db, "admin").unwrap().is_none());
        // Different case is a different identity, so this must succeed
        create_user(&db, "admin", "other secret").unwrap();
    }

    #[test]
    fn test_change_password_bumps_alt_id() {
        let db = init_db_in_memory().unwrap();
        create_user(&db, "admin", "old secret").unwrap();

        assert!(change_password(&db, "admin", "new secret").unwrap());
        assert!(!verify_credentials(&db, "admin", "old secret").unwrap());
        assert!(verify_credentials(&db, "admin", "new secret").unwrap());

        let user = get_user_by_username(&db, "admin").unwrap().unwrap();
        assert_eq!(user.alt_id, 1);

        assert!(!change_password(&db, "nobody", "whatever").unwrap());
    }

    #[test]
    fn test_count_users() {
        let db = init_db_in_memory().unwrap();
        assert_eq!(count_users(&db).unwrap(), 0);
        create_user(&db, "admin", "some secret").unwrap();
        assert_eq!(count_users(&db).unwrap(), 1);
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("mypassword123").is_err());
    }
}
