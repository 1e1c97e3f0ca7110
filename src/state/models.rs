// Data models for trainyard state management
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dashboard account row from the `users` table.
///
/// `password` holds an argon2id PHC hash, never the plaintext credential.
/// `alt_id` starts at 0 and is bumped on every password change so stale
/// sessions can be told apart from current ones; it carries no other meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub alt_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run sequence number, scoped to one experiment. Displays as `run_NNN`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(u32);

impl RunId {
    pub fn new(n: u32) -> Self {
        RunId(n)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The directory name for this run, e.g. `run_001`.
    pub fn dir_name(&self) -> String {
        format!("run_{:03}", self.0)
    }

    /// Parse a run directory name back into an id. Returns `None` for
    /// anything that is not `run_<positive integer>`.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let digits = name.strip_prefix("run_")?;
        let n: u32 = digits.parse().ok()?;
        if n == 0 {
            return None;
        }
        Some(RunId(n))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// Immutable per-run metadata stored next to the config snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    pub config_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub experiment: String,
    pub id: RunId,
    pub meta: RunMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub status: RunStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_dir_name_round_trip() {
        let id = RunId::new(7);
        assert_eq!(id.dir_name(), "run_007");
        assert_eq!(RunId::from_dir_name("run_007"), Some(id));
        assert_eq!(RunId::from_dir_name("run_1234").map(|r| r.value()), Some(1234));
    }

    #[test]
    fn test_run_id_rejects_garbage() {
        assert_eq!(RunId::from_dir_name("run_000"), None);
        assert_eq!(RunId::from_dir_name("run_abc"), None);
        assert_eq!(RunId::from_dir_name("copynet_failed"), None);
        assert_eq!(RunId::from_dir_name("001"), None);
    }

    #[test]
    fn test_run_status_strings() {
        assert_eq!(RunStatus::Failed.as_str(), "failed");
        assert_eq!(RunStatus::from_str_lossy("succeeded"), RunStatus::Succeeded);
        assert_eq!(RunStatus::from_str_lossy("bogus"), RunStatus::Pending);
    }
}
