// Filesystem-backed registry of experiments and their training runs
//
// Layout: <root>/<experiment-name>/run_NNN/{config.json,meta.json}
// A run's config.json is written once at creation and never rewritten.
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::state::models::{Run, RunId, RunMeta, RunStatus, RunSummary};

pub const CONFIG_FILE: &str = "config.json";
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),
    #[error("run not found: {0}/{1}")]
    RunNotFound(String, RunId),
    #[error("config not found for {0}/{1}")]
    ConfigNotFound(String, RunId),
    #[error("malformed config for {0}/{1}: {2}")]
    ConfigParse(String, RunId, #[source] serde_json::Error),
    #[error("malformed run metadata for {0}/{1}: {2}")]
    MetaParse(String, RunId, #[source] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

pub struct ExperimentRegistry {
    root: PathBuf,
}

impl ExperimentRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment_dir(&self, experiment: &str) -> PathBuf {
        self.root.join(experiment)
    }

    pub fn run_dir(&self, experiment: &str, run: RunId) -> PathBuf {
        self.experiment_dir(experiment).join(run.dir_name())
    }

    /// Names of all experiments under the registry root, sorted.
    pub fn list_experiments(&self) -> RegistryResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Runs under an experiment, sorted by run number. A missing experiment
    /// is an error, not an empty list.
    pub fn list_runs(&self, experiment: &str) -> RegistryResult<Vec<RunSummary>> {
        let mut runs = Vec::new();
        for id in self.scan_run_ids(experiment)? {
            let summary = match self.read_meta(experiment, id) {
                Ok(meta) => RunSummary {
                    id,
                    status: meta.status,
                    created_at: Some(meta.created_at),
                },
                Err(e) => {
                    // A run dir without readable metadata still counts as a
                    // run; it just has nothing to report.
                    log::warn!("unreadable metadata for {}/{}: {}", experiment, id, e);
                    RunSummary {
                        id,
                        status: RunStatus::Pending,
                        created_at: None,
                    }
                }
            };
            runs.push(summary);
        }
        Ok(runs)
    }

    /// Load and parse the config snapshot for a run.
    pub fn get_config(&self, experiment: &str, run: RunId) -> RegistryResult<Value> {
        self.require_experiment(experiment)?;
        let path = self.run_dir(experiment, run).join(CONFIG_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::ConfigNotFound(experiment.to_string(), run));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| RegistryError::ConfigParse(experiment.to_string(), run, e))
    }

    /// Allocate the next run number and persist `config` as its immutable
    /// snapshot. The experiment directory is created on first use.
    ///
    /// Allocation is serialized through `fs::create_dir`: the first caller
    /// to create `run_NNN` owns that number, and a racing caller sees
    /// `AlreadyExists` and rescans for the next free one.
    pub fn create_run(&self, experiment: &str, config: &Value) -> RegistryResult<Run> {
        let exp_dir = self.experiment_dir(experiment);
        fs::create_dir_all(&exp_dir)?;

        let run_dir;
        let id;
        loop {
            let taken = self.scan_run_ids(experiment)?;
            let candidate = next_free_id(&taken);
            let candidate_dir = exp_dir.join(candidate.dir_name());
            match fs::create_dir(&candidate_dir) {
                Ok(()) => {
                    run_dir = candidate_dir;
                    id = candidate;
                    break;
                }
                // Another caller claimed this number; rescan and retry.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let raw = format!("{:#}\n", config);
        let meta = RunMeta {
            created_at: Utc::now(),
            status: RunStatus::Pending,
            config_sha256: sha256_hex(raw.as_bytes()),
        };

        fs::write(run_dir.join(CONFIG_FILE), &raw)?;
        self.write_meta(experiment, id, &meta)?;

        log::info!("created {}/{}", experiment, id);
        Ok(Run {
            experiment: experiment.to_string(),
            id,
            meta,
        })
    }

    /// Update a run's status in its metadata. The config snapshot itself is
    /// never touched.
    pub fn set_run_status(
        &self,
        experiment: &str,
        run: RunId,
        status: RunStatus,
    ) -> RegistryResult<()> {
        let mut meta = self.read_meta(experiment, run)?;
        meta.status = status;
        self.write_meta(experiment, run, &meta)
    }

    /// Recompute the config digest and compare it to the one recorded at
    /// creation. False means the snapshot was modified after the fact.
    pub fn verify_run(&self, experiment: &str, run: RunId) -> RegistryResult<bool> {
        let meta = self.read_meta(experiment, run)?;
        let path = self.run_dir(experiment, run).join(CONFIG_FILE);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::ConfigNotFound(experiment.to_string(), run));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(sha256_hex(&raw) == meta.config_sha256)
    }

    /// Remove a run and everything in it. Explicit cleanup only.
    pub fn delete_run(&self, experiment: &str, run: RunId) -> RegistryResult<()> {
        self.require_experiment(experiment)?;
        let dir = self.run_dir(experiment, run);
        if !dir.is_dir() {
            return Err(RegistryError::RunNotFound(experiment.to_string(), run));
        }
        fs::remove_dir_all(&dir)?;
        log::info!("deleted {}/{}", experiment, run);
        Ok(())
    }

    /// Read the metadata document for a run.
    pub fn read_meta(&self, experiment: &str, run: RunId) -> RegistryResult<RunMeta> {
        self.require_experiment(experiment)?;
        let run_dir = self.run_dir(experiment, run);
        if !run_dir.is_dir() {
            return Err(RegistryError::RunNotFound(experiment.to_string(), run));
        }
        let raw = fs::read_to_string(run_dir.join(META_FILE))?;
        serde_json::from_str(&raw)
            .map_err(|e| RegistryError::MetaParse(experiment.to_string(), run, e))
    }

    fn write_meta(&self, experiment: &str, run: RunId, meta: &RunMeta) -> RegistryResult<()> {
        let raw = serde_json::to_string_pretty(meta)
            .map_err(|e| RegistryError::MetaParse(experiment.to_string(), run, e))?;
        fs::write(self.run_dir(experiment, run).join(META_FILE), raw)?;
        Ok(())
    }

    fn require_experiment(&self, experiment: &str) -> RegistryResult<()> {
        if !self.experiment_dir(experiment).is_dir() {
            return Err(RegistryError::ExperimentNotFound(experiment.to_string()));
        }
        Ok(())
    }

    fn scan_run_ids(&self, experiment: &str) -> RegistryResult<BTreeSet<RunId>> {
        self.require_experiment(experiment)?;
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(self.experiment_dir(experiment))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(RunId::from_dir_name)
            {
                ids.insert(id);
            }
        }
        Ok(ids)
    }
}

/// Smallest unused positive run number.
fn next_free_id(taken: &BTreeSet<RunId>) -> RunId {
    let mut candidate = 1u32;
    for id in taken {
        if id.value() == candidate {
            candidate += 1;
        } else {
            break;
        }
    }
    RunId::new(candidate)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample_config() -> Value {
        json!({
            "dataset_reader": {"type": "seq2seq"},
            "train_data_path": "data/train.tsv",
            "validation_data_path": "data/dev.tsv",
            "model": {"type": "copynet_seq2seq", "beam_size": 5},
            "iterator": {"type": "bucket", "batch_size": 32},
            "trainer": {"num_epochs": 40, "cuda_device": 0},
            "vocabulary": {"min_count": {"source_tokens": 2}}
        })
    }

    #[test]
    fn test_create_run_allocates_sequential_ids() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());

        let first = registry.create_run("greetings", &sample_config()).unwrap();
        assert_eq!(first.id, RunId::new(1));

        let second = registry.create_run("greetings", &sample_config()).unwrap();
        assert_eq!(second.id.dir_name(), "run_002");
    }

    #[test]
    fn test_create_run_fills_smallest_gap() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());

        for _ in 0..3 {
            registry.create_run("greetings", &sample_config()).unwrap();
        }
        registry.delete_run("greetings", RunId::new(2)).unwrap();

        let run = registry.create_run("greetings", &sample_config()).unwrap();
        assert_eq!(run.id, RunId::new(2));
    }

    #[test]
    fn test_config_round_trip_preserves_document() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());
        let config = sample_config();

        let run = registry.create_run("greetings", &config).unwrap();
        let loaded = registry.get_config("greetings", run.id).unwrap();
        assert_eq!(loaded, config);

        // Key order survives as well
        let keys: Vec<&str> = loaded.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys[0], "dataset_reader");
        assert_eq!(keys[3], "model");
    }

    #[test]
    fn test_missing_experiment_is_an_error() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());

        let err = registry.list_runs("nope").unwrap_err();
        assert!(matches!(err, RegistryError::ExperimentNotFound(ref e) if e == "nope"));
    }

    #[test]
    fn test_missing_and_malformed_configs() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());
        let run = registry.create_run("greetings", &sample_config()).unwrap();

        let err = registry.get_config("greetings", RunId::new(99)).unwrap_err();
        assert!(matches!(err, RegistryError::ConfigNotFound(_, _)));

        let config_path = registry.run_dir("greetings", run.id).join(CONFIG_FILE);
        fs::write(&config_path, "{not json").unwrap();
        let err = registry.get_config("greetings", run.id).unwrap_err();
        assert!(matches!(err, RegistryError::ConfigParse(_, _, _)));
    }

    #[test]
    fn test_list_experiments_sorted() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());
        registry.create_run("zulu", &sample_config()).unwrap();
        registry.create_run("alpha", &sample_config()).unwrap();

        assert_eq!(registry.list_experiments().unwrap(), vec!["alpha", "zulu"]);
    }

    #[test]
    fn test_status_and_verification() {
        let dir = tempdir().unwrap();
        let registry = ExperimentRegistry::new(dir.path());
        let run = registry.create_run("greetings", &sample_config()).unwrap();
        assert_eq!(run.meta.status, RunStatus::Pending);

        registry
            .set_run_status("greetings", run.id, RunStatus::Succeeded)
            .unwrap();
        let runs = registry.list_runs("greetings").unwrap();
        assert_eq!(runs[0].status, RunStatus::Succeeded);

        assert!(registry.verify_run("greetings", run.id).unwrap());
        let config_path = registry.run_dir("greetings", run.id).join(CONFIG_FILE);
        fs::write(&config_path, "{\"tampered\": true}\n").unwrap();
        assert!(!registry.verify_run("greetings", run.id).unwrap());
    }

    #[test]
    fn test_concurrent_create_run_allocates_distinct_gapless_ids() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(ExperimentRegistry::new(dir.path()));
        registry.create_run("greetings", &sample_config()).unwrap();

        let n = 8;
        let mut handles = Vec::new();
        for _ in 0..n {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                registry.create_run("greetings", &sample_config()).unwrap().id
            }));
        }

        let mut ids: Vec<u32> = handles
            .into_iter()
            .map(|h| h.join().unwrap().value())
            .collect();
        ids.sort();
        // One run pre-existed, so the threads get 2..=n+1 with no gaps
        assert_eq!(ids, (2..=n as u32 + 1).collect::<Vec<_>>());
    }
}
