//! # Backup and Checkpoint Store
//!
//! File-level recovery bookkeeping for a conversion run. The store
//! manages one recovery directory and two kinds of artifact:
//!
//! - **Backups**: byte-for-byte copies of files about to be modified,
//!   restorable in place. The engine backs up a pre-existing output
//!   database before a run touches it.
//! - **Checkpoints**: named, timestamped JSON snapshots. The engine
//!   writes a `conversion` checkpoint on cancellation carrying the
//!   report counters and the `_resume` markers, so an operator can
//!   inspect run state without opening the half-written database.
//!
//! Everything the store creates is tracked, and [`RecoveryStore::cleanup`]
//! removes it again. Restoring is always an explicit caller decision;
//! the engine never rolls an output back on its own, because partial
//! conversion progress is deliberately durable. Row, page, and
//! definition failures never reach this store either — they are handled
//! in place by typed policies (the definition fallback ladder,
//! `on_row_error`, the circuit breaker, the governor).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use tracing::{debug, warn};

pub struct RecoveryStore {
    dir: PathBuf,
    backups: HashMap<PathBuf, PathBuf>,
    checkpoints: HashMap<String, PathBuf>,
}

impl RecoveryStore {
    /// Opens (creating if needed) a recovery directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("failed to create recovery dir {}", dir.display()))?;
        Ok(Self {
            dir,
            backups: HashMap::new(),
            checkpoints: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `file` into the recovery directory and records the pairing.
    /// Backing up the same file again refreshes the copy.
    pub fn create_backup(&mut self, file: &Path) -> Result<PathBuf> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed");
        let mut backup = self.dir.join(format!("{}.bak", name));
        // distinct source paths with the same file name get numbered copies
        let mut counter = 1;
        while self.backups.values().any(|b| b == &backup)
            && self.backups.get(file) != Some(&backup)
        {
            counter += 1;
            backup = self.dir.join(format!("{}.{}.bak", name, counter));
        }

        fs::copy(file, &backup).wrap_err_with(|| {
            format!(
                "failed to back up {} to {}",
                file.display(),
                backup.display()
            )
        })?;
        debug!(file = %file.display(), backup = %backup.display(), "backup created");
        self.backups.insert(file.to_path_buf(), backup.clone());
        Ok(backup)
    }

    /// Restores a file from its recorded backup. Returns false when no
    /// backup was ever taken for it.
    pub fn restore_backup(&self, file: &Path) -> Result<bool> {
        let Some(backup) = self.backups.get(file) else {
            warn!(file = %file.display(), "no backup recorded");
            return Ok(false);
        };
        fs::copy(backup, file).wrap_err_with(|| {
            format!(
                "failed to restore {} from {}",
                file.display(),
                backup.display()
            )
        })?;
        Ok(true)
    }

    /// Persists a named JSON snapshot. Re-checkpointing a name overwrites
    /// the previous snapshot.
    pub fn create_checkpoint(&mut self, name: &str, data: &serde_json::Value) -> Result<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let envelope = serde_json::json!({
            "name": name,
            "timestamp": timestamp,
            "data": data,
        });

        let path = self.dir.join(format!("{}.checkpoint.json", name));
        fs::write(&path, envelope.to_string())
            .wrap_err_with(|| format!("failed to write checkpoint {}", path.display()))?;
        debug!(name, path = %path.display(), "checkpoint written");
        self.checkpoints.insert(name.to_string(), path.clone());
        Ok(path)
    }

    /// Reads back the data of a named checkpoint; `None` when the name
    /// was never checkpointed or the file is gone.
    pub fn restore_checkpoint(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let path = match self.checkpoints.get(name) {
            Some(path) => path.clone(),
            None => self.dir.join(format!("{}.checkpoint.json", name)),
        };
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read checkpoint {}", path.display()))?;
        let envelope: serde_json::Value = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("corrupt checkpoint {}", path.display()))?;
        Ok(Some(envelope.get("data").cloned().unwrap_or(envelope)))
    }

    /// Removes every artifact this store created. The directory itself is
    /// removed when it ends up empty.
    pub fn cleanup(&mut self) -> Result<()> {
        for backup in self.backups.values() {
            if backup.exists() {
                fs::remove_file(backup)
                    .wrap_err_with(|| format!("failed to remove {}", backup.display()))?;
            }
        }
        for checkpoint in self.checkpoints.values() {
            if checkpoint.exists() {
                fs::remove_file(checkpoint)
                    .wrap_err_with(|| format!("failed to remove {}", checkpoint.display()))?;
            }
        }
        self.backups.clear();
        self.checkpoints.clear();

        if fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
        {
            let _ = fs::remove_dir(&self.dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn backup_roundtrip_restores_original_content() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("out.db");
        std::fs::write(&file, b"original content").unwrap();

        let mut store = RecoveryStore::new(dir.path().join("recovery")).unwrap();
        let backup = store.create_backup(&file).unwrap();
        assert!(backup.exists());
        assert_eq!(std::fs::read(&backup).unwrap(), b"original content");

        std::fs::write(&file, b"clobbered").unwrap();
        assert!(store.restore_backup(&file).unwrap());

        assert_eq!(std::fs::read(&file).unwrap(), b"original content");
    }

    #[test]
    fn restore_without_backup_reports_false() {
        let dir = tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("recovery")).unwrap();

        let restored = store.restore_backup(Path::new("never-backed-up.db")).unwrap();

        assert!(!restored);
    }

    #[test]
    fn same_file_name_from_two_paths_gets_distinct_backups() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("out.db"), b"aaa").unwrap();
        std::fs::write(b.join("out.db"), b"bbb").unwrap();

        let mut store = RecoveryStore::new(dir.path().join("recovery")).unwrap();
        let backup_a = store.create_backup(&a.join("out.db")).unwrap();
        let backup_b = store.create_backup(&b.join("out.db")).unwrap();

        assert_ne!(backup_a, backup_b);
        assert_eq!(std::fs::read(&backup_a).unwrap(), b"aaa");
        assert_eq!(std::fs::read(&backup_b).unwrap(), b"bbb");
    }

    #[test]
    fn checkpoint_roundtrip_preserves_data() {
        let dir = tempdir().unwrap();
        let mut store = RecoveryStore::new(dir.path().join("recovery")).unwrap();

        let data = serde_json::json!({ "rows_written": 42, "markers": { "BIG": 200 } });
        let path = store.create_checkpoint("conversion", &data).unwrap();
        assert!(path.exists());

        let restored = store.restore_checkpoint("conversion").unwrap().unwrap();

        assert_eq!(restored["rows_written"], 42);
        assert_eq!(restored["markers"]["BIG"], 200);
    }

    #[test]
    fn checkpoint_envelope_carries_a_timestamp() {
        let dir = tempdir().unwrap();
        let mut store = RecoveryStore::new(dir.path().join("recovery")).unwrap();

        let path = store
            .create_checkpoint("state", &serde_json::json!({ "n": 1 }))
            .unwrap();

        let envelope: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(envelope["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(envelope["name"], "state");
    }

    #[test]
    fn restore_unknown_checkpoint_is_none() {
        let dir = tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("recovery")).unwrap();

        assert!(store.restore_checkpoint("missing").unwrap().is_none());
    }

    #[test]
    fn checkpoints_survive_a_fresh_store_over_the_same_dir() {
        let dir = tempdir().unwrap();
        let recovery_dir = dir.path().join("recovery");

        let mut store = RecoveryStore::new(&recovery_dir).unwrap();
        store
            .create_checkpoint("conversion", &serde_json::json!({ "n": 7 }))
            .unwrap();
        drop(store);

        // a later process finds the checkpoint by name
        let store = RecoveryStore::new(&recovery_dir).unwrap();
        let restored = store.restore_checkpoint("conversion").unwrap().unwrap();
        assert_eq!(restored["n"], 7);
    }

    #[test]
    fn cleanup_removes_tracked_artifacts() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("out.db");
        std::fs::write(&file, b"content").unwrap();

        let mut store = RecoveryStore::new(dir.path().join("recovery")).unwrap();
        let backup = store.create_backup(&file).unwrap();
        let checkpoint = store
            .create_checkpoint("state", &serde_json::json!({}))
            .unwrap();

        store.cleanup().unwrap();

        assert!(!backup.exists());
        assert!(!checkpoint.exists());
        assert!(!store.dir().exists());
    }
}
