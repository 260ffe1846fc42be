//! The catalog trait and its file-backed implementation.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::record::{SessionStats, StreamRecord, StreamUpdate, UserRecord};
use crate::Result;

/// Persistent metadata store consumed by the vault.
///
/// Implementations must apply each write atomically: a reader never
/// observes a partially written table. Writes may fail retriably — the
/// deferred-write queue re-invokes them until they succeed.
pub trait Catalog: Send + Sync {
    /// Loads every stream record, for boot-time restore.
    ///
    /// # Errors
    ///
    /// I/O or decode failures.
    fn load_streams(&self) -> Result<Vec<StreamRecord>>;

    /// Inserts a new stream record.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn insert_stream(&self, record: &StreamRecord) -> Result<()>;

    /// Removes a stream record. Removing an absent record succeeds; the
    /// stream may legitimately have been deleted already.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn remove_stream(&self, stream_id: &str) -> Result<()>;

    /// Applies a partial update to a stream record.
    ///
    /// # Errors
    ///
    /// [`CatalogError::UnknownStream`] or I/O failures.
    fn update_stream(&self, stream_id: &str, update: StreamUpdate) -> Result<()>;

    /// Appends one finished session to the target's statistics log.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn record_session_stats(&self, stats: &SessionStats) -> Result<()>;

    /// Resolves a bearer token to a user name.
    ///
    /// # Errors
    ///
    /// I/O failures; an unknown token is `Ok(None)`.
    fn verify_user(&self, token: &str) -> Result<Option<String>>;

    /// Whether the user holds the manager role.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn is_manager(&self, user: &str) -> Result<bool>;

    /// The options blob served to cores starting work on the target.
    ///
    /// # Errors
    ///
    /// [`CatalogError::UnknownTarget`] or I/O failures.
    fn target_options(&self, target_id: &str) -> Result<serde_json::Value>;
}

/// Writes `value` as JSON at `path` via temp file, fsync, and rename, so a
/// crash mid-write never leaves a truncated table behind.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json)?;
    let file = fs::OpenOptions::new().write(true).open(&tmp)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads a JSON table, defaulting to empty when the file does not exist.
fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Ok(T::default());
    }
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Tables held by [`FileCatalog`], mirrored in memory and flushed whole.
#[derive(Default)]
struct Tables {
    streams: BTreeMap<String, StreamRecord>,
    users: BTreeMap<String, UserRecord>,
    targets: BTreeMap<String, serde_json::Value>,
}

/// File-backed catalog: one JSON document per table under the catalog
/// directory, plus per-target `stats/{target_id}.jsonl` logs.
pub struct FileCatalog {
    dir: PathBuf,
    tables: Mutex<Tables>,
}

impl FileCatalog {
    /// Opens (or initializes) a catalog at `dir`.
    ///
    /// # Errors
    ///
    /// I/O or decode failures reading existing tables.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(dir.join("stats"))?;
        let tables = Tables {
            streams: read_or_default(&dir.join("streams.json"))?,
            users: read_or_default(&dir.join("users.json"))?,
            targets: read_or_default(&dir.join("targets.json"))?,
        };
        debug!(
            dir = %dir.display(),
            streams = tables.streams.len(),
            users = tables.users.len(),
            "catalog opened"
        );
        Ok(Self {
            dir,
            tables: Mutex::new(tables),
        })
    }

    fn streams_path(&self) -> PathBuf {
        self.dir.join("streams.json")
    }

    fn users_path(&self) -> PathBuf {
        self.dir.join("users.json")
    }

    fn targets_path(&self) -> PathBuf {
        self.dir.join("targets.json")
    }

    /// Registers (or replaces) a user credential.
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn put_user(&self, user: &str, record: UserRecord) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.users.insert(user.to_owned(), record);
        write_atomic(&self.users_path(), &tables.users)
    }

    /// Registers (or replaces) a target's options blob.
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn put_target_options(&self, target_id: &str, options: serde_json::Value) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.targets.insert(target_id.to_owned(), options);
        write_atomic(&self.targets_path(), &tables.targets)
    }
}

impl Catalog for FileCatalog {
    fn load_streams(&self) -> Result<Vec<StreamRecord>> {
        Ok(self.tables.lock().streams.values().cloned().collect())
    }

    fn insert_stream(&self, record: &StreamRecord) -> Result<()> {
        let mut tables = self.tables.lock();
        tables
            .streams
            .insert(record.stream_id.clone(), record.clone());
        write_atomic(&self.streams_path(), &tables.streams)
    }

    fn remove_stream(&self, stream_id: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.streams.remove(stream_id).is_none() {
            return Ok(());
        }
        write_atomic(&self.streams_path(), &tables.streams)
    }

    fn update_stream(&self, stream_id: &str, update: StreamUpdate) -> Result<()> {
        let mut tables = self.tables.lock();
        let record = tables
            .streams
            .get_mut(stream_id)
            .ok_or_else(|| CatalogError::UnknownStream(stream_id.to_owned()))?;
        if let Some(frames) = update.frames {
            record.frames = frames;
        }
        if let Some(error_count) = update.error_count {
            record.error_count = error_count;
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        write_atomic(&self.streams_path(), &tables.streams)
    }

    fn record_session_stats(&self, stats: &SessionStats) -> Result<()> {
        let path = self.dir.join("stats").join(format!("{}.jsonl", stats.target_id));
        let mut line = serde_json::to_string(stats)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn verify_user(&self, token: &str) -> Result<Option<String>> {
        let tables = self.tables.lock();
        Ok(tables
            .users
            .iter()
            .find(|(_, record)| record.token == token)
            .map(|(user, _)| user.clone()))
    }

    fn is_manager(&self, user: &str) -> Result<bool> {
        let tables = self.tables.lock();
        Ok(tables.users.get(user).is_some_and(|record| record.manager))
    }

    fn target_options(&self, target_id: &str) -> Result<serde_json::Value> {
        let tables = self.tables.lock();
        tables
            .targets
            .get(target_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownTarget(target_id.to_owned()))
    }
}

impl std::fmt::Debug for FileCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("FileCatalog")
            .field("dir", &self.dir)
            .field("streams", &tables.streams.len())
            .field("users", &tables.users.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamvault_core::StreamStatus;
    use tempfile::TempDir;

    fn record(stream_id: &str, target_id: &str) -> StreamRecord {
        StreamRecord {
            stream_id: stream_id.to_owned(),
            target_id: target_id.to_owned(),
            owner: "alice".to_owned(),
            frames: 0,
            error_count: 0,
            status: StreamStatus::Enabled,
            creation_date: 1000,
        }
    }

    #[test]
    fn test_insert_update_remove_round_trip() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path()).unwrap();

        catalog.insert_stream(&record("s1", "t1")).unwrap();
        catalog
            .update_stream(
                "s1",
                StreamUpdate {
                    frames: Some(12),
                    error_count: Some(3),
                    status: Some(StreamStatus::Disabled),
                },
            )
            .unwrap();

        let streams = catalog.load_streams().unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].frames, 12);
        assert_eq!(streams[0].error_count, 3);
        assert_eq!(streams[0].status, StreamStatus::Disabled);

        catalog.remove_stream("s1").unwrap();
        assert!(catalog.load_streams().unwrap().is_empty());
        // Removing an already-deleted stream is not an error.
        catalog.remove_stream("s1").unwrap();
    }

    #[test]
    fn test_reopen_preserves_tables() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = FileCatalog::open(dir.path()).unwrap();
            catalog.insert_stream(&record("s1", "t1")).unwrap();
            catalog
                .put_user(
                    "alice",
                    UserRecord {
                        token: "tok-alice".to_owned(),
                        manager: true,
                    },
                )
                .unwrap();
            catalog
                .put_target_options("t1", serde_json::json!({"steps_per_frame": 50000}))
                .unwrap();
        }

        let catalog = FileCatalog::open(dir.path()).unwrap();
        assert_eq!(catalog.load_streams().unwrap().len(), 1);
        assert_eq!(
            catalog.verify_user("tok-alice").unwrap().as_deref(),
            Some("alice")
        );
        assert!(catalog.is_manager("alice").unwrap());
        assert_eq!(
            catalog.target_options("t1").unwrap()["steps_per_frame"],
            50000
        );
        // No temp files left behind by the atomic writes.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_update_unknown_stream_fails() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path()).unwrap();
        let err = catalog
            .update_stream("ghost", StreamUpdate::default())
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownStream(_)));
    }

    #[test]
    fn test_session_stats_append() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path()).unwrap();
        for end_time in [100, 200] {
            catalog
                .record_session_stats(&SessionStats {
                    target_id: "t1".to_owned(),
                    stream_id: "s1".to_owned(),
                    user: "donor".to_owned(),
                    engine: "openmm".to_owned(),
                    start_time: 50,
                    end_time,
                    frames: 1.5,
                })
                .unwrap();
        }
        let log = std::fs::read_to_string(dir.path().join("stats").join("t1.jsonl")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: SessionStats = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.end_time, 100);
    }

    #[test]
    fn test_unknown_credentials() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path()).unwrap();
        assert_eq!(catalog.verify_user("nope").unwrap(), None);
        assert!(!catalog.is_manager("nobody").unwrap());
        assert!(matches!(
            catalog.target_options("ghost").unwrap_err(),
            CatalogError::UnknownTarget(_)
        ));
    }
}
