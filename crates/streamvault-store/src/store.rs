//! The per-stream payload store.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::payload::decode_named_file;
use crate::Result;

const SEED_DIR: &str = "files";
const TAG_DIR: &str = "tags";
const BUFFER_DIR: &str = "buffer_files";
const CHECKPOINT_DIR: &str = "checkpoint_files";

/// On-disk listing served to owners syncing a stream.
#[derive(Debug, Clone, Serialize)]
pub struct SyncListing {
    /// Committed partitions, ascending by frame count.
    pub partitions: Vec<u64>,
    /// Seed file names.
    pub seed_files: Vec<String>,
    /// Frame file names in the first partition's initial checkpoint.
    pub frame_files: Vec<String>,
    /// Checkpoint file names in the first partition's initial checkpoint.
    pub checkpoint_files: Vec<String>,
}

/// Filesystem-backed store for stream payloads.
///
/// One directory per stream under `{root}/streams/`. The store performs no
/// locking; the lifecycle manager serializes access per stream.
#[derive(Debug, Clone)]
pub struct StreamStore {
    root: PathBuf,
}

impl StreamStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory holding one stream's payload.
    #[must_use]
    pub fn stream_dir(&self, stream_id: &str) -> PathBuf {
        self.root.join("streams").join(stream_id)
    }

    fn buffer_dir(&self, stream_id: &str) -> PathBuf {
        self.stream_dir(stream_id).join(BUFFER_DIR)
    }

    fn seed_dir(&self, stream_id: &str) -> PathBuf {
        self.stream_dir(stream_id).join(SEED_DIR)
    }

    /// Whether a payload directory exists for the stream.
    #[must_use]
    pub fn stream_exists(&self, stream_id: &str) -> bool {
        self.stream_dir(stream_id).is_dir()
    }

    /// Lists every stream id with a payload directory, for boot-time
    /// reconciliation against the catalog.
    ///
    /// # Errors
    ///
    /// I/O failures other than a missing `streams/` directory.
    pub fn list_stream_ids(&self) -> Result<Vec<String>> {
        let dir = self.root.join("streams");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_owned());
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Writes a new stream's seed and tag files.
    ///
    /// # Errors
    ///
    /// I/O failures; any partial directory is left for the caller to
    /// [`remove_stream`](Self::remove_stream).
    pub fn create_stream(
        &self,
        stream_id: &str,
        seed_files: &HashMap<String, Vec<u8>>,
        tag_files: &HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        for (dir, files) in [(SEED_DIR, seed_files), (TAG_DIR, tag_files)] {
            if files.is_empty() && dir == TAG_DIR {
                continue;
            }
            let dir = self.stream_dir(stream_id).join(dir);
            fs::create_dir_all(&dir)?;
            for (name, data) in files {
                fs::write(dir.join(name), data)?;
            }
        }
        debug!(stream_id, seeds = seed_files.len(), "stream payload created");
        Ok(())
    }

    /// Deletes a stream's payload directory. Missing directories are fine.
    ///
    /// # Errors
    ///
    /// I/O failures other than the directory being absent.
    pub fn remove_stream(&self, stream_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.stream_dir(stream_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Wipes any stale buffered frames. Runs as the activation callback so
    /// a new core starts from the last committed checkpoint.
    ///
    /// # Errors
    ///
    /// I/O failures other than the buffer being absent.
    pub fn clear_buffer(&self, stream_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.buffer_dir(stream_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Appends one frame's files to the buffer, decoding `.b64` / `.gz`
    /// transport wrappers by extension.
    ///
    /// # Errors
    ///
    /// Decode failures or I/O failures.
    pub fn append_frame(&self, stream_id: &str, files: &HashMap<String, Vec<u8>>) -> Result<()> {
        let buffer = self.buffer_dir(stream_id);
        fs::create_dir_all(&buffer)?;
        for (name, data) in files {
            let (name, data) = decode_named_file(name, data)?;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(buffer.join(name))?;
            file.write_all(&data)?;
        }
        Ok(())
    }

    /// Commits the buffer into a numbered partition together with the
    /// core's checkpoint files, and returns the new committed frame count.
    ///
    /// The partition is named for `frames + buffer_frames`. With buffered
    /// frames present the commit lands at checkpoint index 0; a checkpoint
    /// with nothing buffered (a pure restart snapshot) lands one past the
    /// highest existing index of that partition.
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn commit_checkpoint(
        &self,
        stream_id: &str,
        checkpoint_files: &HashMap<String, Vec<u8>>,
        frames: u64,
        buffer_frames: u64,
    ) -> Result<u64> {
        let buffer = self.buffer_dir(stream_id);
        let staged = buffer.join(CHECKPOINT_DIR);
        fs::create_dir_all(&staged)?;
        for (name, data) in checkpoint_files {
            fs::write(staged.join(name), data)?;
        }

        let total = frames + buffer_frames;
        let partition = self.stream_dir(stream_id).join(total.to_string());
        fs::create_dir_all(&partition)?;
        let index = if buffer_frames > 0 {
            0
        } else {
            max_numeric_entry(&partition)?.unwrap_or(0) + 1
        };
        fs::rename(&buffer, partition.join(index.to_string()))?;
        debug!(stream_id, total, index, "checkpoint committed");
        Ok(total)
    }

    /// Committed partitions, ascending by frame count.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSuchStream`] when the payload directory is missing.
    pub fn list_partitions(&self, stream_id: &str) -> Result<Vec<u64>> {
        let dir = self.stream_dir(stream_id);
        if !dir.is_dir() {
            return Err(StoreError::NoSuchStream(stream_id.to_owned()));
        }
        let mut partitions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(n) = entry.file_name().to_str().and_then(|s| s.parse::<u64>().ok()) {
                if n > 0 {
                    partitions.push(n);
                }
            }
        }
        partitions.sort_unstable();
        Ok(partitions)
    }

    /// The files a core needs to start: the latest checkpoint's snapshot at
    /// the given frame count, overlaid on the seed files (the checkpoint
    /// wins on name collisions).
    ///
    /// # Errors
    ///
    /// I/O failures reading the checkpoint or seed directories.
    pub fn load_start_files(
        &self,
        stream_id: &str,
        frames: u64,
    ) -> Result<HashMap<String, Vec<u8>>> {
        let mut files = HashMap::new();
        if frames > 0 {
            let partition = self.stream_dir(stream_id).join(frames.to_string());
            let index = max_numeric_entry(&partition)?.unwrap_or(0);
            let checkpoint = partition.join(index.to_string()).join(CHECKPOINT_DIR);
            read_dir_files(&checkpoint, &mut files)?;
        }
        let seeds = self.seed_dir(stream_id);
        let mut seed_files = HashMap::new();
        read_dir_files(&seeds, &mut seed_files)?;
        for (name, data) in seed_files {
            files.entry(name).or_insert(data);
        }
        Ok(files)
    }

    /// Listing for the owner-facing sync endpoint: partitions, seed file
    /// names, and the frame/checkpoint file names of the first partition's
    /// initial checkpoint.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSuchStream`] or I/O failures.
    pub fn sync_listing(&self, stream_id: &str) -> Result<SyncListing> {
        let partitions = self.list_partitions(stream_id)?;
        let seed_files = list_file_names(&self.seed_dir(stream_id))?;
        let (mut frame_files, mut checkpoint_files) = (Vec::new(), Vec::new());
        if let Some(first) = partitions.first() {
            let frame_dir = self
                .stream_dir(stream_id)
                .join(first.to_string())
                .join("0");
            frame_files = list_file_names(&frame_dir)?
                .into_iter()
                .filter(|name| name != CHECKPOINT_DIR)
                .collect();
            checkpoint_files = list_file_names(&frame_dir.join(CHECKPOINT_DIR))?;
        }
        Ok(SyncListing {
            partitions,
            seed_files,
            frame_files,
            checkpoint_files,
        })
    }

    /// Reads one file from a stream's payload directory. The relative path
    /// must stay inside the stream directory; anything with a parent or
    /// absolute component is rejected.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidPath`] on escape attempts, otherwise I/O
    /// failures.
    pub fn read_file(&self, stream_id: &str, rel_path: &str) -> Result<Vec<u8>> {
        let rel = Path::new(rel_path);
        let contained = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(StoreError::InvalidPath(rel_path.to_owned()));
        }
        Ok(fs::read(self.stream_dir(stream_id).join(rel))?)
    }
}

/// Highest numeric entry name in `dir`, or `None` when the directory is
/// missing or has no numeric entries.
fn max_numeric_entry(dir: &Path) -> Result<Option<u64>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut max = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(n) = entry.file_name().to_str().and_then(|s| s.parse::<u64>().ok()) {
            max = Some(max.map_or(n, |m: u64| m.max(n)));
        }
    }
    Ok(max)
}

/// Sorted file names in `dir`; a missing directory lists as empty.
fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Reads every regular file in `dir` into the map; missing directory is
/// treated as empty.
fn read_dir_files(dir: &Path, files: &mut HashMap<String, Vec<u8>>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                files.insert(name.to_owned(), fs::read(entry.path())?);
            }
        }
    }
    Ok(())
}
