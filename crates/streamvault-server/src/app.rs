//! Application wiring: manager, store, catalog, and the deferred queue.

use std::sync::Arc;

use streamvault_catalog::{Catalog, CatalogError};
use streamvault_core::{DeferredWriteQueue, Stream, StreamManager, StreamStatus};
use streamvault_store::{StoreError, StreamStore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::VaultConfig;
use crate::hooks::VaultHooks;

/// Errors bringing a vault up.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// Catalog failure during restore.
    #[error("catalog failure at boot: {0}")]
    Catalog(#[from] CatalogError),

    /// Payload store failure during restore.
    #[error("payload store failure at boot: {0}")]
    Store(#[from] StoreError),
}

/// One running vault: the lifecycle manager plus its collaborators.
pub struct App {
    /// The in-memory lifecycle manager.
    pub manager: Arc<StreamManager>,
    /// The on-disk payload store.
    pub store: StreamStore,
    /// The persistent metadata catalog.
    pub catalog: Arc<dyn Catalog>,
    /// FIFO of deferred catalog writes.
    pub queue: Arc<DeferredWriteQueue>,
    /// This vault's configuration.
    pub config: VaultConfig,
}

impl App {
    /// Builds the vault and restores its streams from the catalog.
    /// Returns the app plus the deferred-write worker's handle; await the
    /// handle after [`App::begin_shutdown`] to observe the final drain.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`BootError`] when the restore cannot read the catalog or disk.
    pub fn new(
        config: VaultConfig,
        catalog: Arc<dyn Catalog>,
    ) -> Result<(Arc<Self>, JoinHandle<()>), BootError> {
        let store = StreamStore::new(&config.data_dir);
        let queue = DeferredWriteQueue::new();
        let worker = queue.spawn_worker();
        let hooks = VaultHooks::new(Arc::clone(&catalog), Arc::clone(&queue));
        let manager = StreamManager::new(Box::new(hooks), config.expiration());
        let app = Arc::new(Self {
            manager,
            store,
            catalog,
            queue,
            config,
        });
        app.restore()?;
        Ok((app, worker))
    }

    /// Loads every catalog record into the manager, reconciling frame
    /// counts against the highest committed partition on disk (disk wins)
    /// and deleting payload directories the catalog no longer knows.
    fn restore(&self) -> Result<(), BootError> {
        let records = self.catalog.load_streams()?;

        for stream_id in self.store.list_stream_ids()? {
            if !records.iter().any(|r| r.stream_id == stream_id) {
                warn!(stream_id = %stream_id, "payload directory has no catalog record, removing");
                self.store.remove_stream(&stream_id)?;
            }
        }

        let total = records.len();
        for record in records {
            if !self.store.stream_exists(&record.stream_id) {
                warn!(
                    stream_id = %record.stream_id,
                    "catalog record has no payload directory, skipping"
                );
                continue;
            }
            let disk_frames = self
                .store
                .list_partitions(&record.stream_id)?
                .last()
                .copied()
                .unwrap_or(0);
            if disk_frames != record.frames {
                warn!(
                    stream_id = %record.stream_id,
                    disk = disk_frames,
                    catalog = record.frames,
                    "frame count mismatch, using disk value"
                );
            }
            let enabled = record.status == StreamStatus::Enabled;
            let stream = Stream::new(
                record.stream_id,
                record.target_id,
                record.owner,
                disk_frames,
                record.error_count,
                record.creation_date,
            );
            if let Err(err) = self.manager.add_stream(stream, enabled) {
                warn!(error = %err, "failed to index restored stream");
            }
        }
        info!(streams = total, name = %self.config.name, "restore complete");
        Ok(())
    }

    /// Asks the deferred-write worker to drain and stop. Await the worker
    /// handle from [`App::new`] before exiting the process.
    pub fn begin_shutdown(&self) {
        info!("shutting down, draining deferred writes");
        self.queue.request_shutdown();
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.config.name)
            .field("streams", &self.manager.stream_count())
            .finish_non_exhaustive()
    }
}
