//! `AsyncWorkbook`: the public facade over one watched sheet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::automation::Automation;
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::options::{validate_document_path, OpenOptions};
use crate::snapshot::{Snapshot, SnapshotCache};
use crate::value::CellValue;
use crate::watch::{with_connection, Shared, WatchLoop, WatchState};

/// A spreadsheet sheet watched in the background.
///
/// Reads are served from the latest cached snapshot and never wait on the
/// application. Writes and saves go straight to the live document, serialized
/// with the watch loop's reads by a single lock.
///
/// Dropping the workbook stops the watch loop, which closes the document on
/// its way out. Call [`close`](Self::close) to wait for that to finish.
pub struct AsyncWorkbook<A: Automation> {
    path: PathBuf,
    sheet_name: String,
    options: OpenOptions,
    shared: Arc<Shared<A::Session>>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Automation> AsyncWorkbook<A> {
    /// Validate `filename` and start watching `sheet_name` in the background.
    ///
    /// Returns as soon as the watch loop is spawned; it does not wait for the
    /// first connection. Must be called from within a Tokio runtime.
    pub async fn open(
        automation: A,
        filename: impl AsRef<Path>,
        sheet_name: impl Into<String>,
        options: OpenOptions,
    ) -> Result<Self> {
        let path = validate_document_path(filename.as_ref())?;
        options.validate()?;
        let sheet_name = sheet_name.into();

        let (state, _) = watch::channel(WatchState::Disconnected);
        let shared = Arc::new(Shared {
            connection: Arc::new(Mutex::new(ConnectionManager::new(&path, options.visible))),
            cache: Arc::new(SnapshotCache::new()),
            state,
        });
        let (stop, stop_rx) = watch::channel(false);

        let watch_loop = WatchLoop {
            automation: Arc::new(automation),
            shared: Arc::clone(&shared),
            sheet_name: sheet_name.clone(),
            options: options.clone(),
            stop: stop_rx,
        };
        tracing::info!("Watching sheet '{sheet_name}' in {}", path.display());
        let task = tokio::spawn(watch_loop.run());

        Ok(Self {
            path,
            sheet_name,
            options,
            shared,
            stop,
            task: Mutex::new(Some(task)),
        })
    }

    /// The most recently cached snapshot, or `None` before the first read.
    pub fn read_data(&self) -> Option<Arc<Snapshot>> {
        self.shared.cache.get()
    }

    /// Receiver notified each time the cached snapshot is replaced or cleared.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.shared.cache.subscribe()
    }

    /// Read the used range now, store it in the cache and return it.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let cache = Arc::clone(&self.shared.cache);
        with_connection(&self.shared.connection, move |conn| {
            conn.read_snapshot().map(|snapshot| cache.store(snapshot))
        })
        .await?
    }

    /// Write `value` at a 0-based `(row, column)` of the live sheet.
    ///
    /// Fails with [`Error::NotConnected`] if no sheet is connected, or with
    /// [`Error::Automation`] if the application rejects the write.
    pub async fn write_cell(
        &self,
        row: u32,
        column: u32,
        value: impl Into<CellValue>,
    ) -> Result<()> {
        let value = value.into();
        let result = with_connection(&self.shared.connection, move |conn| {
            conn.write_cell(row, column, &value)
        })
        .await
        .and_then(|written| written);
        if let Err(e) = &result {
            tracing::warn!("Failed to write cell ({row}, {column}): {e}");
        }
        result
    }

    /// Persist pending changes. Does nothing when not connected.
    pub async fn save(&self) -> Result<()> {
        with_connection(&self.shared.connection, |conn| conn.save()).await?
    }

    /// Stop watching, close the document (saving per [`OpenOptions::save_on_close`]),
    /// quit the application and clear the cache.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.stop.send_replace(true);

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!("Watch task ended abnormally: {e}");
            }
        }

        // Normally the loop has already torn everything down.
        let save_on_close = self.options.save_on_close;
        if let Err(e) = with_connection(&self.shared.connection, move |conn| {
            conn.disconnect(save_on_close);
            drop(conn.detach());
        })
        .await
        {
            tracing::error!("Error during cleanup: {e}");
        }

        self.shared.cache.clear();
    }

    pub fn state(&self) -> WatchState {
        *self.shared.state.borrow()
    }

    /// Whether the watch loop is still running.
    pub fn is_watching(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Receiver notified on every watch state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.shared.state.subscribe()
    }

    /// Wait until the watch loop has connected to the sheet.
    pub async fn wait_until_connected(&self) -> Result<()> {
        let mut state = self.subscribe_state();
        let reached = match state.wait_for(|s| *s != WatchState::Disconnected).await {
            Ok(reached) => *reached,
            Err(_) => return Err(Error::Closed),
        };
        match reached {
            WatchState::Connected => Ok(()),
            WatchState::Failed => Err(Error::RetriesExhausted(self.options.max_retries)),
            WatchState::Stopped | WatchState::Disconnected => Err(Error::Closed),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }
}
