//! The background watch loop: connect with bounded retries, then refresh the
//! snapshot cache every interval until stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::automation::{Automation, Session};
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::options::OpenOptions;
use crate::snapshot::SnapshotCache;

/// Where the watch loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No live sheet; the loop is (re)trying to connect.
    Disconnected,
    /// The loop is refreshing snapshots from a live sheet.
    Connected,
    /// Stopped on request. Terminal.
    Stopped,
    /// Gave up connecting. Terminal.
    Failed,
}

impl WatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WatchState::Stopped | WatchState::Failed)
    }
}

/// The document lock. Holding it is the only way to reach the live document.
pub(crate) type SharedConnection<S> = Arc<Mutex<ConnectionManager<S>>>;

/// State shared between the facade and its watch task.
pub(crate) struct Shared<S: Session> {
    pub(crate) connection: SharedConnection<S>,
    pub(crate) cache: Arc<SnapshotCache>,
    pub(crate) state: watch::Sender<WatchState>,
}

/// Run `f` against the connection on the blocking pool while holding the lock.
///
/// The guard moves into the blocking closure, so the lock stays held until
/// the automation call returns even if the awaiting future is dropped.
pub(crate) async fn with_connection<S, F, T>(connection: &SharedConnection<S>, f: F) -> Result<T>
where
    S: Session,
    F: FnOnce(&mut ConnectionManager<S>) -> T + Send + 'static,
    T: Send + 'static,
{
    let mut guard = Arc::clone(connection).lock_owned().await;
    let value = tokio::task::spawn_blocking(move || f(&mut guard)).await?;
    Ok(value)
}

/// Everything the loop needs, moved into the spawned task.
pub(crate) struct WatchLoop<A: Automation> {
    pub(crate) automation: Arc<A>,
    pub(crate) shared: Arc<Shared<A::Session>>,
    pub(crate) sheet_name: String,
    pub(crate) options: OpenOptions,
    pub(crate) stop: watch::Receiver<bool>,
}

impl<A: Automation> WatchLoop<A> {
    pub(crate) async fn run(mut self) {
        let automation = Arc::clone(&self.automation);
        let session = match tokio::task::spawn_blocking(move || automation.initialize()).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::error!("Failed to initialize automation: {e}");
                self.shared.state.send_replace(WatchState::Failed);
                return;
            }
            Err(e) => {
                tracing::error!("Automation initialization panicked: {e}");
                self.shared.state.send_replace(WatchState::Failed);
                return;
            }
        };
        self.shared.connection.lock().await.attach(session);

        let final_state = self.drive().await;

        // Tear down inside the platform context, then release it.
        let save_on_close = self.options.save_on_close;
        let teardown = with_connection(&self.shared.connection, move |conn| {
            conn.disconnect(save_on_close);
            drop(conn.detach());
        })
        .await;
        if let Err(e) = teardown {
            tracing::error!("Watch loop teardown failed: {e}");
        }

        match final_state {
            WatchState::Failed => tracing::error!("Watch loop stopped after failing to connect"),
            _ => tracing::info!("Watch loop stopped"),
        }
        self.shared.state.send_replace(final_state);
    }

    /// The state machine proper. Returns the terminal state.
    async fn drive(&mut self) -> WatchState {
        let interval = self.options.update_interval;
        let mut retry_count: u32 = 0;
        let mut read_failures: u32 = 0;

        loop {
            if *self.stop.borrow() {
                return WatchState::Stopped;
            }

            let connected = self.shared.connection.lock().await.is_connected();
            if !connected {
                if retry_count >= self.options.max_retries {
                    tracing::error!(
                        "Failed to connect to sheet '{}' after {retry_count} attempts",
                        self.sheet_name
                    );
                    return WatchState::Failed;
                }

                let sheet_name = self.sheet_name.clone();
                let ok = match with_connection(&self.shared.connection, move |conn| {
                    conn.connect(&sheet_name)
                })
                .await
                {
                    Ok(ok) => ok,
                    Err(e) => {
                        tracing::warn!("Connect attempt aborted: {e}");
                        false
                    }
                };

                if !ok {
                    retry_count += 1;
                    tracing::debug!(retry_count, "Connect attempt failed");
                    if pause(interval, &mut self.stop).await {
                        return WatchState::Stopped;
                    }
                    continue;
                }

                retry_count = 0;
                read_failures = 0;
                self.shared.state.send_replace(WatchState::Connected);
            }

            let cache = Arc::clone(&self.shared.cache);
            let read = with_connection(&self.shared.connection, move |conn| {
                conn.read_snapshot().map(|snapshot| {
                    let snapshot = cache.store(snapshot);
                    (snapshot.row_count(), snapshot.column_count())
                })
            })
            .await;

            match read {
                Ok(Ok((rows, columns))) => {
                    read_failures = 0;
                    tracing::debug!(rows, columns, "Refreshed snapshot");
                }
                Ok(Err(e)) => {
                    read_failures += 1;
                    tracing::warn!("Error reading sheet data: {e}");
                }
                Err(e) => {
                    read_failures += 1;
                    tracing::warn!("Snapshot read aborted: {e}");
                }
            }
            if read_failures > 0 && self.drop_if_stale(read_failures).await {
                read_failures = 0;
            }

            if pause(interval, &mut self.stop).await {
                return WatchState::Stopped;
            }
        }
    }

    /// Drop a connection whose reads keep failing so the next iteration
    /// reconnects. Returns true if the connection was dropped.
    async fn drop_if_stale(&self, read_failures: u32) -> bool {
        match self.options.reconnect_after_read_failures {
            Some(limit) if read_failures >= limit => {}
            _ => return false,
        }

        tracing::warn!("{read_failures} consecutive read failures, reconnecting");
        let save_on_close = self.options.save_on_close;
        if let Err(e) = with_connection(&self.shared.connection, move |conn| {
            conn.disconnect(save_on_close)
        })
        .await
        {
            tracing::error!("Failed to drop stale connection: {e}");
        }
        self.shared.state.send_replace(WatchState::Disconnected);
        true
    }
}

/// Sleep for `interval`, waking early on a stop request.
///
/// Returns true when the loop should stop. A dropped sender counts as a stop.
async fn pause(interval: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = stop.wait_for(|stopped| *stopped) => true,
    }
}
