use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const STORE_THREAD_NAME: &str = "glucocast-store";

type StoreJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreMessage {
    Run(StoreJob),
    Stop,
}

/// Owns the sending half of the job queue and the store thread's handle.
struct StoreThread {
    jobs: mpsc::Sender<StoreMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StoreThread {
    fn stop(&self) {
        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if self.jobs.send(StoreMessage::Stop).is_err() {
            warn!("Store thread already gone before stop request");
        }
        if handle.join().is_err() {
            error!("Store thread panicked; pending jobs were dropped");
        }
    }
}

impl Drop for StoreThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens the file, switches it to WAL and brings the schema up to date.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("cannot open telemetry store {}", path.display()))?;

    // Readers in tests and tooling may hold the file while jobs write.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("Store stays in rollback journal mode: {err}");
    }

    run_migrations(&mut conn).context("schema migration failed")?;
    Ok(conn)
}

/// Runs queued jobs in arrival order until a stop message or every sender is gone.
fn serve(mut conn: Connection, jobs: mpsc::Receiver<StoreMessage>) {
    for message in jobs {
        match message {
            StoreMessage::Run(job) => job(&mut conn),
            StoreMessage::Stop => break,
        }
    }
    info!("Store thread stopped");
}

/// Handle to the SQLite store.
///
/// A single thread owns the connection and every repository call is queued to
/// it; clones share the queue. The thread is joined when the last clone is
/// dropped, which is the store's shutdown point.
#[derive(Clone)]
pub struct Database {
    thread: Arc<StoreThread>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create store directory {}", dir.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<StoreMessage>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name(STORE_THREAD_NAME.into())
            .spawn(move || match open_store(&thread_path) {
                Ok(conn) => {
                    if opened_tx.send(Ok(())).is_ok() {
                        serve(conn, jobs_rx);
                    }
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(err));
                }
            })
            .context("cannot spawn store thread")?;

        opened_rx
            .recv()
            .context("store thread exited while opening the database")??;

        info!("Telemetry store ready at {}", path.display());

        Ok(Self {
            thread: Arc::new(StoreThread {
                jobs: jobs_tx,
                handle: Mutex::new(Some(handle)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Queues `job` on the store thread and awaits its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let message = StoreMessage::Run(Box::new(move |conn| {
            // A caller that gave up (timeout, cancelled task) is not an error.
            let _ = reply_tx.send(job(conn));
        }));

        self.thread
            .jobs
            .send(message)
            .map_err(|_| anyhow!("telemetry store is shut down"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread dropped the job without replying"))?
    }
}
