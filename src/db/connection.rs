use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{Connection, Transaction};
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const WORKER_THREAD_NAME: &str = "cogni-db";

type StoreJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Run(StoreJob),
    Shutdown,
}

struct StoreWorker {
    sender: mpsc::Sender<StoreCommand>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        let mut guard = match self.thread.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store worker: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join store worker: {join_err:?}");
            }
        }
    }
}

/// Open the connection owned by the worker. Foreign keys are required: a sample may
/// only reference an existing user, even when the user is deleted mid-tick.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(mut conn: Connection, commands: mpsc::Receiver<StoreCommand>) {
    let mut jobs: u64 = 0;
    while let Ok(command) = commands.recv() {
        match command {
            StoreCommand::Run(job) => {
                job(&mut conn);
                jobs += 1;
            }
            StoreCommand::Shutdown => break,
        }
    }

    info!("Store worker shutting down after {jobs} job(s)");
}

/// Handle to the SQLite store shared by the capture tasks, the session hooks and the
/// dashboard.
///
/// One worker thread owns the connection. Each call ships a closure to it and awaits
/// the reply, so calls from any number of capture tasks are serialized and never
/// interleave inside a statement.
#[derive(Clone)]
pub struct Database {
    worker: Arc<StoreWorker>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let path_for_thread = db_path.clone();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || match open_store(&path_for_thread) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_err() {
                        error!("Store opener went away before the ready signal");
                        return;
                    }
                    serve(conn, command_rx);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!("Database ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(StoreWorker {
                sender: command_tx,
                thread: Mutex::new(Some(thread)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Run `task` on the worker thread and return its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: StoreJob = Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                error!("Store caller dropped before receiving its result");
            }
        });

        self.worker
            .sender
            .send(StoreCommand::Run(job))
            .map_err(|err| anyhow!("failed to send job to store worker: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store worker terminated unexpectedly"))?
    }

    /// Run `task` in a transaction of its own: committed when it returns `Ok`, rolled
    /// back otherwise.
    pub async fn write<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open write transaction")?;
            let value = task(&tx)?;
            tx.commit().context("failed to commit write transaction")?;
            Ok(value)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;

    fn team_count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))?)
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("cogni.sqlite3")).unwrap();

        let enabled: i64 = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(enabled, 1);

        let orphan = db
            .write(|tx| {
                tx.execute(
                    "INSERT INTO states (user_id, timestamp, stress, fatigue, attention)
                     VALUES (42, '2024-05-01T09:00:00Z', 0.1, 0.2, 0.85)",
                    [],
                )?;
                Ok(())
            })
            .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("cogni.sqlite3")).unwrap();

        let result: Result<()> = db
            .write(|tx| {
                tx.execute(
                    "INSERT INTO teams (name, created_at) VALUES ('Ops', '2024-05-01T09:00:00Z')",
                    [],
                )?;
                bail!("abort after insert");
            })
            .await;
        assert!(result.is_err());

        assert_eq!(db.execute(|conn| team_count(conn)).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("cogni.sqlite3")).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move { db.create_team(&format!("team-{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(db.execute(|conn| team_count(conn)).await.unwrap(), 16);
    }

    #[test]
    fn opening_a_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Database::new(dir.path().to_path_buf()).is_err());
    }
}
