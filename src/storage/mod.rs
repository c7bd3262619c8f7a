//! Two-partition key-value store backing the tracker.
//!
//! The browser exposes a synced partition (the blocklist lives there) and a
//! local partition (stats, grants, legacy counters). Both map onto a single
//! SQLite table owned by a dedicated worker thread; callers suspend on a
//! oneshot reply for every operation.

use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

/// Which of the two browser storage areas a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Synced across devices; holds the user's blocklist.
    Synced,
    /// Device-local; holds stats, grants, and legacy counters.
    Local,
}

impl Partition {
    fn as_str(&self) -> &'static str {
        match self {
            Partition::Synced => "synced",
            Partition::Local => "local",
        }
    }
}

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StorageInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to storage thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join storage thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

impl Storage {
    /// Opens (creating if needed) an on-disk store at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }
        Self::spawn_worker(Some(path))
    }

    /// Opens a throwaway in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::spawn_worker(None)
    }

    fn spawn_worker(path: Option<PathBuf>) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = path.clone();

        let worker = thread::Builder::new()
            .name("siteguard-storage".into())
            .spawn(move || {
                let open_result = match &path_for_thread {
                    Some(path) => Connection::open(path),
                    None => Connection::open_in_memory(),
                };
                let mut conn = match open_result {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open storage database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run storage migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Storage initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Storage thread shutting down");
            })
            .with_context(|| "failed to spawn storage worker thread")?;

        ready_rx
            .recv()
            .context("storage worker exited before signaling readiness")??;

        if let Some(path) = &path {
            info!("Storage initialized at {}", path.display());
        }

        Ok(Self {
            inner: Arc::new(StorageInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Storage caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to storage thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("storage thread terminated unexpectedly"))?
    }

    /// Reads and deserializes the record at `key`, or `None` if absent.
    pub async fn get<T>(&self, partition: Partition, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE partition = ?1 AND key = ?2",
                    params![partition.as_str(), key],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read record '{key}'"))?;

            raw.map(|json| {
                serde_json::from_str(&json)
                    .with_context(|| format!("malformed record at '{key}'"))
            })
            .transpose()
        })
        .await
    }

    /// Serializes `value` and upserts it at `key`.
    pub async fn set<T>(&self, partition: Partition, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let key = key.to_string();
        let json = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize record for '{key}'"))?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (partition, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (partition, key) DO UPDATE SET value = excluded.value",
                params![partition.as_str(), key, json],
            )
            .with_context(|| format!("failed to write record '{key}'"))?;
            Ok(())
        })
        .await
    }

    /// Deletes the record at `key` if present.
    pub async fn remove(&self, partition: Partition, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM kv_entries WHERE partition = ?1 AND key = ?2",
                params![partition.as_str(), key],
            )
            .with_context(|| format!("failed to remove record '{key}'"))?;
            Ok(())
        })
        .await
    }

    /// All keys in `partition` starting with `prefix`.
    pub async fn keys_with_prefix(
        &self,
        partition: Partition,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM kv_entries
                 WHERE partition = ?1 AND key LIKE ?2 ESCAPE '\\'
                 ORDER BY key",
            )?;

            let mut rows = stmt.query(params![partition.as_str(), pattern])?;
            let mut keys = Vec::new();
            while let Some(row) = rows.next()? {
                keys.push(row.get::<_, String>(0)?);
            }

            Ok(keys)
        })
        .await
    }
}
