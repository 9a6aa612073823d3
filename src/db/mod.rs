//! SQLite-backed session persistence.
//!
//! A dedicated worker thread owns the connection; callers submit closures
//! over a channel and await the reply, so every statement is serialized in
//! submission order. Mutations republish the full session list on a watch
//! channel for live list views.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::{oneshot, watch};

mod migrations;
mod store;

pub use store::{MemoryStore, SessionStore};

use crate::models::Session;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    snapshot_tx: watch::Sender<Vec<Session>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn codes_to_json(codes: &[String]) -> Result<String> {
    serde_json::to_string(codes).map_err(|err| anyhow!("failed to encode code list: {err}"))
}

fn codes_from_json(value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value).map_err(|err| anyhow!("invalid code list '{value}': {err}"))
}

fn session_from_row(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.get::<_, String>(0)?,
        name: row.get::<_, String>(1)?,
        expected_codes: codes_from_json(&row.get::<_, String>(2)?)?,
        found_codes: codes_from_json(&row.get::<_, String>(3)?)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(5)?)?,
    })
}

fn load_all(conn: &Connection) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, expected_codes, found_codes, created_at, updated_at
         FROM sessions
         ORDER BY updated_at DESC, id ASC",
    )?;

    let mut rows = stmt.query([])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(session_from_row(row)?);
    }

    Ok(sessions)
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("qrtally-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                // Migrations plus the initial list snapshot in one handshake.
                let init_result = run_migrations(&mut conn)
                    .context("failed to run database migrations")
                    .and_then(|_| load_all(&conn));
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        let initial_sessions = ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        let (snapshot_tx, _) = watch::channel(initial_sessions);

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
                snapshot_tx,
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    fn publish_snapshot(&self, sessions: Vec<Session>) {
        let _ = self.inner.snapshot_tx.send(sessions);
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, expected_codes, found_codes, created_at, updated_at
                 FROM sessions
                 WHERE id = ?1",
            )?;

            stmt.query_row(params![id], |row| Ok(session_from_row(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    async fn upsert(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        let sessions = self
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO sessions
                     (id, name, expected_codes, found_codes, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.id,
                        record.name,
                        codes_to_json(&record.expected_codes)?,
                        codes_to_json(&record.found_codes)?,
                        record.created_at.to_rfc3339(),
                        record.updated_at.to_rfc3339(),
                    ],
                )
                .with_context(|| "failed to upsert session")?;
                load_all(conn)
            })
            .await?;

        self.publish_snapshot(sessions);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let sessions = self
            .execute(move |conn| {
                conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
                    .with_context(|| "failed to delete session")?;
                load_all(conn)
            })
            .await?;

        self.publish_snapshot(sessions);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>> {
        self.execute(|conn| load_all(conn)).await
    }

    fn watch_all(&self) -> watch::Receiver<Vec<Session>> {
        self.inner.snapshot_tx.subscribe()
    }
}
