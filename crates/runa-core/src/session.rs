// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use thiserror::Error;

use runa_model::ResponseItem;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage error: {0}")]
    Storage(String),

    #[error("session is closed")]
    Closed,
}

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Storage(e.to_string())
    }
}

/// An ordered, truncatable conversation store, addressable by session id
/// and shared across runs.
///
/// Reads are consistent snapshots; writers are serialized, so concurrent
/// runs observe each other's appends atomically.
#[async_trait]
pub trait Session: Send + Sync {
    /// Append items in order.
    async fn add_items(&self, items: Vec<ResponseItem>) -> Result<(), SessionError>;

    /// Up to the N most recent items in insertion order; `None` means all.
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<ResponseItem>, SessionError>;

    /// Remove and return the most recent item.
    async fn pop_item(&self) -> Result<Option<ResponseItem>, SessionError>;

    /// Remove every item.
    async fn clear_session(&self) -> Result<(), SessionError>;

    /// Release backing resources. Further calls fail with `Closed`.
    async fn close(&self) -> Result<(), SessionError>;
}

// ─── In-memory store ─────────────────────────────────────────────────────────

/// A process-local session with no persistence: the default for tests and
/// short-lived embedders.
#[derive(Debug, Default)]
pub struct InMemorySession {
    items: Mutex<Vec<ResponseItem>>,
    closed: AtomicBool,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn add_items(&self, items: Vec<ResponseItem>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.items.lock().expect("session lock poisoned").extend(items);
        Ok(())
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<ResponseItem>, SessionError> {
        self.ensure_open()?;
        let items = self.items.lock().expect("session lock poisoned");
        Ok(match limit {
            None => items.clone(),
            Some(n) => items[items.len().saturating_sub(n)..].to_vec(),
        })
    }

    async fn pop_item(&self) -> Result<Option<ResponseItem>, SessionError> {
        self.ensure_open()?;
        Ok(self.items.lock().expect("session lock poisoned").pop())
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.items.lock().expect("session lock poisoned").clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ─── SQLite store ────────────────────────────────────────────────────────────

/// A session persisted in an embedded SQLite database.
///
/// Layout: `(session_id, position, role, payload, created_at)` with
/// `(session_id, position)` as the primary key, so one file can hold many
/// sessions. Item payloads are stored as JSON.
pub struct SqliteSession {
    session_id: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteSession {
    pub fn new(session_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::with_connection(session_id, Connection::open(path)?)
    }

    /// A private in-memory database; useful for tests and ephemera.
    pub fn in_memory(session_id: impl Into<String>) -> Result<Self, SessionError> {
        Self::with_connection(session_id, Connection::open_in_memory()?)
    }

    fn with_connection(
        session_id: impl Into<String>,
        conn: Connection,
    ) -> Result<Self, SessionError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_items (
                session_id TEXT    NOT NULL,
                position   INTEGER NOT NULL,
                role       TEXT    NOT NULL,
                payload    TEXT    NOT NULL,
                created_at TIMESTAMP NOT NULL,
                PRIMARY KEY (session_id, position)
            );",
        )?;
        Ok(Self {
            session_id: session_id.into(),
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let guard = self.conn.lock().expect("session lock poisoned");
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(SessionError::Closed),
        }
    }
}

/// The `role` column: the message role for messages, the item kind tag for
/// everything else.
fn item_role(item: &ResponseItem) -> String {
    match item {
        ResponseItem::Message { role, .. } => role.as_str().to_string(),
        ResponseItem::Reasoning { .. } => "reasoning".into(),
        ResponseItem::FunctionCall { .. } => "function_call".into(),
        ResponseItem::FunctionCallOutput { .. } => "function_call_output".into(),
        ResponseItem::HostedToolCall { .. } => "hosted_tool_call".into(),
        ResponseItem::McpApprovalRequest { .. } => "mcp_approval_request".into(),
        ResponseItem::McpApprovalResponse { .. } => "mcp_approval_response".into(),
        ResponseItem::McpListTools { .. } => "mcp_list_tools".into(),
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn add_items(&self, items: Vec<ResponseItem>) -> Result<(), SessionError> {
        if items.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let next: i64 = conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM session_items WHERE session_id = ?1",
                params![self.session_id],
                |row| row.get(0),
            )?;
            let now = chrono::Utc::now().to_rfc3339();
            let mut stmt = conn.prepare(
                "INSERT INTO session_items (session_id, position, role, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, item) in items.iter().enumerate() {
                let payload = serde_json::to_string(item)?;
                stmt.execute(params![
                    self.session_id,
                    next + i as i64,
                    item_role(item),
                    payload,
                    now
                ])?;
            }
            Ok(())
        })
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<ResponseItem>, SessionError> {
        self.with_conn(|conn| {
            let rows: Vec<ResponseItem> = match limit {
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT payload FROM session_items
                         WHERE session_id = ?1 ORDER BY position ASC",
                    )?;
                    let parsed = stmt
                        .query_map(params![self.session_id], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    parsed
                        .iter()
                        .map(|p| serde_json::from_str(p).map_err(SessionError::from))
                        .collect::<Result<Vec<_>, _>>()?
                }
                Some(n) => {
                    let mut stmt = conn.prepare(
                        "SELECT payload FROM session_items
                         WHERE session_id = ?1 ORDER BY position DESC LIMIT ?2",
                    )?;
                    let parsed = stmt
                        .query_map(params![self.session_id, n as i64], |row| {
                            row.get::<_, String>(0)
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut items = parsed
                        .iter()
                        .map(|p| serde_json::from_str(p).map_err(SessionError::from))
                        .collect::<Result<Vec<ResponseItem>, _>>()?;
                    items.reverse();
                    items
                }
            };
            Ok(rows)
        })
    }

    async fn pop_item(&self) -> Result<Option<ResponseItem>, SessionError> {
        self.with_conn(|conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT position, payload FROM session_items
                     WHERE session_id = ?1 ORDER BY position DESC LIMIT 1",
                    params![self.session_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            let Some((position, payload)) = row else {
                return Ok(None);
            };
            conn.execute(
                "DELETE FROM session_items WHERE session_id = ?1 AND position = ?2",
                params![self.session_id, position],
            )?;
            Ok(Some(serde_json::from_str(&payload)?))
        })
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM session_items WHERE session_id = ?1",
                params![self.session_id],
            )?;
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut guard = self.conn.lock().expect("session lock poisoned");
        guard.take();
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
