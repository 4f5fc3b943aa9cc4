//! SQLite edge store
//!
//! Lives in `.taskdeps/dependencies.db`. Each mutation runs in a
//! `BEGIN IMMEDIATE` transaction, which takes SQLite's write lock before
//! the guard reads the edge set; a `UNIQUE(predecessor, successor)` index
//! backs the duplicate rule at the schema level.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::debug;

use super::edge_store::{admit, split_by_task, EdgeStore, StoreResult};
use crate::domain::{
    DependencyEdge, DependencyError, EdgeChange, EdgeId, NewDependency, TaskEdges, TaskId,
};

const COLUMNS: &str = "id, predecessor, successor, dep_type, lag_days, created_at, updated_at";

/// Edge store backed by a SQLite database
pub struct SqliteEdgeStore {
    /// Path to the SQLite database
    db_path: PathBuf,

    /// Database connection
    conn: Mutex<Connection>,
}

impl SqliteEdgeStore {
    /// Schema version stored in `PRAGMA user_version`
    const SCHEMA_VERSION: i32 = 1;

    /// Opens (creating if needed) the database at `db_path`
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to configure database")?;

        let store = Self {
            db_path,
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;

        Ok(store)
    }

    /// Opens the default database for a project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        Self::open(project_root.join(".taskdeps").join("dependencies.db"))
    }

    /// Returns the database path
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the current schema version
    fn schema_version(&self) -> Result<i32> {
        let version: i32 = self
            .lock()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("Failed to read schema version")?;
        Ok(version)
    }

    /// Creates the schema on first use and refuses newer ones
    fn ensure_schema(&self) -> Result<()> {
        let version = self.schema_version()?;

        if version > Self::SCHEMA_VERSION {
            anyhow::bail!(
                "Database {} uses schema version {}, newer than supported ({})",
                self.db_path.display(),
                version,
                Self::SCHEMA_VERSION
            );
        }

        if version == Self::SCHEMA_VERSION {
            return Ok(());
        }

        self.lock()
            .execute_batch(&format!(
                "
                BEGIN;
                CREATE TABLE IF NOT EXISTS dependencies (
                    id TEXT PRIMARY KEY,
                    predecessor TEXT NOT NULL,
                    successor TEXT NOT NULL,
                    dep_type TEXT NOT NULL,
                    lag_days INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    CHECK (predecessor <> successor),
                    UNIQUE (predecessor, successor)
                );
                CREATE INDEX IF NOT EXISTS idx_dependencies_successor
                    ON dependencies(successor);
                PRAGMA user_version = {};
                COMMIT;
                ",
                Self::SCHEMA_VERSION
            ))
            .context("Failed to create schema")?;

        Ok(())
    }

    fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>> {
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")
    }

    fn query(
        conn: &Connection,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DependencyEdge>> {
        let sql = format!("SELECT {} FROM dependencies {} ORDER BY id", COLUMNS, filter);
        let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;

        let rows = stmt
            .query_map(args, EdgeRow::from_row)
            .context("Failed to query dependencies")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read dependency row")?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    fn fetch_one(conn: &Connection, id: &EdgeId) -> Result<Option<DependencyEdge>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM dependencies WHERE id = ?1", COLUMNS),
                params![id.to_string()],
                EdgeRow::from_row,
            )
            .optional()
            .context("Failed to query dependency")?;

        row.map(EdgeRow::into_edge).transpose()
    }
}

/// Raw column values of one `dependencies` row
struct EdgeRow {
    id: String,
    predecessor: String,
    successor: String,
    dep_type: String,
    lag_days: i32,
    created_at: String,
    updated_at: String,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            predecessor: row.get(1)?,
            successor: row.get(2)?,
            dep_type: row.get(3)?,
            lag_days: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_edge(self) -> Result<DependencyEdge> {
        let context = || format!("Corrupt dependency row {}", self.id);
        Ok(DependencyEdge {
            id: self.id.parse().with_context(context)?,
            predecessor: self.predecessor.parse().with_context(context)?,
            successor: self.successor.parse().with_context(context)?,
            dep_type: self
                .dep_type
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(context)?,
            lag_days: self.lag_days,
            created_at: parse_timestamp(&self.created_at).with_context(context)?,
            updated_at: parse_timestamp(&self.updated_at).with_context(context)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

impl EdgeStore for SqliteEdgeStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn list_all(&self) -> StoreResult<Vec<DependencyEdge>> {
        Ok(Self::query(&self.lock(), "", &[])?)
    }

    fn get(&self, id: &EdgeId) -> StoreResult<Option<DependencyEdge>> {
        Ok(Self::fetch_one(&self.lock(), id)?)
    }

    fn find_between(
        &self,
        predecessor: &TaskId,
        successor: &TaskId,
    ) -> StoreResult<Option<DependencyEdge>> {
        let edges = Self::query(
            &self.lock(),
            "WHERE predecessor = ?1 AND successor = ?2",
            &[&predecessor.to_string(), &successor.to_string()],
        )?;
        Ok(edges.into_iter().next())
    }

    fn list_by_task(&self, task: &TaskId) -> StoreResult<TaskEdges> {
        let edges = Self::query(
            &self.lock(),
            "WHERE predecessor = ?1 OR successor = ?1",
            &[&task.to_string()],
        )?;
        Ok(split_by_task(edges, task))
    }

    fn insert(&self, request: NewDependency) -> StoreResult<DependencyEdge> {
        let mut conn = self.lock();
        let tx = Self::write_tx(&mut conn)?;

        let existing = Self::query(&tx, "", &[])?;
        let edge = admit(&existing, request, Utc::now())?;

        tx.execute(
            &format!(
                "INSERT INTO dependencies ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                COLUMNS
            ),
            params![
                edge.id.to_string(),
                edge.predecessor.to_string(),
                edge.successor.to_string(),
                edge.dep_type.as_str(),
                edge.lag_days,
                edge.created_at.to_rfc3339(),
                edge.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert dependency")?;
        tx.commit().context("Failed to commit dependency")?;

        debug!(edge = %edge.id, db = %self.db_path.display(), "sqlite store: inserted edge");
        Ok(edge)
    }

    fn update(&self, id: &EdgeId, change: EdgeChange) -> StoreResult<DependencyEdge> {
        let mut conn = self.lock();
        let tx = Self::write_tx(&mut conn)?;

        let mut edge =
            Self::fetch_one(&tx, id)?.ok_or_else(|| DependencyError::NotFound(id.clone()))?;

        if edge.apply(&change) {
            tx.execute(
                "UPDATE dependencies SET dep_type = ?2, lag_days = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    edge.id.to_string(),
                    edge.dep_type.as_str(),
                    edge.lag_days,
                    edge.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to update dependency")?;
        }
        tx.commit().context("Failed to commit dependency update")?;

        Ok(edge)
    }

    fn delete(&self, id: &EdgeId) -> StoreResult<DependencyEdge> {
        let mut conn = self.lock();
        let tx = Self::write_tx(&mut conn)?;

        let edge =
            Self::fetch_one(&tx, id)?.ok_or_else(|| DependencyError::NotFound(id.clone()))?;

        tx.execute(
            "DELETE FROM dependencies WHERE id = ?1",
            params![id.to_string()],
        )
        .context("Failed to delete dependency")?;
        tx.commit().context("Failed to commit dependency delete")?;

        Ok(edge)
    }

    fn delete_touching(&self, task: &TaskId) -> StoreResult<usize> {
        let removed = self
            .lock()
            .execute(
                "DELETE FROM dependencies WHERE predecessor = ?1 OR successor = ?1",
                params![task.to_string()],
            )
            .context("Failed to delete dependencies")?;
        Ok(removed)
    }
}
