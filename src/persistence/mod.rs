//! SQLite persistence for planned rebalance tasks.
//!
//! Every computed plan is stored as a "part rebalance task". The executor
//! advances the task through its lifecycle; the run loop reads it back to
//! avoid planning on top of a rebalance that is still in flight.

use crate::allocation::RebalancePlan;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Lifecycle of a part rebalance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Init,
    Cross,
    TransferIn,
    Invest,
    Success,
    Failed,
}

impl TaskState {
    fn code(self) -> i64 {
        match self {
            TaskState::Init => 0,
            TaskState::Cross => 1,
            TaskState::TransferIn => 2,
            TaskState::Invest => 3,
            TaskState::Success => 4,
            TaskState::Failed => 5,
        }
    }

    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TaskState::Init),
            1 => Some(TaskState::Cross),
            2 => Some(TaskState::TransferIn),
            3 => Some(TaskState::Invest),
            4 => Some(TaskState::Success),
            5 => Some(TaskState::Failed),
            _ => None,
        }
    }

}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Init => "init",
            TaskState::Cross => "cross",
            TaskState::TransferIn => "transfer_in",
            TaskState::Invest => "invest",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A persisted rebalance task.
#[derive(Debug, Clone)]
pub struct PartRebalanceTask {
    pub id: i64,
    pub state: TaskState,
    pub message: String,
    pub params: RebalancePlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed task store.
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    /// Open the store, creating the schema if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Task store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS part_rebalance_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                state INTEGER NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                params TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_part_rebalance_state ON part_rebalance_tasks(state);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Persist a plan as a new task in the `Init` state. Returns the task id.
    pub fn create_part_rebalance_task(&self, plan: &RebalancePlan) -> Result<i64> {
        let params_json = serde_json::to_string(plan).context("Failed to serialize plan")?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            r#"
            INSERT INTO part_rebalance_tasks (state, message, params, created_at, updated_at)
            VALUES (?1, '', ?2, ?3, ?3)
            "#,
            params![TaskState::Init.code(), params_json, now],
        )?;

        let id = self.conn.last_insert_rowid();
        info!(
            task_id = id,
            transfers = plan.cross_balances.len(),
            investments = plan.investment_count(),
            "Part rebalance task created"
        );
        Ok(id)
    }

    /// Tasks not yet in a final state, oldest first.
    pub fn open_tasks(&self) -> Result<Vec<PartRebalanceTask>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, state, message, params, created_at, updated_at
            FROM part_rebalance_tasks
            WHERE state NOT IN (?1, ?2)
            ORDER BY id ASC
            "#,
        )?;

        let tasks = stmt
            .query_map(
                params![TaskState::Success.code(), TaskState::Failed.code()],
                read_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tasks.into_iter().map(RawTask::into_task).collect()
    }

    /// Most recent tasks, newest first.
    pub fn recent_tasks(&self, limit: usize) -> Result<Vec<PartRebalanceTask>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, state, message, params, created_at, updated_at
            FROM part_rebalance_tasks
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let tasks = stmt
            .query_map([limit as i64], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tasks.into_iter().map(RawTask::into_task).collect()
    }

    pub fn get_task(&self, id: i64) -> Result<Option<PartRebalanceTask>> {
        let raw = self
            .conn
            .query_row(
                r#"
                SELECT id, state, message, params, created_at, updated_at
                FROM part_rebalance_tasks WHERE id = ?1
                "#,
                [id],
                read_row,
            )
            .optional()?;

        raw.map(RawTask::into_task).transpose()
    }

    /// Move a task to `state`, recording `message`.
    pub fn update_state(&self, id: i64, state: TaskState, message: &str) -> Result<()> {
        let updated = self.conn.execute(
            r#"
            UPDATE part_rebalance_tasks
            SET state = ?1, message = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
            params![state.code(), message, Utc::now().to_rfc3339(), id],
        )?;

        anyhow::ensure!(updated == 1, "no part rebalance task with id {}", id);

        if state == TaskState::Failed {
            warn!(task_id = id, reason = message, "Part rebalance task failed");
        } else {
            debug!(task_id = id, %state, "Part rebalance task updated");
        }
        Ok(())
    }
}

struct RawTask {
    id: i64,
    state: i64,
    message: String,
    params: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get(0)?,
        state: row.get(1)?,
        message: row.get(2)?,
        params: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl RawTask {
    fn into_task(self) -> Result<PartRebalanceTask> {
        let state = TaskState::from_code(self.state)
            .with_context(|| format!("Unknown state {} on task {}", self.state, self.id))?;
        let params = serde_json::from_str(&self.params)
            .with_context(|| format!("Failed to parse params of task {}", self.id))?;

        Ok(PartRebalanceTask {
            id: self.id,
            state,
            message: self.message,
            params,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp {}", value))?
        .with_timezone(&Utc))
}
