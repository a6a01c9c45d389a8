//! Audit log of actions with external effects.
//!
//! Rows are created as `pending` and finalised exactly once as `completed`
//! or `failed`; a finalised row is never modified again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use asis_core::error::AsisError;
use asis_core::types::{ActionStatus, AgentAction};

use crate::db::{col, opt_time_col, sql_limit, storage_err, time_col, uuid_col, Database};

const ACTION_COLUMNS: &str =
    "id, action_type, target, content, status, created_at, executed_at, error";

/// Filters for [`AgentActionRepository::list`].
#[derive(Debug, Clone)]
pub struct AgentActionFilter {
    pub action_type: Option<String>,
    pub status: Option<ActionStatus>,
    pub limit: u64,
}

impl Default for AgentActionFilter {
    fn default() -> Self {
        Self {
            action_type: None,
            status: None,
            limit: 50,
        }
    }
}

pub struct AgentActionRepository {
    db: Arc<Database>,
}

impl AgentActionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, action: &AgentAction) -> Result<(), AsisError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO agent_actions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    ACTION_COLUMNS
                ),
                rusqlite::params![
                    action.id.to_string(),
                    action.action_type,
                    action.target,
                    action.content,
                    action.status.as_str(),
                    action.created_at.timestamp(),
                    action.executed_at.map(|t| t.timestamp()),
                    action.error,
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to save agent action: {}", e)))?;
            Ok(())
        })
    }

    pub fn get(&self, id: Uuid) -> Result<Option<AgentAction>, AsisError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {} FROM agent_actions WHERE id = ?1", ACTION_COLUMNS),
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_action(row)),
                )
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// Finalise a pending action. Returns false if the row is missing or
    /// was already finalised.
    pub fn finish(
        &self,
        id: Uuid,
        status: ActionStatus,
        error: Option<&str>,
        executed_at: DateTime<Utc>,
    ) -> Result<bool, AsisError> {
        if status == ActionStatus::Pending {
            return Err(AsisError::Validation(
                "an action can only be finished as completed or failed".to_string(),
            ));
        }
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE agent_actions SET status = ?2, error = ?3, executed_at = ?4
                     WHERE id = ?1 AND status = 'pending'",
                    rusqlite::params![
                        id.to_string(),
                        status.as_str(),
                        error,
                        executed_at.timestamp()
                    ],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    /// Most recent actions first.
    pub fn list(&self, filter: &AgentActionFilter) -> Result<Vec<AgentAction>, AsisError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ref action_type) = filter.action_type {
            clauses.push("action_type = ?");
            params.push(Box::new(action_type.clone()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        params.push(Box::new(sql_limit(filter.limit)));

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM agent_actions {} ORDER BY created_at DESC, rowid DESC LIMIT ?",
            ACTION_COLUMNS, where_sql
        );

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| Ok(row_to_action(row)))
                .map_err(storage_err)?;

            let mut actions = Vec::new();
            for row in rows {
                actions.push(row.map_err(storage_err)??);
            }
            Ok(actions)
        })
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> Result<AgentAction, AsisError> {
    let status: String = col(row, 4)?;
    Ok(AgentAction {
        id: uuid_col(row, 0)?,
        action_type: col(row, 1)?,
        target: col(row, 2)?,
        content: col(row, 3)?,
        status: status.parse()?,
        created_at: time_col(row, 5)?,
        executed_at: opt_time_col(row, 6)?,
        error: col(row, 7)?,
    })
}
