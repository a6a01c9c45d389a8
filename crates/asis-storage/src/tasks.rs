//! Task persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use asis_core::error::AsisError;
use asis_core::types::{Priority, Task};

use crate::db::{col, contains_ci, opt_time_col, storage_err, time_col, uuid_col, Database};

const TASK_COLUMNS: &str = "id, title, description, due_date, reminder_date, completed, \
                            priority, category, created_at, updated_at";

/// Filters for [`TaskRepository::list`]. `None` fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub category: Option<String>,
    /// Inclusive lower bound on `due_date`.
    pub due_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `due_date`.
    pub due_before: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn open() -> Self {
        Self {
            completed: Some(false),
            ..Self::default()
        }
    }
}

/// Repository for tasks.
pub struct TaskRepository {
    db: Arc<Database>,
}

impl TaskRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new task.
    pub fn create(&self, task: &Task) -> Result<(), AsisError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    TASK_COLUMNS
                ),
                rusqlite::params![
                    task.id.to_string(),
                    task.title,
                    task.description,
                    task.due_date.map(|d| d.timestamp()),
                    task.reminder_date.map(|d| d.timestamp()),
                    task.completed as i32,
                    task.priority.level(),
                    task.category,
                    task.created_at.timestamp(),
                    task.updated_at.timestamp(),
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to save task: {}", e)))?;
            Ok(())
        })
    }

    /// Find a task by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<Task>, AsisError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_task(row)),
                )
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// List tasks matching the filter in creation order.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, AsisError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(completed) = filter.completed {
            clauses.push("completed = ?");
            params.push(Box::new(completed as i32));
        }
        if let Some(ref category) = filter.category {
            clauses.push("category = ? COLLATE NOCASE");
            params.push(Box::new(category.clone()));
        }
        if let Some(from) = filter.due_from {
            clauses.push("due_date >= ?");
            params.push(Box::new(from.timestamp()));
        }
        if let Some(before) = filter.due_before {
            clauses.push("due_date < ?");
            params.push(Box::new(before.timestamp()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM tasks {} ORDER BY created_at ASC, rowid ASC",
            TASK_COLUMNS, where_sql
        );

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| AsisError::Storage(format!("Task query prepare: {}", e)))?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| Ok(row_to_task(row)))
                .map_err(|e| AsisError::Storage(format!("Task query: {}", e)))?;

            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row.map_err(storage_err)??);
            }
            Ok(tasks)
        })
    }

    /// First task (in creation order) whose title contains `text`, ignoring case.
    pub fn find_by_title(&self, text: &str, filter: &TaskFilter) -> Result<Option<Task>, AsisError> {
        Ok(self
            .list(filter)?
            .into_iter()
            .find(|t| contains_ci(&t.title, text)))
    }

    /// Persist every mutable field of `task`. Returns the stored version.
    ///
    /// `updated_at` is set to now, clamped to never precede `created_at`.
    pub fn update(&self, task: &Task) -> Result<Option<Task>, AsisError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET title = ?2, description = ?3, due_date = ?4,
                        reminder_date = ?5, completed = ?6, priority = ?7, category = ?8,
                        updated_at = MAX(created_at, ?9)
                 WHERE id = ?1",
                rusqlite::params![
                    task.id.to_string(),
                    task.title,
                    task.description,
                    task.due_date.map(|d| d.timestamp()),
                    task.reminder_date.map(|d| d.timestamp()),
                    task.completed as i32,
                    task.priority.level(),
                    task.category,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to update task: {}", e)))
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(task.id)
    }

    /// Set the completion flag.
    pub fn set_completed(&self, id: Uuid, completed: bool) -> Result<Option<Task>, AsisError> {
        match self.get(id)? {
            Some(mut task) => {
                task.completed = completed;
                self.update(&task)
            }
            None => Ok(None),
        }
    }

    /// Delete a task by ID.
    pub fn delete(&self, id: Uuid) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id.to_string()])
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task, AsisError> {
    let completed: i32 = col(row, 5)?;
    let priority: i64 = col(row, 6)?;
    Ok(Task {
        id: uuid_col(row, 0)?,
        title: col(row, 1)?,
        description: col(row, 2)?,
        due_date: opt_time_col(row, 3)?,
        reminder_date: opt_time_col(row, 4)?,
        completed: completed != 0,
        priority: Priority::from_level(priority),
        category: col(row, 7)?,
        created_at: time_col(row, 8)?,
        updated_at: time_col(row, 9)?,
    })
}
