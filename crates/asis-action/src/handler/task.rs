//! Task intents: add, list, complete, delete, update.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use asis_core::clock::Clock;
use asis_core::types::{Priority, Task};
use asis_storage::{Database, TaskFilter, TaskRepository};

use crate::date_parser::DateParser;
use crate::error::ActionError;
use crate::handler::join_names;
use crate::payload::{self, lenient_bool, lenient_priority, lenient_string, Target};
use crate::types::ActionOutcome;

const DEFAULT_TITLE: &str = "Task fără titlu";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskFields {
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    due_date: Option<String>,
    #[serde(deserialize_with = "lenient_priority")]
    priority: Option<Priority>,
    #[serde(deserialize_with = "lenient_string")]
    category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListFields {
    #[serde(deserialize_with = "lenient_bool")]
    completed: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    category: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    today: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LookupFields {
    #[serde(deserialize_with = "lenient_string")]
    task_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    task_title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateFields {
    #[serde(deserialize_with = "lenient_string")]
    task_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    task_title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    new_title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    due_date: Option<String>,
    #[serde(deserialize_with = "lenient_priority")]
    priority: Option<Priority>,
    #[serde(deserialize_with = "lenient_string")]
    category: Option<String>,
}

pub struct TaskHandler {
    repo: TaskRepository,
    dates: DateParser,
    clock: Arc<dyn Clock>,
}

impl TaskHandler {
    pub fn new(db: Arc<Database>, dates: DateParser, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: TaskRepository::new(db),
            dates,
            clock,
        }
    }

    /// `add_task`: one task, or several in list form.
    ///
    /// List entries are created one by one; a failure stops the loop and
    /// earlier entries stay stored.
    pub fn add(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let entries = payload::items(data, "tasks", "title");
        if entries.is_empty() {
            return Err(ActionError::MissingField("titlul task-ului"));
        }

        let mut created = Vec::with_capacity(entries.len());
        for entry in &entries {
            created.push(self.create_one(entry)?);
        }

        if let [task] = created.as_slice() {
            return Ok(ActionOutcome::ok(format!("Task-ul '{}' a fost adăugat.", task.title))
                .with_data(json!({ "task": task, "count": 1 })));
        }

        let names = join_names(created.iter().map(|t| t.title.as_str()));
        Ok(
            ActionOutcome::ok(format!("Am adăugat {} task-uri: {}.", created.len(), names))
                .with_data(json!({ "tasks": created, "count": created.len() })),
        )
    }

    fn create_one(&self, entry: &Value) -> Result<Task, ActionError> {
        let fields: TaskFields = payload::parse(entry)?;
        let now = self.clock.now();

        let mut task = Task::new(fields.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()));
        task.created_at = now;
        task.updated_at = now;
        task.description = fields.description;
        task.priority = fields.priority.unwrap_or_default();
        task.category = fields.category;
        if let Some(raw) = fields.due_date {
            match self.dates.parse(&raw, now) {
                Some(due) => task.due_date = Some(due),
                None => warn!(value = %raw, "Ignoring unparseable due date"),
            }
        }

        self.repo.create(&task)?;
        info!(task_id = %task.id, title = %task.title, "Task created");
        Ok(task)
    }

    /// `list_tasks`: open tasks unless `completed` is set.
    pub fn list(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: ListFields = payload::parse(data)?;
        let mut filter = TaskFilter {
            completed: Some(fields.completed.unwrap_or(false)),
            category: fields.category,
            ..TaskFilter::default()
        };
        if fields.today == Some(true) {
            if let Some((start, end)) = self.dates.today_bounds(self.clock.now()) {
                filter.due_from = Some(start);
                filter.due_before = Some(end);
            }
        }

        let tasks = self.repo.list(&filter)?;
        let message = if tasks.is_empty() {
            "Nu ai niciun task activ.".to_string()
        } else {
            format!("Ai {} task-uri.", tasks.len())
        };
        Ok(ActionOutcome::ok(message).with_data(json!({ "tasks": tasks, "count": tasks.len() })))
    }

    /// `complete_task`.
    pub fn complete(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: LookupFields = payload::parse(data)?;
        let target = lookup_target(
            fields.task_id.as_deref(),
            fields.task_title.as_deref().or(fields.title.as_deref()),
        )?;
        let task = self.find(&target, true)?;
        let task = self
            .repo
            .set_completed(task.id, true)?
            .ok_or(ActionError::TaskNotFound)?;

        info!(task_id = %task.id, "Task completed");
        Ok(
            ActionOutcome::ok(format!("Task-ul '{}' a fost marcat ca finalizat.", task.title))
                .with_data(json!({ "task": task })),
        )
    }

    /// `delete_task`.
    pub fn delete(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: LookupFields = payload::parse(data)?;
        let target = lookup_target(
            fields.task_id.as_deref(),
            fields.task_title.as_deref().or(fields.title.as_deref()),
        )?;
        let task = self.find(&target, false)?;
        if !self.repo.delete(task.id)? {
            return Err(ActionError::TaskNotFound);
        }

        info!(task_id = %task.id, "Task deleted");
        Ok(ActionOutcome::ok(format!("Task-ul '{}' a fost șters.", task.title))
            .with_data(json!({ "task_id": task.id })))
    }

    /// `update_task`: edit any subset of fields.
    ///
    /// The task is looked up by `task_id`/`task_title`. A bare `title` is the
    /// lookup text when `new_title` carries the rename, otherwise it is the
    /// new title.
    pub fn update(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: UpdateFields = payload::parse(data)?;
        let explicit_lookup = fields.task_id.is_some() || fields.task_title.is_some();

        let (lookup_text, new_title) = if explicit_lookup {
            (fields.task_title.as_deref(), fields.new_title.or(fields.title.clone()))
        } else {
            (fields.title.as_deref(), fields.new_title)
        };
        let target = lookup_target(fields.task_id.as_deref(), lookup_text)?;
        let mut task = self.find(&target, true)?;

        if let Some(title) = new_title {
            task.title = title;
        }
        if let Some(description) = fields.description {
            task.description = Some(description);
        }
        if let Some(priority) = fields.priority {
            task.priority = priority;
        }
        if let Some(category) = fields.category {
            task.category = Some(category);
        }
        if let Some(raw) = fields.due_date {
            let due = self
                .dates
                .parse(&raw, self.clock.now())
                .ok_or(ActionError::UnparseableDate(raw))?;
            task.due_date = Some(due);
        }

        let task = self.repo.update(&task)?.ok_or(ActionError::TaskNotFound)?;
        info!(task_id = %task.id, "Task updated");
        Ok(ActionOutcome::ok(format!("Task-ul '{}' a fost actualizat.", task.title))
            .with_data(json!({ "task": task })))
    }

    /// Resolve a target to a stored task. Text matches prefer open tasks
    /// when `prefer_open` is set.
    pub(crate) fn find(&self, target: &Target, prefer_open: bool) -> Result<Task, ActionError> {
        match target {
            Target::Id(id) => self.repo.get(*id)?.ok_or(ActionError::TaskNotFound),
            Target::Text(text) => {
                if prefer_open {
                    if let Some(task) = self.repo.find_by_title(text, &TaskFilter::open())? {
                        return Ok(task);
                    }
                }
                self.repo
                    .find_by_title(text, &TaskFilter::default())?
                    .ok_or(ActionError::TaskNotFound)
            }
        }
    }

    pub(crate) fn repo(&self) -> &TaskRepository {
        &self.repo
    }
}

fn lookup_target(id: Option<&str>, text: Option<&str>) -> Result<Target, ActionError> {
    Target::resolve(id, text).ok_or(ActionError::MissingField("titlul task-ului"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing;
    use chrono::{TimeZone, Utc};

    fn handler() -> TaskHandler {
        let db = Arc::new(Database::in_memory().unwrap());
        TaskHandler::new(db, DateParser::utc(), testing::clock())
    }

    fn titles(outcome: &ActionOutcome) -> Vec<String> {
        outcome.data.as_ref().unwrap()["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_add_then_list_open() {
        let handler = handler();
        let outcome = handler.add(&json!({"title": "X"})).unwrap();
        assert_eq!(outcome.message.as_deref(), Some("Task-ul 'X' a fost adăugat."));

        let listed = handler.list(&json!({"completed": false})).unwrap();
        assert_eq!(titles(&listed), vec!["X"]);
        assert_eq!(listed.data.unwrap()["count"], 1);
    }

    #[test]
    fn test_add_list_form() {
        let handler = handler();
        let outcome = handler
            .add(&json!({"tasks": [{"title": "Sună la bancă"}, {"title": "Plătește facturile", "priority": 3}]}))
            .unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Am adăugat 2 task-uri: Sună la bancă, Plătește facturile.")
        );
        assert_eq!(outcome.data.unwrap()["count"], 2);

        let bare = handler.add(&json!([{"title": "A"}, {"title": "B"}])).unwrap();
        assert_eq!(bare.data.unwrap()["count"], 2);
        assert_eq!(handler.repo().list(&TaskFilter::default()).unwrap().len(), 4);
    }

    #[test]
    fn test_add_defaults_and_due_date() {
        let handler = handler();
        let outcome = handler
            .add(&json!({"due_date": "mâine", "priority": "mare"}))
            .unwrap();
        let task = &outcome.data.unwrap()["task"];
        assert_eq!(task["title"], DEFAULT_TITLE);
        assert_eq!(task["priority"], "high");

        let stored = handler.repo().list(&TaskFilter::default()).unwrap();
        assert_eq!(
            stored[0].due_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_due_date_is_dropped() {
        let handler = handler();
        handler
            .add(&json!({"title": "Curățenie", "due_date": "cândva"}))
            .unwrap();
        let stored = handler.repo().list(&TaskFilter::default()).unwrap();
        assert!(stored[0].due_date.is_none());
    }

    #[test]
    fn test_complete_missing_task_creates_nothing() {
        let handler = handler();
        let err = handler.complete(&json!({"task_title": "doctor"})).unwrap_err();
        assert!(matches!(err, ActionError::TaskNotFound));
        assert!(handler.repo().list(&TaskFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_complete_by_title_substring() {
        let handler = handler();
        handler.add(&json!({"title": "Programare la Doctor"})).unwrap();
        let outcome = handler.complete(&json!({"task_title": "doctor"})).unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Task-ul 'Programare la Doctor' a fost marcat ca finalizat.")
        );
        assert!(handler.list(&json!({})).unwrap().data.unwrap()["tasks"]
            .as_array()
            .unwrap()
            .is_empty());
        assert_eq!(titles(&handler.list(&json!({"completed": true})).unwrap()).len(), 1);
    }

    #[test]
    fn test_complete_prefers_open_task() {
        let handler = handler();
        handler.add(&json!({"title": "Raport vechi"})).unwrap();
        handler.complete(&json!({"task_title": "raport"})).unwrap();
        handler.add(&json!({"title": "Raport nou"})).unwrap();

        let outcome = handler.complete(&json!({"task_title": "raport"})).unwrap();
        assert!(outcome.message.unwrap().contains("Raport nou"));
    }

    #[test]
    fn test_delete_by_id() {
        let handler = handler();
        let outcome = handler.add(&json!({"title": "Temporar"})).unwrap();
        let id = outcome.data.unwrap()["task"]["id"].as_str().unwrap().to_string();

        let deleted = handler.delete(&json!({"task_id": id})).unwrap();
        assert_eq!(deleted.message.as_deref(), Some("Task-ul 'Temporar' a fost șters."));
        assert!(matches!(
            handler.delete(&json!({"task_id": id})),
            Err(ActionError::TaskNotFound)
        ));
    }

    #[test]
    fn test_lookup_without_target_is_missing_field() {
        let handler = handler();
        assert!(matches!(
            handler.delete(&json!({})),
            Err(ActionError::MissingField(_))
        ));
    }

    #[test]
    fn test_update_renames_and_reprioritises() {
        let handler = handler();
        handler.add(&json!({"title": "Cumpără flori"})).unwrap();

        let outcome = handler
            .update(&json!({"task_title": "flori", "new_title": "Cumpără lalele", "priority": 2}))
            .unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Task-ul 'Cumpără lalele' a fost actualizat.")
        );
        let stored = handler.repo().list(&TaskFilter::default()).unwrap();
        assert_eq!(stored[0].priority, Priority::Medium);
        assert!(stored[0].updated_at >= stored[0].created_at);
    }

    #[test]
    fn test_update_with_bad_date_fails() {
        let handler = handler();
        handler.add(&json!({"title": "Raport"})).unwrap();
        let err = handler
            .update(&json!({"title": "Raport", "due_date": "când pot"}))
            .unwrap_err();
        assert!(matches!(err, ActionError::UnparseableDate(_)));
    }

    #[test]
    fn test_list_today_filters_by_due_date() {
        let handler = handler();
        handler.add(&json!({"title": "Azi", "due_date": "azi la 15:00"})).unwrap();
        handler.add(&json!({"title": "Mâine", "due_date": "mâine"})).unwrap();
        handler.add(&json!({"title": "Fără dată"})).unwrap();

        let outcome = handler.list(&json!({"today": true})).unwrap();
        assert_eq!(titles(&outcome), vec!["Azi"]);
    }
}
