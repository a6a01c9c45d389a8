//! Conversation and message persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use asis_core::error::AsisError;
use asis_core::types::{Conversation, Message, Role};

use crate::db::{col, sql_limit, storage_err, time_col, uuid_col, Database};

/// Repository for conversations and their ordered messages.
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new conversation.
    pub fn create(&self, conversation: &Conversation) -> Result<(), AsisError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    conversation.id.to_string(),
                    conversation.title,
                    conversation.created_at.timestamp(),
                    conversation.updated_at.timestamp(),
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to save conversation: {}", e)))?;
            Ok(())
        })
    }

    /// Find a conversation by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<Conversation>, AsisError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_conversation(row)),
                )
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// List conversations, most recently active first.
    pub fn list(&self, limit: u64) -> Result<Vec<Conversation>, AsisError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, created_at, updated_at FROM conversations
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT ?1",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(rusqlite::params![sql_limit(limit)], |row| {
                    Ok(row_to_conversation(row))
                })
                .map_err(storage_err)?;

            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row.map_err(storage_err)??);
            }
            Ok(conversations)
        })
    }

    /// Bump `updated_at`, never letting it precede `created_at`.
    pub fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE conversations SET updated_at = MAX(created_at, ?2) WHERE id = ?1",
                    rusqlite::params![id.to_string(), at.timestamp()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    /// Rename a conversation.
    pub fn rename(&self, id: Uuid, title: &str) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE conversations
                     SET title = ?2, updated_at = MAX(created_at, ?3)
                     WHERE id = ?1",
                    rusqlite::params![id.to_string(), title, Utc::now().timestamp()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    /// Delete a conversation; its messages go with it.
    pub fn delete(&self, id: Uuid) -> Result<bool, AsisError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM conversations WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    /// Append a message and bump the parent's `updated_at`.
    pub fn add_message(&self, message: &Message) -> Result<(), AsisError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, audio_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.role.as_str(),
                    message.content,
                    message.audio_path,
                    message.created_at.timestamp(),
                ],
            )
            .map_err(|e| AsisError::Storage(format!("Failed to save message: {}", e)))?;

            conn.execute(
                "UPDATE conversations SET updated_at = MAX(created_at, ?2) WHERE id = ?1",
                rusqlite::params![
                    message.conversation_id.to_string(),
                    message.created_at.timestamp()
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
    }

    /// All messages of a conversation in insertion order.
    pub fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, AsisError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, role, content, audio_path, created_at
                     FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at ASC, rowid ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(storage_err)?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(storage_err)??);
            }
            Ok(messages)
        })
    }

    /// The last `limit` messages of a conversation, oldest first.
    pub fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, AsisError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, role, content, audio_path, created_at
                     FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![conversation_id.to_string(), limit],
                    |row| Ok(row_to_message(row)),
                )
                .map_err(storage_err)?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(storage_err)??);
            }
            messages.reverse();
            Ok(messages)
        })
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, AsisError> {
    Ok(Conversation {
        id: uuid_col(row, 0)?,
        title: col(row, 1)?,
        created_at: time_col(row, 2)?,
        updated_at: time_col(row, 3)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, AsisError> {
    let role: String = col(row, 2)?;
    Ok(Message {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        role: role.parse::<Role>()?,
        content: col(row, 3)?,
        audio_path: col(row, 4)?,
        created_at: time_col(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_repo() -> ConversationRepository {
        ConversationRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_create_and_get() {
        let repo = make_repo();
        let conv = Conversation::new("Cumpărături");
        repo.create(&conv).unwrap();

        let loaded = repo.get(conv.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Cumpărături");
        assert_eq!(loaded.id, conv.id);
        assert!(repo.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_messages_are_ordered() {
        let repo = make_repo();
        let conv = Conversation::new("Test");
        repo.create(&conv).unwrap();

        for (i, role) in [Role::User, Role::Assistant, Role::User].into_iter().enumerate() {
            repo.add_message(&Message::new(conv.id, role, format!("mesaj {}", i)))
                .unwrap();
        }

        let messages = repo.messages(conv.id).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["mesaj 0", "mesaj 1", "mesaj 2"]);
        assert_eq!(messages[1].role, Role::Assistant);

        let recent = repo.recent_messages(conv.id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "mesaj 1");
        assert_eq!(recent[1].content, "mesaj 2");

        assert_eq!(repo.recent_messages(conv.id, 10).unwrap().len(), 3);
        assert!(repo.recent_messages(conv.id, 0).unwrap().is_empty());
    }

    #[test]
    fn test_list_honours_limit() {
        let repo = make_repo();
        repo.create(&Conversation::new("a")).unwrap();
        repo.create(&Conversation::new("b")).unwrap();
        assert_eq!(repo.list(u64::MAX).unwrap().len(), 2);
        assert_eq!(repo.list(1).unwrap().len(), 1);
    }

    #[test]
    fn test_message_for_missing_conversation_fails() {
        let repo = make_repo();
        let orphan = Message::new(Uuid::new_v4(), Role::User, "pierdut");
        assert!(repo.add_message(&orphan).is_err());
    }

    #[test]
    fn test_delete_cascades_messages() {
        let repo = make_repo();
        let conv = Conversation::new("De șters");
        repo.create(&conv).unwrap();
        repo.add_message(&Message::new(conv.id, Role::User, "salut"))
            .unwrap();

        assert!(repo.delete(conv.id).unwrap());
        assert!(repo.messages(conv.id).unwrap().is_empty());
        assert!(!repo.delete(conv.id).unwrap());
    }

    #[test]
    fn test_touch_never_precedes_created_at() {
        let repo = make_repo();
        let conv = Conversation::new("Ceas");
        repo.create(&conv).unwrap();

        repo.touch(conv.id, conv.created_at - Duration::days(3))
            .unwrap();
        let loaded = repo.get(conv.id).unwrap().unwrap();
        assert!(loaded.updated_at >= loaded.created_at);

        let later = conv.created_at + Duration::hours(1);
        repo.touch(conv.id, later).unwrap();
        let loaded = repo.get(conv.id).unwrap().unwrap();
        assert_eq!(loaded.updated_at.timestamp(), later.timestamp());
    }

    #[test]
    fn test_list_orders_by_activity() {
        let repo = make_repo();
        let older = Conversation::new("vechi");
        let newer = Conversation::new("nou");
        repo.create(&older).unwrap();
        repo.create(&newer).unwrap();
        repo.touch(older.id, Utc::now() + Duration::minutes(5))
            .unwrap();

        let list = repo.list(10).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "vechi");
    }

    #[test]
    fn test_rename() {
        let repo = make_repo();
        let conv = Conversation::new("a");
        repo.create(&conv).unwrap();
        assert!(repo.rename(conv.id, "b").unwrap());
        assert_eq!(repo.get(conv.id).unwrap().unwrap().title, "b");
    }
}
