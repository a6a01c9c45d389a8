//! ASIS Storage crate - SQLite persistence for the assistant.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and one
//! repository per entity: conversations (with their messages), tasks, the
//! shopping list, calendar events and the agent action audit log.

pub mod agent_actions;
pub mod calendar;
pub mod conversations;
pub mod db;
pub mod migrations;
pub mod shopping;
pub mod tasks;

pub use agent_actions::{AgentActionFilter, AgentActionRepository};
pub use calendar::{CalendarFilter, CalendarRepository};
pub use conversations::ConversationRepository;
pub use db::Database;
pub use shopping::{ShoppingFilter, ShoppingRepository};
pub use tasks::{TaskFilter, TaskRepository};
