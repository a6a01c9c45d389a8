//! ASIS Action crate - turns a recognised intent into an effect.
//!
//! The [`ActionDispatcher`] maps each [`Intent`] to exactly one handler.
//! Handlers either perform a CRUD operation on the local store or call an
//! external collaborator (email, web search, device calendar, local
//! notifications) through the traits in [`services`]. Every call returns a
//! uniform [`ActionOutcome`]; nothing here panics or propagates an error to
//! the conversation layer.

pub mod date_parser;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod intent;
pub mod payload;
pub mod services;
pub mod templates;
pub mod types;

pub use date_parser::DateParser;
pub use dispatcher::{ActionDispatcher, ActionSettings};
pub use error::{ActionError, ServiceError};
pub use intent::Intent;
pub use services::{
    validate_email, CalendarEntry, DeviceCalendar, EmailSender, Notification,
    NotificationScheduler, OutgoingEmail, SearchResponse, SearchResult, Services, WebSearch,
};
pub use types::{ActionOutcome, EffectStatus, SideEffect, SideEffectReport};
