//! ASIS API crate - axum REST backend.
//!
//! Exposes the assistant over HTTP: the chat pipeline, stored
//! conversations, tasks, the shopping list, calendar events, outward agent
//! actions and a server-sent event stream of fired notifications.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
