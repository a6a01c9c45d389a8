//! Error types for the action engine.
//!
//! `ActionError` renders as the Romanian sentence shown (and spoken) to the
//! user; the dispatcher turns it into a failed `ActionOutcome`.

use asis_core::error::AsisError;

/// Errors from action handler execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Acțiune necunoscută: {0}")]
    UnknownIntent(String),
    #[error("Date invalide pentru acțiune: {0}")]
    InvalidPayload(String),
    #[error("Lipsește informația necesară: {0}")]
    MissingField(&'static str),

    #[error("Task-ul nu a fost găsit.")]
    TaskNotFound,
    #[error("Produsul nu a fost găsit pe listă.")]
    ItemNotFound,
    #[error("Evenimentul nu a fost găsit.")]
    EventNotFound,

    #[error("Adresa de email nu a fost specificată.")]
    MissingRecipient,
    #[error("Adresa de email nu este validă: {0}")]
    InvalidEmail(String),
    #[error("Nu ai specificat ce să caut.")]
    MissingQuery,

    #[error("Nu am putut determina data și ora întâlnirii.")]
    MissingDate,
    #[error("Nu am putut înțelege data: {0}")]
    UnparseableDate(String),
    #[error("Data întâlnirii trebuie să fie în viitor.")]
    DateInPast,
    #[error("Momentul reamintirii trebuie să fie în viitor.")]
    ReminderInPast,

    #[error("Nu am putut trimite emailul: {0}")]
    EmailFailed(String),
    #[error("Căutarea pe internet a eșuat: {0}")]
    SearchFailed(String),
    #[error("Nu am putut programa notificarea: {0}")]
    NotificationFailed(String),

    #[error("Eroare la salvarea datelor: {0}")]
    Storage(#[from] AsisError),
}

/// Errors reported by external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Network(err.to_string())
    }
}
