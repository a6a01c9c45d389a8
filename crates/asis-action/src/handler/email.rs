//! `send_email`: validate, send, audit.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ActionError;
use crate::handler::AuditLog;
use crate::payload::{self, lenient_bool, lenient_string};
use crate::services::{validate_email, EmailSender, OutgoingEmail};
use crate::types::ActionOutcome;

const DEFAULT_SUBJECT: &str = "Mesaj de la Asistentul AI";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmailFields {
    #[serde(deserialize_with = "lenient_string")]
    to: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    subject: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    body: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    is_html: Option<bool>,
}

pub struct EmailHandler {
    sender: Arc<dyn EmailSender>,
    audit: Arc<AuditLog>,
}

impl EmailHandler {
    pub fn new(sender: Arc<dyn EmailSender>, audit: Arc<AuditLog>) -> Self {
        Self { sender, audit }
    }

    pub async fn send(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: EmailFields = payload::parse(data)?;
        let to = fields.to.ok_or(ActionError::MissingRecipient)?;
        if !validate_email(&to) {
            return Err(ActionError::InvalidEmail(to));
        }

        let email = OutgoingEmail {
            to: to.clone(),
            subject: fields.subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            body: fields.body.unwrap_or_default(),
            is_html: fields.is_html.unwrap_or(false),
        };

        let action_id = self.audit.begin(
            "email",
            Some(&to),
            Some(format!("Subject: {}\n\n{}", email.subject, email.body)),
        );

        match self.sender.send_email(&email).await {
            Ok(()) => {
                self.audit.finish(action_id, None);
                info!(to = %to, "Email action completed");
                Ok(ActionOutcome::ok(format!("Emailul a fost trimis către {}.", to))
                    .with_data(json!({ "to": to, "subject": email.subject })))
            }
            Err(e) => {
                let reason = e.to_string();
                self.audit.finish(action_id, Some(&reason));
                warn!(to = %to, error = %reason, "Email action failed");
                Err(ActionError::EmailFailed(reason))
            }
        }
    }
}
