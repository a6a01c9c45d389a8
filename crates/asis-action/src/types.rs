//! Result types returned by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform result of any action: `{success, message?, error?, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            data: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// One best-effort step that follows an authoritative write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    InvitationEmail,
    ConfirmationEmail,
    EarlyNotification,
    StartNotification,
    DeviceCalendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    Done,
    Skipped,
    Failed,
}

/// What happened to a single side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectReport {
    pub effect: SideEffect,
    pub status: EffectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SideEffectReport {
    pub fn done(effect: SideEffect) -> Self {
        Self {
            effect,
            status: EffectStatus::Done,
            detail: None,
        }
    }

    pub fn skipped(effect: SideEffect, reason: impl Into<String>) -> Self {
        Self {
            effect,
            status: EffectStatus::Skipped,
            detail: Some(reason.into()),
        }
    }

    pub fn failed(effect: SideEffect, error: impl Into<String>) -> Self {
        Self {
            effect,
            status: EffectStatus::Failed,
            detail: Some(error.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == EffectStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_outcome_omits_error() {
        let outcome = ActionOutcome::ok("Gata.").with_data(json!({"count": 2}));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "Gata.");
        assert_eq!(value["data"]["count"], 2);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_outcome() {
        let outcome = ActionOutcome::failure("Task-ul nu a fost găsit.");
        assert!(!outcome.success);
        assert!(outcome.message.is_none());
        assert_eq!(outcome.error.as_deref(), Some("Task-ul nu a fost găsit."));
    }

    #[test]
    fn test_side_effect_report_serialization() {
        let report = SideEffectReport::failed(SideEffect::InvitationEmail, "smtp down");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["effect"], "invitation_email");
        assert_eq!(value["status"], "failed");
        assert!(!report.is_done());
    }
}
