use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AsisError, Result};

/// Top-level configuration for the ASIS assistant.
///
/// Loaded from `~/.asis/config.toml` by default. Secrets (API key, SMTP
/// credentials) are usually supplied through environment variables and
/// merged with [`AsisConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsisConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl AsisConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AsisConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AsisError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Merge secrets and endpoints from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Merge overrides from an arbitrary key lookup.
    ///
    /// Empty values are ignored so that an exported-but-blank variable does
    /// not wipe a value from the file.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(host) = get("SMTP_HOST") {
            self.email.smtp_host = host;
        }
        if let Some(port) = get("SMTP_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.email.smtp_port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid SMTP_PORT"),
            }
        }
        if let Some(user) = get("SMTP_USER") {
            self.email.smtp_user = user;
        }
        if let Some(password) = get("SMTP_PASSWORD") {
            self.email.smtp_password = password;
        }
        if let Some(address) = get("ASIS_SELF_EMAIL") {
            self.email.self_address = address;
        }
    }

    /// Data directory with a leading `~` expanded to the home directory.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// The user's local UTC offset used to interpret naive dates.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.general.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Expand `~/` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and the calendar file.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Offset of the user's wall clock from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.asis/data".to_string(),
            log_level: "info".to_string(),
            utc_offset_minutes: 120,
        }
    }
}

/// REST backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Maximum number of turns kept in the rolling history.
    pub history_capacity: usize,
    /// Number of most recent turns forwarded to the LLM.
    pub context_turns: usize,
    /// Upper bound on a single LLM round trip, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum accepted user message length in characters.
    pub max_message_length: usize,
    /// BCP 47 language tag used by the speech collaborators.
    pub language: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_capacity: 20,
            context_turns: 10,
            request_timeout_secs: 30,
            max_message_length: 2000,
            language: "ro-RO".to_string(),
        }
    }
}

/// Hosted LLM (Gemini) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
            timeout_secs: 30,
        }
    }
}

/// Web search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    /// DuckDuckGo region code.
    pub region: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            region: "ro-ro".to_string(),
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

/// Outgoing email settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    /// Address that receives confirmation copies of scheduled meetings.
    pub self_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_password: String::new(),
            self_address: String::new(),
        }
    }
}

impl EmailConfig {
    /// Whether credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.smtp_user.is_empty() && !self.smtp_password.is_empty()
    }

    /// Self address, falling back to the SMTP user.
    pub fn confirmation_address(&self) -> Option<&str> {
        if !self.self_address.is_empty() {
            Some(&self.self_address)
        } else if !self.smtp_user.is_empty() {
            Some(&self.smtp_user)
        } else {
            None
        }
    }
}

/// Local notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// How long before a meeting the early reminder fires.
    pub lead_minutes: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: 30,
        }
    }
}

/// Device calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// iCalendar file, relative to the data directory unless absolute.
    pub ics_file: String,
    /// Alarm offset written into calendar entries.
    pub reminder_minutes: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            ics_file: "calendar.ics".to_string(),
            reminder_minutes: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AsisConfig::default();
        assert_eq!(config.general.data_dir, "~/.asis/data");
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.assistant.history_capacity, 20);
        assert_eq!(config.assistant.context_turns, 10);
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.search.region, "ro-ro");
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.email.smtp_port, 587);
        assert_eq!(config.notifications.lead_minutes, 30);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "debug"

[llm]
model = "gemini-2.0-flash"
temperature = 0.2
"#;
        let file = create_temp_config(content);
        let config = AsisConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.llm.top_k, 40);
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn test_load_invalid_config_is_error() {
        let file = create_temp_config("[api]\nport = \"not a number\"");
        assert!(AsisConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AsisConfig::load_or_default(Path::new("/nonexistent/asis.toml"));
        assert_eq!(config.general.data_dir, "~/.asis/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AsisConfig::default();
        config.api.port = 9100;
        config.email.self_address = "eu@example.com".to_string();
        config.save(&path).unwrap();

        let reloaded = AsisConfig::load(&path).unwrap();
        assert_eq!(reloaded.api.port, 9100);
        assert_eq!(reloaded.email.self_address, "eu@example.com");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "secret"),
            ("SMTP_PORT", "465"),
            ("SMTP_USER", "bot@example.com"),
            ("SMTP_PASSWORD", "pw"),
            ("SMTP_HOST", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = AsisConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key, "secret");
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.email.smtp_host, "smtp.gmail.com");
        assert!(config.email.is_configured());
        assert_eq!(config.email.confirmation_address(), Some("bot@example.com"));
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = AsisConfig::default();
        config.apply_overrides_from(|k| (k == "SMTP_PORT").then(|| "abc".to_string()));
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_utc_offset() {
        let mut config = AsisConfig::default();
        assert_eq!(config.utc_offset().local_minus_utc(), 7200);
        config.general.utc_offset_minutes = -300;
        assert_eq!(config.utc_offset().local_minus_utc(), -18000);
        config.general.utc_offset_minutes = 100_000;
        assert_eq!(config.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/lib/asis"), PathBuf::from("/var/lib/asis"));
        assert!(expand_home("~/.asis").ends_with(".asis"));
    }
}
