//! ASIS application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML plus env overrides
//! 2. Initialize tracing
//! 3. Open the SQLite database
//! 4. Construct the outward collaborators (SMTP, DuckDuckGo, iCalendar file,
//!    local notifications) and the Gemini client
//! 5. Wire the action dispatcher and the conversation orchestrator
//! 6. Run either the axum REST API or the terminal chat

mod cli;
mod console;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use asis_action::services::{
    DuckDuckGoSearch, IcsCalendar, LocalNotificationScheduler, SmtpEmailSender,
};
use asis_action::{ActionDispatcher, ActionSettings, Services, WebSearch};
use asis_api::{start_server, AppState};
use asis_chat::{ConversationOrchestrator, GeminiClient, OrchestratorSettings};
use asis_core::clock::{Clock, SystemClock};
use asis_core::config::AsisConfig;
use asis_storage::Database;

use crate::cli::{CliArgs, Command};

/// Level priority: --log-level flag > RUST_LOG > config file.
fn init_tracing(flag: Option<&str>, config_level: &str) {
    let filter = match flag {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config_exists = config_file.exists();
    let mut config = if config_exists {
        AsisConfig::load(&config_file)?
    } else {
        AsisConfig::default()
    };
    config.apply_env_overrides();
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config.api.port = args.resolve_port(config.api.port);

    init_tracing(args.log_level.as_deref(), &config.general.log_level);
    tracing::info!("Starting ASIS v{}", env!("CARGO_PKG_VERSION"));
    if config_exists {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }

    // Storage.
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("asis.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Collaborators.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Arc::new(
        LocalNotificationScheduler::new(Arc::clone(&clock))
            .with_enabled(config.notifications.enabled),
    );
    let email = SmtpEmailSender::new(&config.email)?;
    if !email.is_configured() {
        tracing::warn!("SMTP is not configured; email actions will fail");
    }
    let search: Arc<dyn WebSearch> = Arc::new(DuckDuckGoSearch::new(&config.search)?);
    let calendar = IcsCalendar::new(data_dir.join(&config.calendar.ics_file));
    tracing::info!(path = %calendar.path().display(), "Device calendar file");

    let services = Services {
        email: Arc::new(email),
        search: Arc::clone(&search),
        calendar: Arc::new(calendar),
        notifications: scheduler.clone(),
    };
    let dispatcher = Arc::new(ActionDispatcher::new(
        Arc::clone(&db),
        services,
        Arc::clone(&clock),
        ActionSettings::from_config(&config),
    ));

    let llm = GeminiClient::new(&config.llm, config.utc_offset(), Arc::clone(&clock))?;
    if !llm.is_configured() {
        tracing::warn!("GEMINI_API_KEY is not set; every reply will be an apology");
    }
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        Arc::new(llm),
        dispatcher,
        search,
        Arc::clone(&db),
        Arc::clone(&clock),
        OrchestratorSettings::from_config(&config),
    ));

    match args.command() {
        Command::Serve { .. } => {
            let state = AppState::new(
                config.clone(),
                db,
                orchestrator,
                scheduler.sender(),
                clock,
            );
            start_server(&config, state).await?;
        }
        Command::Chat => console::run(orchestrator).await?,
    }

    scheduler.shutdown();
    Ok(())
}
