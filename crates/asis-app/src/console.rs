//! Terminal front end.
//!
//! Typed lines stand in for recognised speech and replies are printed
//! instead of spoken, so the same [`VoiceSession`] drives both.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use asis_chat::{
    event_channel, ConversationOrchestrator, SpeechRecognizer, SpeechSynthesizer, VoiceEvent,
    VoiceSession,
};
use asis_core::types::Role;

const HELP: &str = "Comenzi: /nou, /reia <id>, /gata, /istoric, /iesire";

/// "Listening" is simply waiting for the next stdin line.
#[derive(Default)]
struct ConsoleRecognizer {
    listening: AtomicBool,
}

#[async_trait]
impl SpeechRecognizer for ConsoleRecognizer {
    async fn start_listening(&self) -> bool {
        self.listening.store(true, Ordering::SeqCst);
        true
    }

    async fn stop_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }
}

struct ConsoleSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str) {
        println!("ASIS: {}", text);
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Read lines from stdin until EOF or `/iesire`.
pub async fn run(orchestrator: Arc<ConversationOrchestrator>) -> std::io::Result<()> {
    // Printing completes synchronously, so nothing reports Speaking* events.
    let (_events, receiver) = event_channel();
    let mut session = VoiceSession::new(
        Arc::clone(&orchestrator),
        Arc::new(ConsoleRecognizer::default()),
        Arc::new(ConsoleSynthesizer),
        receiver,
    );

    println!("ASIS este gata. {}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        if !session.is_listening() {
            if let Err(e) = session.start_listening().await {
                tracing::warn!(error = %e, "Console input unavailable");
                return Ok(());
            }
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('/') {
            if let Flow::Quit = command(&orchestrator, line) {
                break;
            }
            continue;
        }

        if let Some(reply) = session.handle(VoiceEvent::Recognized(line.to_string())).await {
            tracing::debug!(
                intent = %reply.intent,
                success = reply.success,
                search = reply.search_performed,
                "Console reply"
            );
            if let Some(question) = reply.follow_up_question {
                println!("ASIS: {}", question);
            }
        }
    }

    if session.is_listening() {
        let _ = session.stop_listening().await;
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}

fn command(orchestrator: &ConversationOrchestrator, line: &str) -> Flow {
    let mut parts = line.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match name {
        "/iesire" | "/quit" => return Flow::Quit,
        "/nou" => {
            let title = if arg.is_empty() { "Conversație nouă" } else { arg };
            match orchestrator.start_conversation(title) {
                Ok(conversation) => println!("Conversație începută: {}", conversation.id),
                Err(e) => println!("Eroare: {}", e),
            }
        }
        "/reia" => match arg.parse::<Uuid>() {
            Ok(id) => match orchestrator.resume_conversation(id) {
                Ok(conversation) => println!("Conversație reluată: {}", conversation.title),
                Err(e) => println!("Eroare: {}", e),
            },
            Err(_) => println!("Folosire: /reia <id>"),
        },
        "/gata" => match orchestrator.end_conversation() {
            Some(id) => println!("Conversația {} a fost închisă.", id),
            None => println!("Nu există o conversație activă."),
        },
        "/istoric" => {
            for turn in orchestrator.history() {
                let who = match turn.role {
                    Role::User => "Tu",
                    Role::Assistant => "ASIS",
                };
                println!("{}: {}", who, turn.content);
            }
        }
        _ => println!("{}", HELP),
    }
    Flow::Continue
}
