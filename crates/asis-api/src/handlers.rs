//! Route handler functions for all API endpoints.
//!
//! CRUD routes talk to the repositories directly. Anything with side effects
//! beyond the local store (meetings, email, search) goes through the action
//! dispatcher so the REST surface and the voice surface behave the same.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use asis_action::{payload, ActionOutcome, Intent};
use asis_chat::AssistantReply;
use asis_core::clock::Clock;
use asis_core::types::{
    ActionStatus, AgentAction, CalendarEvent, Conversation, EventStatus, Message, Priority,
    ShoppingItem, Task,
};
use asis_storage::{
    AgentActionFilter, AgentActionRepository, CalendarFilter, CalendarRepository,
    ConversationRepository, ShoppingFilter, ShoppingRepository, TaskFilter, TaskRepository,
};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    pub completed: Option<bool>,
    pub category: Option<String>,
    /// Only tasks due today in the user's offset.
    #[serde(default)]
    pub today: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShoppingListParams {
    pub purchased: Option<bool>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventListParams {
    pub limit: Option<u64>,
    #[serde(default)]
    pub include_past: bool,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub action_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u64>,
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationCreate {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskCreate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "payload::lenient_priority")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "payload::lenient_priority")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ShoppingItemCreate {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub price_estimate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShoppingItemUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub price_estimate: Option<f64>,
    #[serde(default)]
    pub is_purchased: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub title: String,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub name: String,
    pub status: String,
    pub version: String,
    pub llm_configured: bool,
    pub search_enabled: bool,
    pub email_configured: bool,
    pub active_conversation: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

// =============================================================================
// Status
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET / - which collaborators are configured.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        name: "ASIS".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        llm_configured: !state.config.llm.api_key.trim().is_empty(),
        search_enabled: state.config.search.enabled,
        email_configured: state.config.email.is_configured(),
        active_conversation: state.orchestrator.active_conversation(),
    })
}

// =============================================================================
// Chat
// =============================================================================

/// POST /api/voice/chat - one utterance in a stored conversation.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AssistantReply>, ApiError> {
    let reply = state
        .orchestrator
        .process_in_conversation(request.conversation_id, &request.text)
        .await?;
    Ok(Json(reply))
}

// =============================================================================
// Conversations
// =============================================================================

/// GET /api/conversations - most recently active first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let repo = ConversationRepository::new(state.database.clone());
    Ok(Json(repo.list(params.limit.unwrap_or(20))?))
}

/// POST /api/conversations
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<ConversationCreate>,
) -> Result<Json<Conversation>, ApiError> {
    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string());

    let mut conversation = Conversation::new(title);
    conversation.created_at = state.clock.now();
    conversation.updated_at = conversation.created_at;
    ConversationRepository::new(state.database.clone()).create(&conversation)?;
    Ok(Json(conversation))
}

/// GET /api/conversations/{id} - the conversation with all its messages.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let repo = ConversationRepository::new(state.database.clone());
    let conversation = repo
        .get(id)?
        .ok_or_else(|| ApiError::NotFound(format!("conversation {} not found", id)))?;
    let messages = repo.messages(id)?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

/// DELETE /api/conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !ConversationRepository::new(state.database.clone()).delete(id)? {
        return Err(ApiError::NotFound(format!("conversation {} not found", id)));
    }
    Ok(Json(json!({ "deleted": id })))
}

// =============================================================================
// Tasks
// =============================================================================

/// Parse a due date the way the voice path does, rejecting what it can't read.
fn parse_due(state: &AppState, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    state
        .dispatcher()
        .dates()
        .parse(raw, state.clock.now())
        .ok_or_else(|| ApiError::BadRequest(format!("unrecognised date: {}", raw)))
}

fn task_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("task {} not found", id))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let mut filter = TaskFilter {
        completed: params.completed,
        category: params.category,
        ..TaskFilter::default()
    };
    if params.today {
        if let Some((start, end)) = state.dispatcher().dates().today_bounds(state.clock.now()) {
            filter.due_from = Some(start);
            filter.due_before = Some(end);
        }
    }
    let tasks = TaskRepository::new(state.database.clone()).list(&filter)?;
    Ok(Json(tasks))
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<TaskCreate>,
) -> Result<Json<Task>, ApiError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title cannot be empty".to_string()));
    }

    let mut task = Task::new(title);
    task.created_at = state.clock.now();
    task.updated_at = task.created_at;
    task.description = request.description;
    task.category = request.category;
    task.priority = request.priority.unwrap_or_default();
    if let Some(raw) = request.due_date.as_deref() {
        task.due_date = Some(parse_due(&state, raw)?);
    }

    TaskRepository::new(state.database.clone()).create(&task)?;
    tracing::info!(task_id = %task.id, "Task created via API");
    Ok(Json(task))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    TaskRepository::new(state.database.clone())
        .get(id)?
        .map(Json)
        .ok_or_else(|| task_not_found(id))
}

/// PUT /api/tasks/{id} - only the fields present are changed.
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    let repo = TaskRepository::new(state.database.clone());
    let mut task = repo.get(id)?.ok_or_else(|| task_not_found(id))?;

    if let Some(title) = request.title.map(|t| t.trim().to_string()) {
        if title.is_empty() {
            return Err(ApiError::BadRequest("title cannot be empty".to_string()));
        }
        task.title = title;
    }
    if let Some(description) = request.description {
        task.description = Some(description);
    }
    if let Some(raw) = request.due_date.as_deref() {
        task.due_date = Some(parse_due(&state, raw)?);
    }
    if let Some(priority) = request.priority {
        task.priority = priority;
    }
    if let Some(category) = request.category {
        task.category = Some(category);
    }
    if let Some(completed) = request.is_completed {
        task.completed = completed;
    }

    repo.update(&task)?
        .map(Json)
        .ok_or_else(|| task_not_found(id))
}

/// POST /api/tasks/{id}/complete
pub async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    TaskRepository::new(state.database.clone())
        .set_completed(id, true)?
        .map(Json)
        .ok_or_else(|| task_not_found(id))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !TaskRepository::new(state.database.clone()).delete(id)? {
        return Err(task_not_found(id));
    }
    Ok(Json(json!({ "deleted": id })))
}

// =============================================================================
// Shopping list
// =============================================================================

fn item_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("shopping item {} not found", id))
}

/// GET /api/shopping
pub async fn list_shopping(
    State(state): State<AppState>,
    Query(params): Query<ShoppingListParams>,
) -> Result<Json<Vec<ShoppingItem>>, ApiError> {
    let filter = ShoppingFilter {
        purchased: params.purchased,
        category: params.category,
    };
    Ok(Json(ShoppingRepository::new(state.database.clone()).list(&filter)?))
}

/// POST /api/shopping
pub async fn create_shopping_item(
    State(state): State<AppState>,
    Json(request): Json<ShoppingItemCreate>,
) -> Result<Json<ShoppingItem>, ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name cannot be empty".to_string()));
    }

    let mut item = ShoppingItem::new(name);
    item.created_at = state.clock.now();
    if let Some(quantity) = request.quantity.filter(|q| !q.trim().is_empty()) {
        item.quantity = quantity;
    }
    item.category = request.category;
    item.notes = request.notes;
    item.price_estimate = request.price_estimate;

    ShoppingRepository::new(state.database.clone()).create(&item)?;
    Ok(Json(item))
}

/// PUT /api/shopping/{id}
pub async fn update_shopping_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ShoppingItemUpdate>,
) -> Result<Json<ShoppingItem>, ApiError> {
    let repo = ShoppingRepository::new(state.database.clone());
    let mut item = repo.get(id)?.ok_or_else(|| item_not_found(id))?;

    if let Some(name) = request.name.map(|n| n.trim().to_string()) {
        if name.is_empty() {
            return Err(ApiError::BadRequest("name cannot be empty".to_string()));
        }
        item.name = name;
    }
    if let Some(quantity) = request.quantity {
        item.quantity = quantity;
    }
    if let Some(category) = request.category {
        item.category = Some(category);
    }
    if let Some(notes) = request.notes {
        item.notes = Some(notes);
    }
    if let Some(price) = request.price_estimate {
        item.price_estimate = Some(price);
    }
    if let Some(purchased) = request.is_purchased {
        item.purchased = purchased;
    }

    repo.update(&item)?
        .map(Json)
        .ok_or_else(|| item_not_found(id))
}

/// POST /api/shopping/{id}/purchase
pub async fn purchase_shopping_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShoppingItem>, ApiError> {
    ShoppingRepository::new(state.database.clone())
        .set_purchased(id, true)?
        .map(Json)
        .ok_or_else(|| item_not_found(id))
}

/// DELETE /api/shopping/{id}
pub async fn delete_shopping_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !ShoppingRepository::new(state.database.clone()).delete(id)? {
        return Err(item_not_found(id));
    }
    Ok(Json(json!({ "deleted": id })))
}

/// POST /api/shopping/clear-purchased
pub async fn clear_purchased(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = ShoppingRepository::new(state.database.clone()).clear_purchased()?;
    Ok(Json(DeletedResponse { deleted }))
}

// =============================================================================
// Calendar
// =============================================================================

/// Run an intent and turn a failed outcome into a 400.
async fn dispatch_strict(
    state: &AppState,
    intent: Intent,
    data: Value,
) -> Result<Json<ActionOutcome>, ApiError> {
    let outcome = state.dispatcher().dispatch(intent, &data).await;
    if outcome.success {
        Ok(Json(outcome))
    } else {
        Err(ApiError::BadRequest(
            outcome.error.unwrap_or_else(|| format!("{} failed", intent)),
        ))
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

/// POST /api/calendar/schedule-meeting
pub async fn schedule_meeting(
    State(state): State<AppState>,
    Json(request): Json<MeetingRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let data = to_payload(&request)?;
    dispatch_strict(&state, Intent::ScheduleMeeting, data).await
}

/// GET /api/calendar/events
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> Result<Json<Vec<CalendarEvent>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<EventStatus>)
        .transpose()?;
    let filter = CalendarFilter {
        status,
        starts_from: (!params.include_past).then(|| state.clock.now()),
        starts_before: None,
        limit: Some(params.limit.unwrap_or(20)),
    };
    Ok(Json(CalendarRepository::new(state.database.clone()).list(&filter)?))
}

/// GET /api/calendar/upcoming
pub async fn upcoming_events(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<CalendarEvent>>, ApiError> {
    let filter = CalendarFilter::upcoming(state.clock.now(), params.limit.unwrap_or(5));
    Ok(Json(CalendarRepository::new(state.database.clone()).list(&filter)?))
}

/// DELETE /api/calendar/events/{id} - cancels the event and its reminders.
pub async fn cancel_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionOutcome>, ApiError> {
    if CalendarRepository::new(state.database.clone()).get(id)?.is_none() {
        return Err(ApiError::NotFound(format!("event {} not found", id)));
    }
    dispatch_strict(
        &state,
        Intent::CancelCalendarEvent,
        json!({ "event_id": id.to_string() }),
    )
    .await
}

// =============================================================================
// Agent actions
// =============================================================================

/// POST /api/agent/email
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let data = to_payload(&request)?;
    dispatch_strict(&state, Intent::SendEmail, data).await
}

/// POST /api/agent/search
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query cannot be empty".to_string()));
    }
    dispatch_strict(
        &state,
        Intent::SearchInternet,
        json!({ "query": request.query }),
    )
    .await
}

/// GET /api/agent/history - audit log of outward actions, newest first.
pub async fn action_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<AgentAction>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<ActionStatus>)
        .transpose()?;
    let filter = AgentActionFilter {
        action_type: params.action_type,
        status,
        limit: params.limit.unwrap_or(20),
    };
    Ok(Json(AgentActionRepository::new(state.database.clone()).list(&filter)?))
}

/// POST /api/actions/{intent} - run any intent with the body as its data.
///
/// The outcome is returned as-is; a failed action is still a 200.
pub async fn run_action(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ActionOutcome>, ApiError> {
    let intent: Intent = name
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown intent: {}", name)))?;
    let data = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?
    };
    Ok(Json(state.dispatcher().dispatch(intent, &data).await))
}

/// GET /api/intents - every intent the dispatcher accepts.
pub async fn list_intents() -> Json<Vec<&'static str>> {
    Json(Intent::ALL.iter().map(Intent::as_str).collect())
}

// =============================================================================
// Notifications
// =============================================================================

/// GET /api/notifications/stream - SSE of fired notifications.
pub async fn notification_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.notifications.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(notification) => {
            let data = serde_json::to_string(&notification).unwrap_or_default();
            Some(Ok(Event::default().event("notification").data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
