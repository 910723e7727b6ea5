//! HTTP request handlers

use super::types::{
    ChatRequest, ConversationDetailResponse, ConversationListResponse, CreateConversationRequest,
    ErrorResponse, MessageView, MoveStepRequest, MoveStepResponse, ScriptRequest, ScriptResponse,
    SubscriberRequest, SuccessResponse, SwitchModeRequest, UpdateBotRequest,
};
use super::AppState;
use crate::db::{Bot, Conversation, DbError, Script, Step, StepDraft, Subscriber};
use crate::runtime::{Exchange, Outcome, RuntimeError};
use crate::state_machine::{ConvMode, Event};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};

/// Messages returned with a conversation
const MESSAGE_PAGE: usize = 200;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // The single creator bot
        .route("/api/bot", get(get_bot).put(update_bot))
        // Scripts and steps
        .route("/api/scripts", get(list_scripts).post(create_script))
        .route(
            "/api/scripts/:id",
            get(get_script).put(update_script).delete(delete_script),
        )
        .route("/api/scripts/:id/steps", get(list_steps).post(add_step))
        .route("/api/steps/:id", put(update_step).delete(delete_step))
        .route("/api/steps/:id/move", post(move_step))
        // Subscribers
        .route("/api/subscribers", get(list_subscribers).post(upsert_subscriber))
        .route("/api/subscribers/:id", delete(delete_subscriber))
        // Conversations
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        // Conversation actions
        .route("/api/conversations/:id/chat", post(send_chat))
        .route("/api/conversations/:id/pay", post(pay))
        .route("/api/conversations/:id/lock", post(lock))
        .route("/api/conversations/:id/unlock", post(unlock))
        .route("/api/conversations/:id/mode", post(switch_mode))
        .route("/api/conversations/:id/reset", post(reset))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Bot
// ============================================================

async fn get_bot(State(state): State<AppState>) -> Result<Json<Bot>, AppError> {
    Ok(Json(state.db.creator_bot()?))
}

async fn update_bot(
    State(state): State<AppState>,
    Json(req): Json<UpdateBotRequest>,
) -> Result<Json<Bot>, AppError> {
    let creator = state.db.creator_bot()?;
    let bot = state.db.update_bot(creator.id, &req.name, &req.persona)?;
    tracing::info!(bot_id = bot.id, name = %bot.name, "Bot updated");
    Ok(Json(bot))
}

// ============================================================
// Scripts & Steps
// ============================================================

async fn list_scripts(State(state): State<AppState>) -> Result<Json<Vec<Script>>, AppError> {
    Ok(Json(state.db.list_scripts()?))
}

async fn create_script(
    State(state): State<AppState>,
    Json(req): Json<ScriptRequest>,
) -> Result<Json<Script>, AppError> {
    Ok(Json(
        state
            .db
            .create_script(&req.name, req.description.as_deref())?,
    ))
}

async fn get_script(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ScriptResponse>, AppError> {
    let script = state.db.get_script(id)?;
    let steps = state.db.list_steps(id)?;
    Ok(Json(ScriptResponse { script, steps }))
}

async fn update_script(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ScriptRequest>,
) -> Result<Json<Script>, AppError> {
    Ok(Json(state.db.update_script(
        id,
        &req.name,
        req.description.as_deref(),
    )?))
}

async fn delete_script(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_script(id)?;
    tracing::info!(script_id = id, "Script deleted");
    Ok(Json(SuccessResponse { success: true }))
}

async fn list_steps(
    State(state): State<AppState>,
    Path(script_id): Path<i64>,
) -> Result<Json<Vec<Step>>, AppError> {
    state.db.get_script(script_id)?;
    Ok(Json(state.db.list_steps(script_id)?))
}

async fn add_step(
    State(state): State<AppState>,
    Path(script_id): Path<i64>,
    Json(draft): Json<StepDraft>,
) -> Result<Json<Step>, AppError> {
    state.db.get_script(script_id)?;
    Ok(Json(state.db.add_step(script_id, &draft)?))
}

async fn update_step(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<StepDraft>,
) -> Result<Json<Step>, AppError> {
    Ok(Json(state.db.update_step(id, &draft)?))
}

async fn delete_step(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_step(id)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn move_step(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<MoveStepRequest>,
) -> Result<Json<MoveStepResponse>, AppError> {
    let script_id = state.db.get_step(id)?.script_id;
    let moved = state.db.move_step(script_id, id, req.direction)?;
    Ok(Json(MoveStepResponse {
        moved,
        steps: state.db.list_steps(script_id)?,
    }))
}

// ============================================================
// Subscribers
// ============================================================

async fn list_subscribers(State(state): State<AppState>) -> Result<Json<Vec<Subscriber>>, AppError> {
    Ok(Json(state.db.list_subscribers()?))
}

async fn upsert_subscriber(
    State(state): State<AppState>,
    Json(req): Json<SubscriberRequest>,
) -> Result<Json<Subscriber>, AppError> {
    Ok(Json(
        state
            .db
            .upsert_subscriber(&req.username, req.display_name.as_deref())?,
    ))
}

async fn delete_subscriber(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_subscriber(id)?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ConversationListResponse>, AppError> {
    Ok(Json(ConversationListResponse {
        conversations: state.db.list_conversations()?,
    }))
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let script_id = selected_script(&state, req.mode, req.script_id)?;
    let subscriber = state
        .db
        .upsert_subscriber(&req.username, req.display_name.as_deref())?;
    let bot = state.db.creator_bot()?;
    let conversation = state
        .db
        .get_or_create_conversation(subscriber.id, bot.id, req.mode, script_id)?;

    tracing::info!(
        conv_id = conversation.id,
        subscriber = %subscriber.username,
        mode = %conversation.state.mode,
        "Conversation opened"
    );
    Ok(Json(conversation))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConversationDetailResponse>, AppError> {
    let conversation = state.db.get_conversation(id)?;
    let subscriber = state.db.get_subscriber(conversation.subscriber_id)?;
    let steps = match conversation.state.script_id {
        Some(script_id) if conversation.state.has_active_script() => state.db.list_steps(script_id)?,
        _ => Vec::new(),
    };
    let show_pay = conversation.state.awaiting_payment(&steps);
    let messages = state
        .db
        .list_messages(id, MESSAGE_PAGE)?
        .into_iter()
        .map(MessageView::from)
        .collect();

    Ok(Json(ConversationDetailResponse {
        conversation,
        subscriber,
        messages,
        show_pay,
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_conversation(id)?;
    state.runtime.forget(id).await;
    tracing::info!(conv_id = id, "Conversation deleted");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Conversation Actions
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Exchange>, AppError> {
    let exchange = state
        .runtime
        .send_message(id, &req.text, req.session_id.as_deref())
        .await?;
    Ok(Json(exchange))
}

async fn pay(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Outcome>, AppError> {
    Ok(Json(state.runtime.apply_action(id, Event::Pay).await?))
}

async fn lock(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Outcome>, AppError> {
    Ok(Json(state.runtime.apply_action(id, Event::Lock).await?))
}

async fn unlock(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Outcome>, AppError> {
    Ok(Json(state.runtime.apply_action(id, Event::Unlock).await?))
}

async fn switch_mode(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SwitchModeRequest>,
) -> Result<Json<Outcome>, AppError> {
    let script_id = selected_script(&state, req.mode, req.script_id)?;
    let event = Event::SwitchMode {
        mode: req.mode,
        script_id,
    };
    Ok(Json(state.runtime.apply_action(id, event).await?))
}

async fn reset(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Outcome>, AppError> {
    Ok(Json(state.runtime.apply_action(id, Event::Reset).await?))
}

/// Script to attach for a mode, checked to exist. Only script mode keeps one.
fn selected_script(state: &AppState, mode: ConvMode, script_id: Option<i64>) -> Result<Option<i64>, AppError> {
    match script_id {
        Some(id) if mode == ConvMode::Script => Ok(Some(state.db.get_script(id)?.id)),
        _ => Ok(None),
    }
}

async fn get_version() -> &'static str {
    concat!("myfancrm ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(error: DbError) -> Self {
        let message = error.to_string();
        match error {
            DbError::BotNotFound(_)
            | DbError::ScriptNotFound(_)
            | DbError::StepNotFound(_)
            | DbError::SubscriberNotFound(_)
            | DbError::ConversationNotFound(_) => AppError::NotFound(message),
            DbError::EmptyStepText | DbError::EmptyUsername => AppError::BadRequest(message),
            DbError::Sqlite(_) | DbError::NoCreatorBot | DbError::LockPoisoned => {
                AppError::Internal(message)
            }
        }
    }
}

impl From<RuntimeError> for AppError {
    fn from(error: RuntimeError) -> Self {
        let message = error.to_string();
        match error {
            RuntimeError::Store(e) => e.into(),
            RuntimeError::EmptyMessage => AppError::BadRequest(message),
            RuntimeError::Rejected(_) => AppError::Conflict(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_backend::ChatBackend;
    use crate::db::Database;
    use crate::runtime::testing::MockChatBackend;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt; // for `app.oneshot()`

    struct TestApp {
        router: Router,
        backend: Arc<MockChatBackend>,
    }

    impl TestApp {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            db.ensure_single_creator().unwrap();
            let backend = Arc::new(MockChatBackend::new());
            let shared: Arc<dyn ChatBackend> = backend.clone();
            let state = AppState::new(db, shared, 20);
            Self {
                router: create_router(state),
                backend,
            }
        }

        async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            (status, value)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.request("GET", uri, None).await
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.request("POST", uri, Some(body)).await
        }

        async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.request("PUT", uri, Some(body)).await
        }

        async fn delete(&self, uri: &str) -> (StatusCode, Value) {
            self.request("DELETE", uri, None).await
        }

        /// Script with a text step then a paywall step, and a script-mode
        /// conversation on it
        async fn paywall_conversation(&self) -> (i64, i64) {
            let (_, script) = self.post("/api/scripts", json!({"name": "Soirée"})).await;
            let script_id = script["id"].as_i64().unwrap();
            self.post(
                &format!("/api/scripts/{script_id}/steps"),
                json!({"kind": "text", "text": "Dis bonjour"}),
            )
            .await;
            self.post(
                &format!("/api/scripts/{script_id}/steps"),
                json!({"kind": "paywall_text", "text": "Propose la vidéo", "title": "Bonus", "price": "5€"}),
            )
            .await;
            let (status, conv) = self
                .post(
                    "/api/conversations",
                    json!({"username": "fan42", "mode": "script", "script_id": script_id}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            (script_id, conv["id"].as_i64().unwrap())
        }
    }

    #[tokio::test]
    async fn test_bot_update_clamps_persona() {
        let app = TestApp::new();
        let (status, bot) = app.get("/api/bot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bot["name"], "Créatrice");

        let (status, bot) = app
            .put(
                "/api/bot",
                json!({"name": "Lola", "persona": {"name": "Lola", "dominance": 9}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bot["name"], "Lola");
        assert_eq!(bot["persona"]["dominance"], 5);
    }

    #[tokio::test]
    async fn test_script_and_step_management() {
        let app = TestApp::new();
        let (_, script) = app.post("/api/scripts", json!({"name": "  "})).await;
        assert_eq!(script["name"], "Script");
        let script_id = script["id"].as_i64().unwrap();

        let (status, _) = app
            .post(
                &format!("/api/scripts/{script_id}/steps"),
                json!({"kind": "text", "text": "   "}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, first) = app
            .post(
                &format!("/api/scripts/{script_id}/steps"),
                json!({"kind": "text", "text": "un"}),
            )
            .await;
        let (_, second) = app
            .post(
                &format!("/api/scripts/{script_id}/steps"),
                json!({"kind": "media_text", "text": "deux", "media_desc": "photo"}),
            )
            .await;
        assert_eq!(second["position"], 2);

        let (_, moved) = app
            .post(
                &format!("/api/steps/{}/move", second["id"]),
                json!({"direction": "up"}),
            )
            .await;
        assert_eq!(moved["moved"], true);
        assert_eq!(moved["steps"][0]["text"], "deux");

        let (_, moved) = app
            .post(
                &format!("/api/steps/{}/move", second["id"]),
                json!({"direction": "up"}),
            )
            .await;
        assert_eq!(moved["moved"], false);

        let (_, updated) = app
            .put(
                &format!("/api/steps/{}", first["id"]),
                json!({"kind": "paywall_text", "text": "un bis", "price": "10€"}),
            )
            .await;
        assert_eq!(updated["kind"], "paywall_text");
        assert_eq!(updated["price"], "10€");

        let (status, _) = app.delete(&format!("/api/steps/{}", second["id"])).await;
        assert_eq!(status, StatusCode::OK);
        let (_, detail) = app.get(&format!("/api/scripts/{script_id}")).await;
        assert_eq!(detail["steps"].as_array().unwrap().len(), 1);
        assert_eq!(detail["steps"][0]["position"], 1);

        let (status, _) = app.get("/api/scripts/999/steps").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .post("/api/scripts/999/steps", json!({"kind": "text", "text": "x"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_subscribers() {
        let app = TestApp::new();
        let (_, first) = app
            .post("/api/subscribers", json!({"username": "fan", "display_name": "Fan"}))
            .await;
        let (_, again) = app.post("/api/subscribers", json!({"username": "fan"})).await;
        assert_eq!(first["id"], again["id"]);
        assert_eq!(again["display_name"], "Fan");

        let (status, _) = app.post("/api/subscribers", json!({"username": " "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.delete(&format!("/api/subscribers/{}", first["id"])).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = app.get("/api/subscribers").await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paywall_flow() {
        let app = TestApp::new();
        let (_, conv_id) = app.paywall_conversation().await;
        for reply in ["Coucou toi", "J'ai un truc pour toi", "Alors ?"] {
            app.backend.queue_reply(reply);
        }

        // Locking is required before chatting
        let (_, exchange) = app
            .post(&format!("/api/conversations/{conv_id}/chat"), json!({"text": "salut"}))
            .await;
        assert!(exchange["reply"]["content"].as_str().unwrap().contains("Lock"));
        assert!(app.backend.recorded_calls().is_empty());

        let (_, outcome) = app
            .post(&format!("/api/conversations/{conv_id}/lock"), json!({}))
            .await;
        assert_eq!(outcome["applied"], true);
        assert_eq!(outcome["conversation"]["script_started"], true);

        app.post(&format!("/api/conversations/{conv_id}/chat"), json!({"text": "1"}))
            .await;
        let (_, detail) = app.get(&format!("/api/conversations/{conv_id}")).await;
        assert_eq!(detail["show_pay"], true);

        let (status, exchange) = app
            .post(&format!("/api/conversations/{conv_id}/chat"), json!({"text": "2"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exchange["paywall"]["title"], "Bonus");
        assert_eq!(exchange["paywall"]["price"], "5€");

        let (_, detail) = app.get(&format!("/api/conversations/{conv_id}")).await;
        let messages = detail["messages"].as_array().unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last["text"], "J'ai un truc pour toi");
        assert_eq!(last["paywall"]["title"], "Bonus");
        assert_eq!(detail["subscriber"]["username"], "fan42");

        let (_, outcome) = app
            .post(&format!("/api/conversations/{conv_id}/pay"), json!({}))
            .await;
        assert_eq!(outcome["applied"], true);
        let (_, detail) = app.get(&format!("/api/conversations/{conv_id}")).await;
        assert_eq!(detail["show_pay"], false);

        let (_, outcome) = app
            .post(&format!("/api/conversations/{conv_id}/pay"), json!({}))
            .await;
        assert_eq!(outcome["applied"], false);
        assert!(outcome["rejection"].is_string());
    }

    #[tokio::test]
    async fn test_backend_error_is_reported_in_reply() {
        let app = TestApp::new();
        let (_, conv) = app.post("/api/conversations", json!({"username": "fan"})).await;
        let conv_id = conv["id"].as_i64().unwrap();

        let (status, exchange) = app
            .post(&format!("/api/conversations/{conv_id}/chat"), json!({"text": "hello"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            exchange["reply"]["content"],
            "Erreur API: No mock response queued"
        );
        assert_eq!(exchange["error"], "No mock response queued");
    }

    #[tokio::test]
    async fn test_mode_switch_and_reset() {
        let app = TestApp::new();
        let (script_id, conv_id) = app.paywall_conversation().await;
        app.post(&format!("/api/conversations/{conv_id}/lock"), json!({}))
            .await;

        let (status, outcome) = app
            .post(
                &format!("/api/conversations/{conv_id}/mode"),
                json!({"mode": "script", "script_id": script_id}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["applied"], false);

        let (status, _) = app
            .post(
                &format!("/api/conversations/{conv_id}/mode"),
                json!({"mode": "script", "script_id": 999}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, outcome) = app
            .post(
                &format!("/api/conversations/{conv_id}/mode"),
                json!({"mode": "free", "script_id": script_id}),
            )
            .await;
        assert_eq!(outcome["applied"], true);
        assert_eq!(outcome["conversation"]["mode"], "free");
        assert!(outcome["conversation"]["script_id"].is_null());

        app.backend.queue_reply("ok");
        app.post(&format!("/api/conversations/{conv_id}/chat"), json!({"text": "hi"}))
            .await;
        let (_, outcome) = app
            .post(&format!("/api/conversations/{conv_id}/reset"), json!({}))
            .await;
        assert_eq!(outcome["applied"], true);
        let (_, detail) = app.get(&format!("/api/conversations/{conv_id}")).await;
        assert!(detail["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let app = TestApp::new();
        let (_, first) = app
            .post("/api/conversations", json!({"username": "fan", "display_name": "Fan"}))
            .await;
        let (_, again) = app.post("/api/conversations", json!({"username": "fan"})).await;
        assert_eq!(first["id"], again["id"]);

        let (_, list) = app.get("/api/conversations").await;
        let conversations = list["conversations"].as_array().unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0]["subscriber_username"], "fan");
        assert_eq!(conversations[0]["bot_name"], "Créatrice");

        let (status, _) = app
            .post(
                &format!("/api/conversations/{}/chat", first["id"]),
                json!({"text": "   "}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.delete(&format!("/api/conversations/{}", first["id"])).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.get(&format!("/api/conversations/{}", first["id"])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, _) = app.post("/api/conversations/999/pay", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_version() {
        let app = TestApp::new();
        let (status, body) = app.get("/version").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String(format!("myfancrm {}", env!("CARGO_PKG_VERSION"))));
    }
}
