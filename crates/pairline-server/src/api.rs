use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use pairline_core::{MatchService, Participant};
use pairline_shared::constants::MAX_DISPLAY_NAME_CHARS;
use pairline_shared::protocol::{
    CancelOutcome, ChatMessage, JoinTicket, LeaveOutcome, ParticipantStatus, QueueStatus,
    SessionSummary, SystemStatus,
};
use pairline_shared::{MessageId, ParticipantId, SessionId};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MatchService>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/queue", post(join_queue).get(queue_status))
        .route("/queue/:participant_id", delete(cancel_join))
        .route("/participants/:id/heartbeat", post(heartbeat))
        .route("/participants/:id/leave", post(leave_session))
        .route("/participants/:id/status", get(participant_status))
        .route("/participants/:id/events", get(participant_events))
        .route("/sessions/:session_id/messages", post(send_message))
        .route(
            "/sessions/:session_id/messages/:recipient_id",
            get(drain_messages),
        )
        .route("/admin/status", get(admin_status))
        .route("/admin/sessions", get(admin_sessions))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    pairing_interval_ms: u64,
    liveness_threshold_secs: u64,
    max_active_sessions: usize,
}

#[derive(Deserialize, Default)]
struct JoinRequest {
    #[serde(default)]
    display_name: String,
    /// Reconnecting clients may bring their previous id back.
    #[serde(default)]
    participant_id: Option<String>,
}

#[derive(Serialize)]
struct CancelResponse {
    outcome: CancelOutcome,
}

#[derive(Serialize)]
struct LeaveResponse {
    outcome: LeaveOutcome,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    sender_id: String,
    text: String,
}

#[derive(Serialize)]
struct SendMessageResponse {
    message_id: MessageId,
}

#[derive(Serialize)]
struct AdminStatusResponse {
    name: String,
    #[serde(flatten)]
    status: SystemStatus,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    let pairing = state.service.config();
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        pairing_interval_ms: pairing.pairing_interval.as_millis() as u64,
        liveness_threshold_secs: pairing.liveness_threshold.as_secs(),
        max_active_sessions: pairing.max_active_sessions,
    })
}

// ─── Queue ───

async fn join_queue(
    State(state): State<AppState>,
    body: Option<Json<JoinRequest>>,
) -> Result<(StatusCode, Json<JoinTicket>), ServerError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let participant = match req.participant_id {
        Some(id) => Participant::with_id(parse_participant_id(&id)?, &req.display_name),
        None => Participant::new(&req.display_name),
    };
    if req.display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        debug!(
            participant = %participant.id,
            "Display name truncated to {MAX_DISPLAY_NAME_CHARS} characters"
        );
    }

    let ticket = state.service.admit(participant).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.service.queue_status().await)
}

async fn cancel_join(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Json<CancelResponse>, ServerError> {
    let id = parse_participant_id(&participant_id)?;
    let outcome = state.service.cancel(&id).await?;
    Ok(Json(CancelResponse { outcome }))
}

// ─── Participants ───

async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let id = parse_participant_id(&id)?;
    state.service.heartbeat(&id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn leave_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LeaveResponse>, ServerError> {
    let id = parse_participant_id(&id)?;
    let outcome = state.service.leave(&id).await?;
    Ok(Json(LeaveResponse { outcome }))
}

async fn participant_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParticipantStatus>, ServerError> {
    let id = parse_participant_id(&id)?;
    Ok(Json(state.service.poll_status(&id).await?))
}

/// Server-sent event stream of `matched` / `peer-left` notifications.
async fn participant_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let id = parse_participant_id(&id)?;
    let rx = state.service.subscribe(&id).await?;
    info!(participant = %id, "Event stream opened");

    let events = stream::unfold(rx, |mut rx| async move {
        let Some(notification) = rx.recv().await else {
            return None;
        };
        let event = match Event::default()
            .event(notification.event_name())
            .json_data(&notification)
        {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Failed to encode notification");
                Event::default().event(notification.event_name())
            }
        };
        Some((Ok::<_, Infallible>(event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ─── Sessions ───

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ServerError> {
    let session_id = SessionId::from(session_id);
    let sender = parse_participant_id(&req.sender_id)?;
    let message_id = state
        .service
        .send_message(&session_id, &sender, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { message_id })))
}

async fn drain_messages(
    State(state): State<AppState>,
    Path((session_id, recipient_id)): Path<(String, String)>,
) -> Result<Json<Vec<ChatMessage>>, ServerError> {
    let session_id = SessionId::from(session_id);
    let recipient = parse_participant_id(&recipient_id)?;
    Ok(Json(
        state.service.drain_messages(&session_id, &recipient).await?,
    ))
}

fn parse_participant_id(raw: &str) -> Result<ParticipantId, ServerError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 64 {
        return Err(ServerError::BadRequest(
            "participant id must be 1-64 characters".into(),
        ));
    }
    Ok(ParticipantId::from(raw))
}

// ─── Admin ───

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

async fn admin_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    Ok(Json(AdminStatusResponse {
        name: state.config.instance_name.clone(),
        status: state.service.system_status().await,
    }))
}

async fn admin_sessions(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(state.service.active_sessions().await))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pairline_core::PairingConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state_with(admin_token: Option<&str>) -> AppState {
        let config = ServerConfig {
            admin_token: admin_token.map(str::to_string),
            ..ServerConfig::default()
        };
        AppState {
            service: Arc::new(MatchService::new(PairingConfig::default())),
            config: Arc::new(config),
        }
    }

    async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn join(state: &AppState, name: &str) -> String {
        let (status, body) = call(state, post_json("/queue", serde_json::json!({ "display_name": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["participant_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&state_with(None), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_reports_pairing_settings() {
        let (status, body) = call(&state_with(None), get("/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pairing_interval_ms"], 1000);
        assert_eq!(body["liveness_threshold_secs"], 10);
    }

    #[tokio::test]
    async fn test_join_and_poll_waiting() {
        let state = state_with(None);
        let id = join(&state, "alice").await;

        let (status, body) = call(&state, get(&format!("/participants/{id}/status"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "waiting");
        assert_eq!(body["position"], 1);

        let (_, queue) = call(&state, get("/queue")).await;
        assert_eq!(queue["total_waiting"], 1);
        assert_eq!(queue["entries"][0]["display_name"], "alice");
    }

    #[tokio::test]
    async fn test_join_without_body_is_anonymous() {
        let state = state_with(None);
        let req = Request::builder()
            .method("POST")
            .uri("/queue")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&state, req).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, queue) = call(&state, get("/queue")).await;
        assert_eq!(queue["entries"][0]["display_name"], "Anonymous");
    }

    #[tokio::test]
    async fn test_duplicate_join_conflicts() {
        let state = state_with(None);
        let body = serde_json::json!({ "display_name": "a", "participant_id": "fixed" });
        let (status, _) = call(&state, post_json("/queue", body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&state, post_json("/queue", body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("fixed"));
    }

    #[tokio::test]
    async fn test_cancel_then_unknown() {
        let state = state_with(None);
        let id = join(&state, "a").await;
        let cancel = || {
            Request::builder()
                .method("DELETE")
                .uri(format!("/queue/{id}"))
                .body(Body::empty())
                .unwrap()
        };

        let (status, body) = call(&state, cancel()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "cancelled");

        let (status, _) = call(&state, cancel()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pair_message_and_leave() {
        let state = state_with(None);
        let a = join(&state, "alice").await;
        let b = join(&state, "bob").await;
        state.service.run_pairing_sweep().await;

        let (_, status) = call(&state, get(&format!("/participants/{a}/status"))).await;
        assert_eq!(status["state"], "matched");
        assert_eq!(status["peer_display_name"], "bob");
        let session = status["session_id"].as_str().unwrap().to_string();

        let (code, sent) = call(
            &state,
            post_json(
                &format!("/sessions/{session}/messages"),
                serde_json::json!({ "sender_id": a, "text": " hi " }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(sent["message_id"], 1);

        let (code, inbox) = call(&state, get(&format!("/sessions/{session}/messages/{b}"))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(inbox[0]["text"], "hi");

        let (code, left) = call(&state, post_json(&format!("/participants/{a}/leave"), Value::Null)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(left["outcome"], "closed");

        let (_, status) = call(&state, get(&format!("/participants/{b}/status"))).await;
        assert_eq!(status["state"], "left");
        assert_eq!(status["reason"], "left");

        let (code, _) = call(
            &state,
            post_json(
                &format!("/sessions/{session}/messages"),
                serde_json::json!({ "sender_id": b, "text": "still there?" }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_outsider_cannot_post() {
        let state = state_with(None);
        join(&state, "a").await;
        join(&state, "b").await;
        let session = state.service.run_pairing_sweep().await.sessions[0].clone();

        let (code, _) = call(
            &state,
            post_json(
                &format!("/sessions/{session}/messages"),
                serde_json::json!({ "sender_id": "intruder", "text": "hello" }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let state = state_with(None);
        let a = join(&state, "a").await;
        join(&state, "b").await;
        let session = state.service.run_pairing_sweep().await.sessions[0].clone();

        let (code, _) = call(
            &state,
            post_json(
                &format!("/sessions/{session}/messages"),
                serde_json::json!({ "sender_id": a, "text": "   " }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_participant() {
        let state = state_with(None);
        let (code, body) = call(&state, post_json("/participants/ghost/heartbeat", Value::Null)).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let disabled = state_with(None);
        let (code, _) = call(&disabled, get("/admin/status")).await;
        assert_eq!(code, StatusCode::FORBIDDEN);

        let state = state_with(Some("s3cret"));
        let (code, _) = call(&state, get("/admin/status")).await;
        assert_eq!(code, StatusCode::FORBIDDEN);

        join(&state, "a").await;
        join(&state, "b").await;
        state.service.run_pairing_sweep().await;

        let authed = |uri: &str| {
            Request::builder()
                .uri(uri)
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .unwrap()
        };
        let (code, body) = call(&state, authed("/admin/status")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["active_sessions"], 1);
        assert_eq!(body["waiting"], 0);

        let (code, body) = call(&state, authed("/admin/sessions")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }
}
