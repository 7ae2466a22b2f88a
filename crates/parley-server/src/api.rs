//! HTTP API over the chat service.
//!
//! RPC-over-POST: credentials travel in the request body, and every handler
//! answers `200 OK` with the operation's in-band `status` field. Transport
//! concerns (CORS, request tracing, body limits) are layered on by the
//! router.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::{
    ChatService, MessagesResponse, OnlineUsersResponse, RegisteredResponse, RoomSelector,
    SendResponse, StatusResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(register))
        .route("/users/password", post(set_password))
        .route("/users/:username/registered", get(is_registered))
        .route("/presence/confirm", post(confirm_as_online))
        .route("/presence/online", get(get_online_users))
        .route("/chatrooms", post(create_chat_room))
        .route("/chatrooms/participants", post(add_chat_room_participant))
        .route("/chatrooms/edit", post(edit_chat_room))
        .route("/chatrooms/remove", post(remove_chat_room))
        .route("/chatrooms/send", post(send_chat_room_message))
        .route("/messages/send", post(send_message))
        .route("/messages/query", post(get_messages))
        .route("/messages/new", post(get_new_messages))
        .route("/messages/uncleared", post(get_uncleared_messages))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Json<StatusResponse> {
    Json(state.service.register(&req.username, &req.password).await)
}

async fn set_password(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Json<StatusResponse> {
    Json(
        state
            .service
            .set_password(&req.username, &req.password)
            .await,
    )
}

async fn is_registered(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<RegisteredResponse> {
    Json(state.service.is_registered(&username).await)
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ConfirmOnlineRequest {
    username: Option<String>,
}

async fn confirm_as_online(
    State(state): State<AppState>,
    Json(req): Json<ConfirmOnlineRequest>,
) -> Json<StatusResponse> {
    Json(state.service.confirm_as_online(req.username.as_deref()).await)
}

async fn get_online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    Json(state.service.get_online_users().await)
}

// ---------------------------------------------------------------------------
// Chatroom directory
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateChatRoomRequest {
    username: String,
    password: String,
    path: String,
    participants: Vec<String>,
}

async fn create_chat_room(
    State(state): State<AppState>,
    Json(req): Json<CreateChatRoomRequest>,
) -> Json<StatusResponse> {
    Json(
        state
            .service
            .create_chat_room(&req.username, &req.password, &req.path, &req.participants)
            .await,
    )
}

#[derive(Deserialize)]
struct AddParticipantRequest {
    username: String,
    password: String,
    path: String,
    participant: String,
}

async fn add_chat_room_participant(
    State(state): State<AppState>,
    Json(req): Json<AddParticipantRequest>,
) -> Json<StatusResponse> {
    Json(
        state
            .service
            .add_chat_room_participant(&req.username, &req.password, &req.path, &req.participant)
            .await,
    )
}

async fn edit_chat_room(
    State(state): State<AppState>,
    Json(req): Json<CreateChatRoomRequest>,
) -> Json<StatusResponse> {
    Json(
        state
            .service
            .edit_chat_room(&req.username, &req.password, &req.path, &req.participants)
            .await,
    )
}

#[derive(Deserialize)]
struct RemoveChatRoomRequest {
    username: String,
    password: String,
    path: String,
}

async fn remove_chat_room(
    State(state): State<AppState>,
    Json(req): Json<RemoveChatRoomRequest>,
) -> Json<StatusResponse> {
    Json(
        state
            .service
            .remove_chat_room(&req.username, &req.password, &req.path)
            .await,
    )
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SendMessageRequest {
    username: String,
    password: String,
    fullname: String,
    recipient: String,
    text: String,
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Json<SendResponse> {
    Json(
        state
            .service
            .send_message(
                &req.username,
                &req.password,
                &req.fullname,
                &req.recipient,
                &req.text,
            )
            .await,
    )
}

#[derive(Deserialize)]
struct SendChatRoomMessageRequest {
    username: String,
    password: String,
    fullname: String,
    room: String,
    text: String,
}

async fn send_chat_room_message(
    State(state): State<AppState>,
    Json(req): Json<SendChatRoomMessageRequest>,
) -> Json<SendResponse> {
    Json(
        state
            .service
            .send_chat_room_message(
                &req.username,
                &req.password,
                &req.fullname,
                &req.room,
                &req.text,
            )
            .await,
    )
}

#[derive(Deserialize)]
struct GetMessagesRequest {
    username: String,
    password: String,
    partner: Option<String>,
    chatrooms: RoomSelector,
    since: Option<String>,
    until: Option<String>,
}

async fn get_messages(
    State(state): State<AppState>,
    Json(req): Json<GetMessagesRequest>,
) -> Json<MessagesResponse> {
    Json(
        state
            .service
            .get_messages(
                &req.username,
                &req.password,
                req.partner.as_deref(),
                &req.chatrooms,
                req.since.as_deref(),
                req.until.as_deref(),
            )
            .await,
    )
}

#[derive(Deserialize)]
struct GetNewMessagesRequest {
    username: String,
    password: String,
    since: Option<String>,
}

async fn get_new_messages(
    State(state): State<AppState>,
    Json(req): Json<GetNewMessagesRequest>,
) -> Json<MessagesResponse> {
    Json(
        state
            .service
            .get_new_messages(&req.username, &req.password, req.since.as_deref())
            .await,
    )
}

#[derive(Deserialize)]
struct GetUnclearedMessagesRequest {
    username: String,
    password: String,
    partner: Option<String>,
    chatrooms: RoomSelector,
    until: Option<String>,
    #[serde(default)]
    clear: bool,
}

async fn get_uncleared_messages(
    State(state): State<AppState>,
    Json(req): Json<GetUnclearedMessagesRequest>,
) -> Json<MessagesResponse> {
    Json(
        state
            .service
            .get_uncleared_messages(
                &req.username,
                &req.password,
                req.partner.as_deref(),
                &req.chatrooms,
                req.until.as_deref(),
                req.clear,
            )
            .await,
    )
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
