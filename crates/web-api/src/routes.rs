use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        ws::WebSocketUpgrade,
        Path, Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::{ApplicationError, SendMessageRequest};
use domain::{ConversationId, Message, UserId};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    body: String,
}

#[derive(Debug, Serialize)]
struct MarkReadResponse {
    updated: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresenceResponse {
    conversation_id: ConversationId,
    members: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations/{conversation_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/{conversation_id}/read", put(mark_read))
        .route("/conversations/{conversation_id}/presence", get(presence))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn conversation_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::bad_request("conversation id must be a UUID"))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(sender_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SendMessagePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let conversation_id = conversation_id(path)?;
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            // 非参与者即使请求体无效也只看到 403
            state.chat_service.authorize(conversation_id, sender_id).await?;
            return Err(ApiError::bad_request(rejection.body_text()));
        }
    };

    let message = state
        .chat_service
        .send_message(SendMessageRequest {
            conversation_id,
            sender_id,
            body: payload.body,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let conversation_id = conversation_id(path)?;
    let messages = state
        .chat_service
        .list_messages(conversation_id, requester_id)
        .await?;

    Ok(Json(messages))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(reader_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let conversation_id = conversation_id(path)?;
    let updated = state
        .chat_service
        .mark_read(conversation_id, reader_id)
        .await?;

    Ok(Json(MarkReadResponse { updated }))
}

async fn presence(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let conversation_id = conversation_id(path)?;
    let members = state
        .chat_service
        .presence_snapshot(conversation_id, requester_id)
        .await?;

    Ok(Json(PresenceResponse {
        conversation_id: ConversationId::from(conversation_id),
        members,
    }))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or(ApplicationError::Authentication("missing token"))?;
    let claims = state.jwt_service.verify_token(&token)?;

    // 升级前订阅，保证加入房间后的广播不会丢失
    let connection = WebSocketConnection::new(state, UserId::from(claims.user_id));
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}
