//! REST handlers: accounts, chats, and message history.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{AppState, CurrentUser};
use crate::auth::{clear_session_cookie, hash_password, session_cookie, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::store::chats::{create_chat as insert_chat, find_owned_chat, list_chats as load_chats};
use crate::store::messages::list_messages as load_messages;
use crate::store::types::{Chat, NewUser, User};
use crate::store::users::{create_user, find_user_by_email, EmailTaken};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// ── Request / response bodies ────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FullName {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: FullName,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesRequest {
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserBody {
    #[serde(rename = "_id")]
    id: String,
    email: String,
    full_name: FullName,
}

impl From<&User> for UserBody {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            full_name: FullName {
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    message: &'static str,
    user: UserBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    last_activity: String,
    user: String,
}

impl From<Chat> for ChatBody {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id,
            title: chat.title,
            last_activity: chat.last_activity,
            user: chat.user_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatSummary {
    #[serde(rename = "_id")]
    id: String,
    title: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    text: String,
    role: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Attach a fresh session cookie for `user` to `body`.
fn with_session(state: &AppState, status: StatusCode, user: &User, message: &'static str) -> ApiResult<Response> {
    let token = state
        .tokens
        .issue(&user.id)
        .map_err(|e| anyhow::anyhow!("failed to sign token: {e}"))?;
    let max_age = state.config.auth.token_ttl_hours * 3600;
    let cookie = session_cookie(&token, state.config.auth.secure_cookies, max_age);

    let body = AuthResponse {
        message,
        user: UserBody::from(user),
    };
    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Response> {
    let email = req.email.trim().to_string();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".into()));
    }
    if req.full_name.first_name.trim().is_empty() || req.full_name.last_name.trim().is_empty() {
        return Err(ApiError::BadRequest("first and last name are required".into()));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("hash task failed: {e}"))??;

    let name = req.full_name;
    let created = state
        .chat
        .with_db(move |conn| {
            create_user(
                conn,
                &NewUser {
                    email: &email,
                    first_name: name.first_name.trim(),
                    last_name: name.last_name.trim(),
                    password_hash: &password_hash,
                },
            )
        })
        .await;

    let user = match created {
        Ok(user) => user,
        Err(e) if e.downcast_ref::<EmailTaken>().is_some() => {
            return Err(ApiError::BadRequest("user already exists with this email".into()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user = %user.id, "user registered");
    with_session(&state, StatusCode::CREATED, &user, "user created successfully")
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let email = req.email;
    let user = state
        .chat
        .with_db(move |conn| find_user_by_email(conn, &email))
        .await?
        .ok_or_else(|| ApiError::BadRequest(INVALID_CREDENTIALS.into()))?;

    let (password, stored_hash) = (req.password, user.password_hash.clone());
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| anyhow::anyhow!("verify task failed: {e}"))?;
    if !valid {
        tracing::info!(user = %user.id, "login rejected");
        return Err(ApiError::BadRequest(INVALID_CREDENTIALS.into()));
    }

    tracing::info!(user = %user.id, "user logged in");
    with_session(&state, StatusCode::OK, &user, "user logged in successfully")
}

pub async fn logout() -> Response {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({ "message": "logged out" })),
    )
        .into_response()
}

pub async fn create_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateChatRequest>,
) -> ApiResult<Response> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("chat title must not be empty".into()));
    }

    let user_id = user.id.clone();
    let chat = state
        .chat
        .with_db(move |conn| insert_chat(conn, &user_id, &req.title))
        .await?;
    tracing::info!(user = %user.id, chat = %chat.id, "chat created");

    let body = serde_json::json!({
        "message": "chat created successfully",
        "chat": ChatBody::from(chat),
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn list_chats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let chats = state
        .chat
        .with_db(move |conn| load_chats(conn, &user.id))
        .await?;

    let chat: Vec<ChatSummary> = chats
        .into_iter()
        .map(|c| ChatSummary {
            id: c.id,
            title: c.title,
        })
        .collect();
    Ok(Json(serde_json::json!({ "chat": chat })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ListMessagesRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let chat_id = req.chat_id;
    let messages = state
        .chat
        .with_db(move |conn| {
            if find_owned_chat(conn, &chat_id, &user.id)?.is_none() {
                return Ok(None);
            }
            load_messages(conn, &chat_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("chat not found".into()))?;

    let data: Vec<MessageBody> = messages
        .into_iter()
        .map(|m| MessageBody {
            text: m.content,
            role: m.role.to_string(),
        })
        .collect();
    Ok(Json(serde_json::json!({ "data": data })))
}
