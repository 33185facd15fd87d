//! The chat socket.
//!
//! Every frame is JSON `{"event": <name>, "data": <payload>}`. Frames from one
//! connection are handled one at a time, so a turn's reply is stored before the
//! next turn loads its history.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use super::{resolve_session, AppState, SessionKind};
use crate::conversation::incognito::{IncognitoReply, IncognitoSession, LIMIT_MESSAGE};
use crate::conversation::ConversationError;
use crate::error::ApiResult;
use crate::store::types::User;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// A turn in a persisted chat. Requires an authenticated connection.
    #[serde(rename = "ai-message")]
    AiMessage { chat: String, content: String },
    /// A turn in incognito mode.
    #[serde(rename = "ai-temp-message")]
    AiTempMessage { content: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "aiResponse")]
    AiResponse { response: String },
    #[serde(rename = "tempResponse")]
    TempResponse(String),
    #[serde(rename = "limitReached")]
    LimitReached { message: String },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

enum Mode {
    Authenticated(User),
    Incognito(IncognitoSession),
}

/// The socket closed while we were writing to it.
struct Disconnected;

/// Resolve the handshake cookies, then upgrade. Unauthenticated handshakes get 401.
pub async fn socket_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let session = resolve_session(&state, &headers).await?;
    Ok(ws.on_upgrade(move |socket| run_socket(socket, state, session)))
}

async fn run_socket(mut socket: WebSocket, state: AppState, session: SessionKind) {
    let mut mode = match session {
        SessionKind::Authenticated(user) => {
            tracing::info!(user = %user.id, "socket connected");
            Mode::Authenticated(user)
        }
        SessionKind::Incognito => {
            tracing::info!("incognito socket connected");
            Mode::Incognito(IncognitoSession::new(state.config.incognito.message_quota))
        }
    };

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "socket read failed");
                break;
            }
        };

        let result = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => handle_event(&mut socket, &state, &mut mode, event).await,
            Err(e) => {
                tracing::debug!(error = %e, "malformed socket frame");
                send(&mut socket, &ServerEvent::error(format!("malformed message: {e}"))).await
            }
        };
        if result.is_err() {
            break;
        }
    }

    tracing::info!("socket disconnected");
}

async fn handle_event(
    socket: &mut WebSocket,
    state: &AppState,
    mode: &mut Mode,
    event: ClientEvent,
) -> Result<(), Disconnected> {
    match (mode, event) {
        (Mode::Authenticated(user), ClientEvent::AiMessage { chat, content }) => {
            let turn = match state.chat.respond(user, &chat, &content).await {
                Ok(turn) => turn,
                Err(e) => return send(socket, &turn_error(&e)).await,
            };

            send(
                socket,
                &ServerEvent::AiResponse {
                    response: turn.reply.clone(),
                },
            )
            .await?;

            if let Err(e) = state.chat.remember_reply(user, &turn).await {
                tracing::error!(chat = %turn.chat_id, error = %e, "failed to remember reply");
                send(socket, &ServerEvent::error("the reply could not be saved")).await?;
            }
            Ok(())
        }
        (Mode::Incognito(session), ClientEvent::AiTempMessage { content }) => {
            let model = state.chat.model();
            match session.respond(model.as_ref(), &content).await {
                Ok(IncognitoReply::Reply(reply)) => send(socket, &ServerEvent::TempResponse(reply)).await,
                Ok(IncognitoReply::LimitReached(message)) => {
                    send(
                        socket,
                        &ServerEvent::LimitReached {
                            message: message.to_string(),
                        },
                    )
                    .await
                }
                Err(e) => send(socket, &turn_error(&e)).await,
            }
        }
        (Mode::Incognito(_), ClientEvent::AiMessage { .. }) => {
            send(socket, &ServerEvent::error(LIMIT_MESSAGE)).await
        }
        (Mode::Authenticated(_), ClientEvent::AiTempMessage { .. }) => {
            send(
                socket,
                &ServerEvent::error("incognito messages need an incognito connection"),
            )
            .await
        }
    }
}

/// Client-facing text for a failed turn. Storage details stay in the log.
fn turn_error(err: &ConversationError) -> ServerEvent {
    match err {
        ConversationError::EmptyMessage | ConversationError::ChatNotFound(_) => {
            ServerEvent::error(err.to_string())
        }
        ConversationError::Embedding(e) => {
            tracing::error!(error = %e, "turn aborted: embedding failed");
            ServerEvent::error(crate::llm::fallback_reply(e))
        }
        ConversationError::Storage(e) => {
            tracing::error!(error = %format!("{e:#}"), "turn aborted: storage failed");
            ServerEvent::error("something went wrong, please try again")
        }
    }
}

async fn send(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), Disconnected> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize socket event");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|e| {
        tracing::debug!(error = %e, "socket write failed");
        Disconnected
    })
}
