//! Who is on the other end of a request: an account (session cookie) or an
//! incognito visitor (`isPrivate=true` cookie).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use std::collections::HashMap;

use super::AppState;
use crate::auth::{parse_cookies, INCOGNITO_COOKIE, SESSION_COOKIE};
use crate::error::ApiError;
use crate::store::types::User;
use crate::store::users::find_user_by_id;

#[derive(Debug, Clone)]
pub enum SessionKind {
    Authenticated(User),
    Incognito,
}

fn request_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(parse_cookies)
        .collect()
}

/// Resolve the session token cookie to a stored user.
async fn authenticate(state: &AppState, cookies: &HashMap<String, String>) -> Result<User, ApiError> {
    let token = cookies
        .get(SESSION_COOKIE)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("authentication required: no token provided".into()))?;

    let claims = state.tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected session token");
        ApiError::Unauthorized("unauthorised, login first".into())
    })?;

    let user_id = claims.sub;
    state
        .chat
        .with_db(move |conn| find_user_by_id(conn, &user_id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user not found".into()))
}

/// Decide how a socket handshake is treated. Incognito wins over a token.
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<SessionKind, ApiError> {
    let cookies = request_cookies(headers);
    if cookies.get(INCOGNITO_COOKIE).map(String::as_str) == Some("true") {
        return Ok(SessionKind::Incognito);
    }
    authenticate(state, &cookies).await.map(SessionKind::Authenticated)
}

/// Extractor for handlers that require a logged-in user.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = request_cookies(&parts.headers);
        authenticate(state, &cookies).await.map(CurrentUser)
    }
}
