//! HTTP and WebSocket server.
//!
//! [`router`] wires the REST endpoints and the `/socket` upgrade onto shared
//! [`AppState`]; [`serve`] opens the database, builds the LLM client, and runs
//! the router until ctrl-c.

mod http;
mod session;
mod ws;

pub use session::{resolve_session, CurrentUser, SessionKind};
pub use ws::{ClientEvent, ServerEvent};

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::TokenIssuer;
use crate::config::WeirwoodConfig;
use crate::conversation::ChatService;
use crate::db;
use crate::llm::gemini::GeminiClient;
use crate::llm::Embedder;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub tokens: TokenIssuer,
    pub config: Arc<WeirwoodConfig>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/health", get(http::health))
        .route("/auth/register", post(http::register))
        .route("/auth/login", post(http::login))
        .route("/auth/logout", post(http::logout))
        .route("/chat", post(http::create_chat))
        .route("/chat/getChats", post(http::list_chats))
        .route("/messages", post(http::list_messages))
        .route("/socket", get(ws::socket_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Credentialed CORS for the configured origins. Unparsable origins are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Open storage and build the shared state from config.
pub fn build_state(config: WeirwoodConfig) -> Result<AppState> {
    config.validate()?;

    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path, config.llm.embedding_dimensions)?;
    tracing::info!(db = %db_path.display(), "database ready");

    match db::migrations::get_embedding_model(&conn)? {
        Some(stored) if stored != config.llm.embedding_model => tracing::warn!(
            stored = %stored,
            configured = %config.llm.embedding_model,
            "embedding model changed; recall quality will suffer until old memories age out"
        ),
        Some(_) => {}
        None => db::migrations::set_embedding_model(&conn, &config.llm.embedding_model)?,
    }

    let gemini = Arc::new(GeminiClient::new(&config.llm).context("failed to build LLM client")?);
    tracing::info!(model = %config.llm.model, embedding = %config.llm.embedding_model, "LLM client ready");
    ensure_vector_size(db::migrations::get_embedding_dimensions(&conn)?, gemini.as_ref())?;

    let chat = ChatService::new(
        Arc::new(Mutex::new(conn)),
        gemini.clone(),
        gemini,
        config.memory.clone(),
    );
    let tokens = TokenIssuer::new(config.auth.jwt_secret.clone(), config.auth.token_ttl_hours);

    Ok(AppState {
        chat,
        tokens,
        config: Arc::new(config),
    })
}

/// The vector table's size is fixed at creation; the embedder must produce
/// vectors of exactly that size.
fn ensure_vector_size(stored: Option<usize>, embedder: &dyn Embedder) -> Result<()> {
    match stored {
        Some(stored) if stored != embedder.dimensions() => anyhow::bail!(
            "database stores {stored}-dimensional vectors but the embedder produces {}; \
             set llm.embedding_dimensions = {stored}",
            embedder.dimensions()
        ),
        _ => Ok(()),
    }
}

/// Start the HTTP/WebSocket server and run until ctrl-c.
pub async fn serve(config: WeirwoodConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    let state = build_state(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening on http://{bind_addr} (socket at /socket)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down server");
        })
        .await?;

    Ok(())
}
