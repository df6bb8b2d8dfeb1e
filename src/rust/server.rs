//! The interactive web surface.
//!
//! Endpoints:
//! - GET  /         - Render the page for the caller's session
//! - POST /analyze  - Classify the submitted `text`
//! - POST /feedback - Record `choice=yes|no` for the current prediction
//! - GET  /api/session - The caller's session state as JSON
//! - GET  /health   - Health check (returns "ok")
//!
//! Sessions are keyed by the `session_id` cookie and dropped after sitting
//! idle for the store's TTL. Form posts redirect back to `/`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::controller::{Event, InteractionController, Outcome};
use crate::metrics::MetricsError;
use crate::session::{FeedbackChoice, SessionId, SessionStore};
use crate::ui::render_page;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: InteractionController,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(controller: InteractionController) -> Self {
        Self {
            controller,
            sessions: Arc::new(SessionStore::new()),
        }
    }

    /// Like [`AppState::new`], dropping sessions idle for longer than `ttl`.
    pub fn with_session_ttl(controller: InteractionController, ttl: Duration) -> Self {
        Self {
            controller,
            sessions: Arc::new(SessionStore::with_ttl(ttl)),
        }
    }
}

/// How often idle sessions are swept: a quarter of the TTL, at least once a second.
fn sweep_period(ttl: Duration) -> Duration {
    (ttl / 4).max(Duration::from_secs(1))
}

#[derive(Debug, Deserialize)]
struct AnalyzeForm {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct FeedbackForm {
    choice: FeedbackChoice,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze))
        .route("/feedback", post(feedback))
        .route("/api/session", get(session_json))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serves the UI on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    log::info!("UI available at http://{}/", listener.local_addr()?);
    let ttl = state.sessions.ttl();
    let sweeper = SessionStore::spawn_sweeper(&state.sessions, sweep_period(ttl));
    log::info!("Sessions expire after {:?} idle", ttl);

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await;
    sweeper.abort();
    result?;
    Ok(())
}

/// Extracts the session id from the `Cookie` header, if any.
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find_map(|id| Uuid::parse_str(id.trim()).ok())
}

fn with_session_cookie(mut response: Response, id: SessionId, created: bool) -> Response {
    if created {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => log::error!("Invalid session cookie: {}", e),
        }
    }
    response
}

/// GET /health - Health check endpoint
async fn health_check() -> impl IntoResponse {
    "ok"
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_from_headers(&headers));
    let page = render_page(&*session.lock().await);
    with_session_cookie(Html(page).into_response(), id, created)
}

/// GET /api/session - Current session state, for scripting against the demo
async fn session_json(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_from_headers(&headers));
    let snapshot = session.lock().await.clone();
    with_session_cookie(Json(snapshot).into_response(), id, created)
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AnalyzeForm>,
) -> Response {
    dispatch(state, headers, Event::Analyze { text: form.text }).await
}

async fn feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<FeedbackForm>,
) -> Response {
    dispatch(state, headers, Event::Feedback(form.choice)).await
}

async fn dispatch(state: AppState, headers: HeaderMap, event: Event) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_from_headers(&headers));

    // Held across the classifier call so this session's events stay ordered
    let mut guard = session.lock_owned().await;
    let controller = state.controller.clone();
    let result = tokio::task::spawn_blocking(move || controller.handle(&mut guard, event)).await;

    match result {
        Ok(outcome) => {
            match &outcome {
                Outcome::Classified(p) => {
                    log::info!("Session {}: {} ({:.3})", id, p.label, p.confidence)
                }
                Outcome::ClassificationFailed(msg) => log::warn!("Session {}: {}", id, msg),
                Outcome::FeedbackAccepted(choice) => log::info!("Session {}: feedback {:?}", id, choice),
                Outcome::FeedbackIgnored => log::debug!("Session {}: feedback ignored", id),
            }
            with_session_cookie(Redirect::to("/").into_response(), id, created)
        }
        Err(e) => {
            log::error!("Interaction task for session {} failed: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Interaction failed").into_response()
        }
    }
}
