//! Minimal in-process stand-in for the monitoring server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::Mutex;
use vigil_model::{Category, ChangeEvent, MonitoredPath};

const SESSION_COOKIE: &str = "session=stub-session";
pub const USERNAME: &str = "operator";
pub const PASSWORD: &str = "secret";

#[derive(Default)]
pub struct StubOptions {
    pub paths: Vec<MonitoredPath>,
    pub categories: Vec<Category>,
    pub require_session: bool,
    pub fail_reports: bool,
}

#[derive(Clone)]
struct AppState {
    paths: Arc<Vec<MonitoredPath>>,
    categories: Arc<Vec<Category>>,
    events: Arc<Mutex<Vec<ChangeEvent>>>,
    require_session: bool,
    fail_reports: bool,
}

pub struct StubServer {
    pub addr: SocketAddr,
    pub events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl StubServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().await.clone()
    }

    /// Poll the captured events until `predicate` matches one, or time out.
    pub async fn wait_for_event(
        &self,
        predicate: impl Fn(&ChangeEvent) -> bool,
        timeout: std::time::Duration,
    ) -> Option<ChangeEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.events.lock().await.iter().find(|event| predicate(event)) {
                return Some(event.clone());
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

pub async fn spawn(options: StubOptions) -> StubServer {
    let events = Arc::new(Mutex::new(Vec::new()));
    let state = AppState {
        paths: Arc::new(options.paths),
        categories: Arc::new(options.categories),
        events: Arc::clone(&events),
        require_session: options.require_session,
        fail_reports: options.fail_reports,
    };

    let app = Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(|| async { StatusCode::OK }))
        .route("/api/paths", get(paths))
        .route("/api/categories", get(categories))
        .route("/api/log_event", post(log_event))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubServer { addr, events }
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|cookies| cookies.contains(SESSION_COOKIE))
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    !state.require_session || has_session(headers)
}

async fn login_page() -> &'static str {
    "login"
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.username == USERNAME && form.password == PASSWORD {
        ([(header::SET_COOKIE, SESSION_COOKIE)], "ok").into_response()
    } else {
        // The real server re-renders the login form with a flash message.
        (StatusCode::OK, "invalid credentials").into_response()
    }
}

async fn paths(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    axum::Json(state.paths.as_ref().clone()).into_response()
}

async fn categories(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    axum::Json(state.categories.as_ref().clone()).into_response()
}

async fn log_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(event): axum::Json<ChangeEvent>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.fail_reports {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    state.events.lock().await.push(event);
    StatusCode::OK.into_response()
}
