//! Integration tests for Classbook.
//!
//! [`FakeClassServer`] is an in-process axum implementation of the class
//! server's HTTP surface. Tests point a real `SessionManager` (reqwest
//! transport, file store) at it and drive the server's token state from the
//! outside: expiring access tokens, revoking refresh tokens, counting refresh
//! calls.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p classbook-integration-tests
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use classbook_client::{ClientConfig, RefreshRejectedPolicy};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// A request as the fake server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeUser {
    id: i64,
    name: String,
    email: String,
    password: String,
}

impl FakeUser {
    fn to_json(&self) -> Value {
        json!({"id": self.id, "name": self.name, "email": self.email})
    }
}

#[derive(Debug, Clone)]
struct FakeClass {
    id: i64,
    title: String,
    description: String,
    creator_id: i64,
    start_date: DateTime<Utc>,
    status: String,
    capacity: u32,
    participants: Vec<i64>,
}

impl FakeClass {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "description": self.description,
            "creator_id": self.creator_id,
            "start_date": self.start_date,
            "status": self.status,
            "capacity": self.capacity,
            "participants": self
                .participants
                .iter()
                .map(|user_id| json!({"user_id": user_id}))
                .collect::<Vec<_>>(),
        })
    }

    fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity as usize
    }
}

#[derive(Debug, Default)]
struct ServerData {
    users: Vec<FakeUser>,
    classes: Vec<FakeClass>,
    /// Access token to user id.
    access_tokens: Vec<(String, i64)>,
    /// Refresh token to user id.
    refresh_tokens: Vec<(String, i64)>,
    next_id: i64,
    next_token: u64,
    refresh_calls: usize,
    logged_out: Vec<i64>,
    requests: Vec<RecordedRequest>,
}

impl ServerData {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_pair(&mut self, user_id: i64) -> (String, String) {
        self.next_token += 1;
        let access = format!("access-{}", self.next_token);
        let refresh = format!("refresh-{}", self.next_token);
        self.access_tokens.push((access.clone(), user_id));
        self.refresh_tokens.push((refresh.clone(), user_id));
        (access, refresh)
    }

    fn record(&mut self, path: &str, headers: &HeaderMap) -> Option<String> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        self.requests.push(RecordedRequest {
            path: path.to_owned(),
            authorization: authorization.clone(),
        });
        authorization
    }

    /// Record the request and resolve its bearer token to a user id.
    fn authorize(&mut self, path: &str, headers: &HeaderMap) -> Result<i64, Response> {
        let authorization = self.record(path, headers);
        let token = authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "));

        self.access_tokens
            .iter()
            .find(|(access, _)| Some(access.as_str()) == token)
            .map(|(_, user_id)| *user_id)
            .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

type SharedData = Arc<Mutex<ServerData>>;

fn lock(data: &Mutex<ServerData>) -> MutexGuard<'_, ServerData> {
    data.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// In-process class server bound to an ephemeral localhost port.
pub struct FakeClassServer {
    base_url: Url,
    data: SharedData,
    task: JoinHandle<()>,
}

impl FakeClassServer {
    /// Bind `127.0.0.1:0` and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let data = SharedData::default();
        let app = Router::new()
            .route("/auth/signup", post(signup))
            .route("/auth/login", post(login))
            .route("/auth/token", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/class/list", get(list_classes))
            .route("/class/create", post(create_class))
            .route("/class/reserve", post(reserve_class))
            .with_state(data.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let base_url = Url::parse(&format!("http://{addr}")).map_err(std::io::Error::other)?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url,
            data,
            task,
        })
    }

    /// Base URL to hand to the client.
    #[must_use]
    pub fn base_url(&self) -> Url {
        self.base_url.clone()
    }

    /// Client configuration pointing at this server with its session stored
    /// in `state_file`.
    #[must_use]
    pub fn client_config(&self, state_file: impl Into<PathBuf>) -> ClientConfig {
        ClientConfig {
            api_url: self.base_url(),
            state_file: state_file.into(),
            http_timeout: std::time::Duration::from_secs(5),
            on_refresh_rejected: RefreshRejectedPolicy::default(),
        }
    }

    /// Create an account directly, bypassing `/auth/signup`.
    #[must_use]
    pub fn add_user(&self, name: &str, email: &str, password: &str) -> i64 {
        let mut data = lock(&self.data);
        let id = data.next_id();
        data.users.push(FakeUser {
            id,
            name: name.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        });
        id
    }

    /// Create a class directly, bypassing `/class/create`.
    #[must_use]
    pub fn add_class(&self, title: &str, start_date: DateTime<Utc>, capacity: u32) -> i64 {
        let mut data = lock(&self.data);
        let id = data.next_id();
        data.classes.push(FakeClass {
            id,
            title: title.to_owned(),
            description: String::new(),
            creator_id: 0,
            start_date,
            status: "active".to_owned(),
            capacity,
            participants: Vec::new(),
        });
        id
    }

    /// Invalidate every issued access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        lock(&self.data).access_tokens.clear();
    }

    /// Invalidate every issued refresh token.
    pub fn revoke_refresh_tokens(&self) {
        lock(&self.data).refresh_tokens.clear();
    }

    /// Number of `/auth/token` calls received.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        lock(&self.data).refresh_calls
    }

    /// User ids received by `/auth/logout`.
    #[must_use]
    pub fn logged_out(&self) -> Vec<i64> {
        lock(&self.data).logged_out.clone()
    }

    /// Every request received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.data).requests.clone()
    }

    /// Requests received for `path`.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    /// User ids holding a seat in `class_id`.
    #[must_use]
    pub fn participants(&self, class_id: i64) -> Vec<i64> {
        lock(&self.data)
            .classes
            .iter()
            .find(|class| class.id == class_id)
            .map(|class| class.participants.clone())
            .unwrap_or_default()
    }
}

impl Drop for FakeClassServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Deserialize)]
struct SignupBody {
    name: String,
    email: String,
    password: String,
}

async fn signup(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Json(body): Json<SignupBody>,
) -> Response {
    let mut data = lock(&data);
    data.record("/auth/signup", &headers);

    if data.users.iter().any(|user| user.email == body.email) {
        return error(StatusCode::CONFLICT, "Email already registered");
    }

    let id = data.next_id();
    let user = FakeUser {
        id,
        name: body.name,
        email: body.email,
        password: body.password,
    };
    let response = json!({ "user": user.to_json() });
    data.users.push(user);
    (StatusCode::CREATED, Json(response)).into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Response {
    let mut data = lock(&data);
    data.record("/auth/login", &headers);

    let Some(user) = data
        .users
        .iter()
        .find(|user| user.email == body.email && user.password == body.password)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid email or password");
    };

    let (access, refresh) = data.issue_pair(user.id);
    Json(json!({
        "accessToken": access,
        "refreshToken": refresh,
        // The real server sends ids as strings here.
        "user": {"id": user.id.to_string(), "name": user.name, "email": user.email},
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Json(body): Json<RefreshBody>,
) -> Response {
    let mut data = lock(&data);
    data.record("/auth/token", &headers);
    data.refresh_calls += 1;

    let Some(position) = data
        .refresh_tokens
        .iter()
        .position(|(token, _)| *token == body.refresh_token)
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    };

    // Refresh tokens rotate: the presented one is spent.
    let (_, user_id) = data.refresh_tokens.swap_remove(position);
    let (access, refresh) = data.issue_pair(user_id);
    Json(json!({ "accessToken": access, "refreshToken": refresh })).into_response()
}

#[derive(Deserialize)]
struct LogoutBody {
    user_id: i64,
}

async fn logout(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Json(body): Json<LogoutBody>,
) -> Response {
    let mut data = lock(&data);
    if let Err(response) = data.authorize("/auth/logout", &headers) {
        return response;
    }

    data.logged_out.push(body.user_id);
    data.access_tokens.retain(|(_, user_id)| *user_id != body.user_id);
    data.refresh_tokens.retain(|(_, user_id)| *user_id != body.user_id);
    Json(json!({ "message": "Logged out" })).into_response()
}

#[derive(Deserialize)]
struct ListParams {
    date: Option<NaiveDate>,
}

async fn list_classes(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    let mut data = lock(&data);
    if let Err(response) = data.authorize("/class/list", &headers) {
        return response;
    }

    let classes: Vec<Value> = data
        .classes
        .iter()
        .filter(|class| {
            params
                .date
                .is_none_or(|date| class.start_date.date_naive() == date)
        })
        .map(FakeClass::to_json)
        .collect();
    Json(Value::Array(classes)).into_response()
}

#[derive(Deserialize)]
struct CreateClassBody {
    title: String,
    creator_id: i64,
    start_date: DateTime<Utc>,
    #[serde(default)]
    description: String,
    status: String,
    capacity: u32,
}

async fn create_class(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Json(body): Json<CreateClassBody>,
) -> Response {
    let mut data = lock(&data);
    if let Err(response) = data.authorize("/class/create", &headers) {
        return response;
    }

    let id = data.next_id();
    let class = FakeClass {
        id,
        title: body.title,
        description: body.description,
        creator_id: body.creator_id,
        start_date: body.start_date,
        status: body.status,
        capacity: body.capacity,
        participants: Vec::new(),
    };
    let response = class.to_json();
    data.classes.push(class);
    (StatusCode::CREATED, Json(response)).into_response()
}

#[derive(Deserialize)]
struct ReserveBody {
    class_id: i64,
    user_id: i64,
}

async fn reserve_class(
    State(data): State<SharedData>,
    headers: HeaderMap,
    Json(body): Json<ReserveBody>,
) -> Response {
    let mut data = lock(&data);
    if let Err(response) = data.authorize("/class/reserve", &headers) {
        return response;
    }

    let Some(class) = data.classes.iter_mut().find(|class| class.id == body.class_id) else {
        return error(StatusCode::NOT_FOUND, "Class not found");
    };
    if class.participants.contains(&body.user_id) {
        return error(StatusCode::CONFLICT, "Already reserved");
    }
    if class.is_full() {
        return error(StatusCode::BAD_REQUEST, "Class is full");
    }

    class.participants.push(body.user_id);
    Json(class.to_json()).into_response()
}
