//! Shared fixtures for the integration tests.
//!
//! - [`ScriptedApi`]: in-memory backend implementing `NotificationApi`
//! - [`RecordingNotifier`]: desktop notifier that remembers what it showed
//! - [`TestBackend`]: real axum server with the REST routes and push endpoint

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use parking_lot::Mutex;
use schoolbell::{
    BellError, ClientConfig, CredentialStore, Credentials, DesktopNotifier, Notification,
    NotificationApi, NotificationKind, PermissionState, ReconnectPolicy, Result,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};

pub const TENANT: &str = "t1";
pub const USER: &str = "u1";
pub const TOKEN: &str = "test-token";

/// Unread notification for the test user.
pub fn note(id: &str) -> Notification {
    Notification::new(
        id,
        TENANT,
        USER,
        NotificationKind::Assignment,
        format!("Title {id}"),
        format!("Message {id}"),
    )
}

pub fn credentials() -> CredentialStore {
    CredentialStore::with_credentials(
        Credentials::new(TOKEN, USER, TENANT).expect("valid credentials"),
    )
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Await `future` with a two second limit.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    MarkRead(String),
    MarkAllRead,
    Delete(String),
}

/// Handles for a call that is parked until released.
pub struct Gate {
    pub entered: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

struct Parked {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl Parked {
    fn gate(slot: &Mutex<Option<Parked>>) -> Gate {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *slot.lock() = Some(Parked {
            entered: entered_tx,
            release: release_rx,
        });
        Gate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    /// Wait here if a gate is set on `slot`.
    async fn wait(slot: &Mutex<Option<Parked>>) {
        let parked = slot.lock().take();
        if let Some(parked) = parked {
            let _ = parked.entered.send(());
            let _ = parked.release.await;
        }
    }
}

/// In-memory backend with the same not-found rules as the real one.
#[derive(Default)]
pub struct ScriptedApi {
    records: Mutex<Vec<Notification>>,
    calls: Mutex<Vec<Call>>,
    fail_list: AtomicBool,
    fail_mutations: AtomicBool,
    parked_list: Mutex<Option<Parked>>,
    parked_mutation: Mutex<Option<Parked>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_records(records: Vec<Notification>) -> Arc<Self> {
        let api = Self::default();
        *api.records.lock() = records;
        Arc::new(api)
    }

    /// Store a record server-side, newest first.
    pub fn insert(&self, notification: Notification) {
        self.records.lock().insert(0, notification);
    }

    pub fn records(&self) -> Vec<Notification> {
        self.records.lock().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Park the next `list` call until the returned gate is released.
    pub fn hold_next_list(&self) -> Gate {
        Parked::gate(&self.parked_list)
    }

    /// Park the next mark-read, mark-all-read or delete until released.
    ///
    /// The server-side change is applied only once the gate opens.
    pub fn hold_next_mutation(&self) -> Gate {
        Parked::gate(&self.parked_mutation)
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(&self, flag: &AtomicBool, route: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(BellError::Status {
                status: 500,
                url: route.to_string(),
            });
        }
        Ok(())
    }

    fn not_found(route: String) -> BellError {
        BellError::Status {
            status: 404,
            url: route,
        }
    }
}

#[async_trait]
impl NotificationApi for ScriptedApi {
    async fn list(&self) -> Result<Vec<Notification>> {
        self.record(Call::List);
        self.check(&self.fail_list, "/notifications")?;
        // The response is computed now and delivered when released.
        let records = self.records();
        Parked::wait(&self.parked_list).await;
        Ok(records)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.record(Call::MarkRead(id.to_string()));
        Parked::wait(&self.parked_mutation).await;
        self.check(&self.fail_mutations, "/notifications/read")?;
        let mut records = self.records.lock();
        match records.iter_mut().find(|n| n.id == id && !n.read) {
            Some(n) => {
                n.read = true;
                Ok(())
            }
            None => Err(Self::not_found(format!("/notifications/{id}/read"))),
        }
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.record(Call::MarkAllRead);
        Parked::wait(&self.parked_mutation).await;
        self.check(&self.fail_mutations, "/notifications/read-all")?;
        for n in self.records.lock().iter_mut() {
            n.read = true;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.record(Call::Delete(id.to_string()));
        Parked::wait(&self.parked_mutation).await;
        self.check(&self.fail_mutations, "/notifications")?;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|n| n.id != id);
        if records.len() == before {
            return Err(Self::not_found(format!("/notifications/{id}")));
        }
        Ok(())
    }
}

/// Desktop notifier that records every alert it is asked to show.
pub struct RecordingNotifier {
    permission: Mutex<PermissionState>,
    answer: PermissionState,
    requests: AtomicUsize,
    shown: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new(permission: PermissionState, answer: PermissionState) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(permission),
            answer,
            requests: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        })
    }

    pub fn granted() -> Arc<Self> {
        Self::new(PermissionState::Granted, PermissionState::Granted)
    }

    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.lock() = state;
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Ids of the notifications shown so far.
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl DesktopNotifier for RecordingNotifier {
    fn permission(&self) -> PermissionState {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> PermissionState {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut permission = self.permission.lock();
        if *permission == PermissionState::Default {
            *permission = self.answer;
        }
        *permission
    }

    fn show(&self, notification: &Notification) {
        self.shown.lock().push(notification.id.clone());
    }
}

#[derive(Debug, Clone)]
enum ServerFrame {
    Text(String),
    Close,
}

struct BackendState {
    token: String,
    records: Mutex<Vec<Notification>>,
    frames: broadcast::Sender<ServerFrame>,
    accepted: AtomicUsize,
    rejected: AtomicUsize,
    open: AtomicUsize,
    pings: AtomicUsize,
}

/// Real HTTP/WebSocket server bound to an ephemeral local port.
#[derive(Clone)]
pub struct TestBackend {
    state: Arc<BackendState>,
    base_url: String,
}

impl TestBackend {
    pub async fn spawn() -> Self {
        let (frames, _) = broadcast::channel(64);
        let state = Arc::new(BackendState {
            token: TOKEN.to_string(),
            records: Mutex::new(Vec::new()),
            frames,
            accepted: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/ws/notifications", get(stream_handler))
            .route("/api/notifications", get(list_handler))
            .route("/api/notifications/read-all", put(read_all_handler))
            .route("/api/notifications/{id}", axum::routing::delete(delete_handler))
            .route("/api/notifications/{id}/read", put(read_handler))
            .route("/api/auth/login", post(login_handler))
            .route("/api/auth/me", get(me_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self {
            state,
            base_url: format!("http://{addr}"),
        }
    }

    /// Client config with short timers suitable for tests.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url)
            .with_heartbeat_interval(Duration::from_millis(50))
            .with_request_timeout(Duration::from_secs(2))
            .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(50)))
    }

    pub fn insert(&self, notification: Notification) {
        self.state.records.lock().insert(0, notification);
    }

    pub fn records(&self) -> Vec<Notification> {
        self.state.records.lock().clone()
    }

    /// Push a notification to every open connection.
    pub fn push(&self, notification: &Notification) {
        let text = serde_json::to_string(notification).expect("serialize notification");
        self.push_raw(&text);
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.state.frames.send(ServerFrame::Text(text.to_string()));
    }

    /// Close every open connection from the server side.
    pub fn close_all(&self) {
        let _ = self.state.frames.send(ServerFrame::Close);
    }

    /// Upgrades accepted so far.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Upgrades refused for a bad token.
    pub fn rejected(&self) -> usize {
        self.state.rejected.load(Ordering::SeqCst)
    }

    /// Connections currently being served.
    pub fn open(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }
}

fn authorized(state: &BackendState, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", state.token);
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

async fn stream_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<BackendState>>,
) -> Response {
    if params.get("token") != Some(&state.token) {
        state.rejected.fetch_add(1, Ordering::SeqCst);
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.accepted.fetch_add(1, Ordering::SeqCst);
    // Subscribe before the handshake completes so no push is missed.
    let frames = state.frames.subscribe();
    ws.on_upgrade(move |socket| serve_socket(socket, frames, state))
}

async fn serve_socket(
    mut socket: WebSocket,
    mut frames: broadcast::Receiver<ServerFrame>,
    state: Arc<BackendState>,
) {
    state.open.fetch_add(1, Ordering::SeqCst);
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(ServerFrame::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(ServerFrame::Close) | Err(_) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                    state.pings.fetch_add(1, Ordering::SeqCst);
                    let _ = socket.send(Message::Text("pong".into())).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    state.open.fetch_sub(1, Ordering::SeqCst);
}

async fn list_handler(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.records.lock().clone()).into_response()
}

async fn read_handler(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut records = state.records.lock();
    match records.iter_mut().find(|n| n.id == id && !n.read) {
        Some(n) => {
            n.read = true;
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn read_all_handler(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> StatusCode {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    for n in state.records.lock().iter_mut() {
        n.read = true;
    }
    StatusCode::OK
}

async fn delete_handler(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut records = state.records.lock();
    let before = records.len();
    records.retain(|n| n.id != id);
    if records.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}

async fn login_handler(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if body["password"] != "secret" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({ "access_token": state.token, "token_type": "bearer" }))
        .into_response()
}

async fn me_handler(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({
        "id": USER,
        "email": "teacher@school.test",
        "full_name": "Test Teacher",
        "role": "teacher",
        "tenant_id": TENANT,
    }))
    .into_response()
}
