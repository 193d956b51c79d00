use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use sarvis_core::voice::{LogNotifier, MediaController};
use sarvis_core::*;
use serde_json::{Value, json};

#[derive(Default)]
struct Backend {
    valid_access: Mutex<String>,
    refresh_ok: AtomicBool,
    refresh_calls: AtomicUsize,
    refresh_had_bearer: AtomicBool,
    presets: Mutex<Vec<Value>>,
}

type Shared = Arc<Backend>;

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] != "Passw0rd!" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "wrong password" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "uid": "uid-1",
            "user_id": 1,
            "login_id": body["login_id"],
            "nickname": "robo",
            "email": "x@y.z",
            "tokens": { "access": "access-1", "refresh": "refresh-1" },
            "presets": []
        })),
    )
}

async fn refresh(State(backend): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key("authorization") {
        backend.refresh_had_bearer.store(true, Ordering::SeqCst);
    }
    if !backend.refresh_ok.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "token_not_valid" })));
    }
    *backend.valid_access.lock().unwrap() = "access-2".to_string();
    (StatusCode::OK, Json(json!({ "access": "access-2" })))
}

fn authorized(backend: &Backend, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", backend.valid_access.lock().unwrap());
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

async fn list_presets(State(backend): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&backend, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "expired" })));
    }
    let presets = backend.presets.lock().unwrap().clone();
    (
        StatusCode::OK,
        Json(json!({ "success": true, "count": presets.len(), "presets": presets })),
    )
}

async fn save_preset(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&backend, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "expired" })));
    }
    let mut presets = backend.presets.lock().unwrap();
    let id = presets.len() as i64 + 1;
    body["preset_id"] = json!(id);
    presets.push(body);
    (StatusCode::OK, Json(json!({ "success": true, "preset_id": id })))
}

async fn logout() -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "boom" })))
}

async fn spawn_backend(backend: Shared) -> String {
    let app = Router::new()
        .route("/api/login/password/", post(login))
        .route("/api/auth/refresh/", post(refresh))
        .route("/api/auth/logout/", post(logout))
        .route("/api/preset/list/", get(list_presets))
        .route("/api/preset/save/", post(save_preset))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct NoMedia;

impl MediaController for NoMedia {
    fn open(&self) -> anyhow::Result<()> {
        Ok(())
    }
    fn play(&self) -> anyhow::Result<()> {
        Ok(())
    }
    fn pause(&self) -> anyhow::Result<()> {
        Ok(())
    }
    fn seek_forward(&self) -> anyhow::Result<()> {
        Ok(())
    }
    fn seek_backward(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn signed_in(backend: Shared) -> (AuthService, UserStorage) {
    let mut config = Config::default();
    config.backend.base_url = spawn_backend(backend).await;

    let storage = UserStorage::in_memory();
    let (mut auth, _events) =
        AuthService::new(&config, storage.clone(), Arc::new(LogNotifier), Arc::new(NoMedia)).unwrap();
    auth.sign_in_with_password("owner1", "Passw0rd!").await.unwrap();
    (auth, storage)
}

/// An expired access token is refreshed once and the request replayed
#[tokio::test]
async fn test_401_refreshes_once_and_retries() {
    let backend = Shared::default();
    *backend.valid_access.lock().unwrap() = "access-2".to_string();
    backend.refresh_ok.store(true, Ordering::SeqCst);

    let (mut auth, storage) = signed_in(backend.clone()).await;
    let presets = auth.refresh_presets().await.unwrap();

    assert!(presets.is_empty());
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(!backend.refresh_had_bearer.load(Ordering::SeqCst));
    assert_eq!(storage.access_token().as_deref(), Some("access-2"));
    assert_eq!(storage.refresh_token().as_deref(), Some("refresh-1"));
}

/// A failed refresh wipes the stored login
#[tokio::test]
async fn test_failed_refresh_expires_session() {
    let backend = Shared::default();
    *backend.valid_access.lock().unwrap() = "never-issued".to_string();

    let (auth, storage) = signed_in(backend.clone()).await;
    assert!(storage.user().is_some());

    let err = auth.api().list_presets(None).await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired));
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(storage.user().is_none());
    assert!(storage.access_token().is_none());
}

/// Wrong credentials surface as a status error and leave storage empty
#[tokio::test]
async fn test_login_rejected() {
    let mut config = Config::default();
    config.backend.base_url = spawn_backend(Shared::default()).await;
    let storage = UserStorage::in_memory();
    let (mut auth, _events) =
        AuthService::new(&config, storage.clone(), Arc::new(LogNotifier), Arc::new(NoMedia)).unwrap();

    let err = auth.sign_in_with_password("owner1", "Wrong0ne!").await.unwrap_err();
    match err {
        sarvis_core::auth::AuthError::Api(ApiError::Status { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "wrong password");
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    assert!(storage.user().is_none());
}

/// Save -> list -> select: the persisted selection is the saved preset
#[tokio::test]
async fn test_preset_selection_round_trip() {
    let backend = Shared::default();
    *backend.valid_access.lock().unwrap() = "access-1".to_string();

    let (mut auth, storage) = signed_in(backend).await;
    let servos = ServoPositions {
        servo1: 10.0,
        servo2: 20.0,
        servo3: 30.0,
        servo4: 40.0,
        servo5: 50.0,
        servo6: 60.0,
    };
    let saved = auth.api().save_preset("desk", servos, None).await.unwrap();
    assert_eq!(saved.preset_id, Some(1));

    let listed = auth.refresh_presets().await.unwrap().to_vec();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].servos, servos);

    auth.select_preset(listed[0].clone()).unwrap();
    assert_eq!(storage.selected_preset(), Some(listed[0].clone()));
    assert_eq!(storage.presets(), listed);
}

/// Logout failing on the server still clears everything locally
#[tokio::test]
async fn test_sign_out_is_best_effort() {
    let backend = Shared::default();
    *backend.valid_access.lock().unwrap() = "access-1".to_string();

    let (mut auth, storage) = signed_in(backend).await;
    auth.sign_out().await.unwrap();

    assert!(!auth.snapshot().is_authenticated());
    assert!(storage.user().is_none());
    assert!(storage.tokens().is_none());
    assert!(storage.refresh_token().is_none());
}
