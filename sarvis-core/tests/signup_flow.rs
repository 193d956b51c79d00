use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, State};
use axum::http::Uri;
use axum::routing::{get, post};
use axum::{Json, Router};
use sarvis_core::config::{BackendConfig, DeviceConfig};
use sarvis_core::signup::{SignupDraft, SignupError};
use sarvis_core::voice::{LogNotifier, MediaController};
use sarvis_core::*;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Backend calls in arrival order: (path, body)
type Calls = Arc<Mutex<Vec<(String, Value)>>>;

async fn step(State(calls): State<Calls>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    calls.lock().unwrap().push((uri.path().to_string(), body));
    Json(json!({ "success": true, "expires_in": 300 }))
}

fn login_payload(login_id: &Value) -> Value {
    json!({
        "success": true,
        "uid": "uid-7",
        "user_id": 7,
        "login_id": login_id,
        "nickname": "robo",
        "email": "owner1@example.com",
        "tokens": { "access": "access-7", "refresh": "refresh-7" }
    })
}

async fn finish(State(calls): State<Calls>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    let payload = login_payload(&body["login_id"]);
    calls.lock().unwrap().push((uri.path().to_string(), body));
    Json(payload)
}

async fn face_login(State(calls): State<Calls>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    calls.lock().unwrap().push((uri.path().to_string(), body));
    Json(login_payload(&json!("owner1")))
}

async fn spawn_backend() -> (BackendConfig, Calls) {
    let calls = Calls::default();
    let app = Router::new()
        .route("/api/register/check-id/", post(step))
        .route("/api/register/nickname/", post(step))
        .route("/api/register/email-request/", post(step))
        .route("/api/register/email/", post(step))
        .route("/api/register/password/", post(step))
        .route("/api/register/clear-cache/", post(step))
        .route("/api/biometric/save-face/", post(step))
        .route("/api/biometric/save-voice/", post(finish))
        .route("/api/login/face/", post(face_login))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = BackendConfig {
        base_url: format!("http://{addr}"),
        ..Default::default()
    };
    (config, calls)
}

/// Drain a multipart body and count its file parts
async fn count_parts(mut multipart: Multipart) -> usize {
    let mut parts = 0;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.file_name().is_some() {
            parts += 1;
        }
        let _ = field.bytes().await.unwrap();
    }
    parts
}

async fn spawn_jetson() -> DeviceClient {
    let app = Router::new()
        .route("/", get(|| async { "SARVIS Jetson" }))
        .route(
            "/upload_face",
            post(|multipart: Multipart| async move {
                let parts = count_parts(multipart).await;
                Json(json!({ "face_vectors": vec![vec![0.5; 4]; parts] }))
            }),
        )
        .route(
            "/upload_voice",
            post(|multipart: Multipart| async move {
                count_parts(multipart).await;
                Json(json!({ "voice_vectors": [0.7, 0.8] }))
            }),
        )
        .route(
            "/login_face",
            post(|multipart: Multipart| async move {
                count_parts(multipart).await;
                Json(json!({ "face_vectors": [[0.1, 0.2]] }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = DeviceConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..Default::default()
    };
    DeviceClient::new(&config).unwrap()
}

async fn signup(storage: &UserStorage) -> (SignupFlow, Calls) {
    let (backend, calls) = spawn_backend().await;
    let device = spawn_jetson().await;
    let api = ApiClient::new(&backend, storage.clone()).unwrap();
    (SignupFlow::new(api, device, storage.clone()), calls)
}

fn paths(calls: &Calls) -> Vec<String> {
    calls.lock().unwrap().iter().map(|(path, _)| path.clone()).collect()
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

/// Every step from login id to voice enrollment, ending in login data
#[tokio::test]
async fn test_full_signup_reaches_complete() {
    let storage = UserStorage::in_memory();
    let (mut flow, calls) = signup(&storage).await;

    flow.submit_login_id("owner1").await.unwrap();
    flow.submit_nickname("robo").await.unwrap();
    flow.request_email_code("owner1@example.com").await.unwrap();
    flow.verify_email("123 456").await.unwrap();
    flow.submit_password("Passw0rd1", "Passw0rd1").await.unwrap();
    assert_eq!(storage.signup_draft().unwrap().step, SignupStep::DeviceLink);

    flow.link_device(&CancellationToken::new()).await.unwrap();
    let images = FaceImages {
        front: Some(vec![1; 32]),
        left: Some(vec![2; 32]),
        ..Default::default()
    };
    flow.enroll_face(&images).await.unwrap();
    assert_eq!(flow.step(), SignupStep::Voice);

    let resp = flow.enroll_voice(&[vec![0; 64], vec![1; 64]]).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.login_id.as_deref(), Some("owner1"));
    assert_eq!(flow.step(), SignupStep::Complete);
    assert!(storage.signup_draft().is_none());

    assert_eq!(
        paths(&calls),
        [
            "/api/register/check-id/",
            "/api/register/nickname/",
            "/api/register/email-request/",
            "/api/register/email/",
            "/api/register/password/",
            "/api/biometric/save-face/",
            "/api/biometric/save-voice/",
        ]
    );
    let calls = calls.lock().unwrap();
    assert_eq!(calls[3].1["code"], "123456");
    assert_eq!(calls[4].1["password"], "Passw0rd1");
    assert_eq!(calls[5].1["face_vectors"].as_array().unwrap().len(), 2);
    assert_eq!(calls[6].1["voice_vectors"], json!([0.7, 0.8]));
}

/// A resumed signup can finish without voice enrollment
#[tokio::test]
async fn test_skip_voice_from_resumed_draft() {
    let storage = UserStorage::in_memory();
    storage
        .save_signup_draft(&SignupDraft {
            step: SignupStep::Voice,
            login_id: "owner2".to_string(),
            nickname: "robo".to_string(),
            email: "owner2@example.com".to_string(),
            code_sent: true,
        })
        .unwrap();
    let (mut flow, calls) = signup(&storage).await;
    assert_eq!(flow.step(), SignupStep::Voice);

    let resp = flow.skip_voice().await.unwrap();
    assert_eq!(resp.login_id.as_deref(), Some("owner2"));
    assert_eq!(flow.step(), SignupStep::Complete);
    assert!(storage.signup_draft().is_none());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1["voice_vectors"].is_null());
}

/// When the draft cannot be written the flow stays where it was
#[tokio::test]
async fn test_unsaved_step_does_not_advance() {
    let dir = tempfile::tempdir().unwrap();
    let storage = UserStorage::new(Arc::new(FileStore::open(dir.path()).unwrap()));
    let (mut flow, calls) = signup(&storage).await;

    // A directory at the temp path makes every flush fail
    std::fs::create_dir(dir.path().join("storage.json.tmp")).unwrap();
    let err = flow.submit_login_id("owner1").await.unwrap_err();

    assert!(matches!(err, SignupError::Storage(_)));
    assert_eq!(paths(&calls), ["/api/register/check-id/"]);
    assert_eq!(flow.step(), SignupStep::LoginId);
    assert!(flow.draft().login_id.is_empty());
    assert!(storage.signup_draft().is_none());
}

/// The Jetson embeds the capture and the backend signs the user in
#[tokio::test]
async fn test_face_sign_in() {
    let (backend, calls) = spawn_backend().await;
    let device = spawn_jetson().await;
    let mut config = Config::default();
    config.backend = backend;

    let storage = UserStorage::in_memory();
    let (mut auth, _events) =
        AuthService::new(&config, storage.clone(), Arc::new(LogNotifier), Arc::new(NoMedia)).unwrap();

    let snapshot = auth.sign_in_with_face(&device, b"jpeg bytes").await.unwrap();
    let user = snapshot.user.clone().unwrap();
    assert_eq!(user.login_id, "owner1");
    assert_eq!(user.login_method, LoginMethod::Face);
    assert_eq!(storage.access_token().as_deref(), Some("access-7"));

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].0, "/api/login/face/");
    assert_eq!(calls[0].1["face_vectors"], json!([[0.1, 0.2]]));
}
