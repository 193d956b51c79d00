//! Signed-in session for SARVIS clients
//!
//! `AuthService` owns everything that lives exactly as long as a login:
//! - the user, token pair, preset list and selected preset
//! - the backend control session and its push channel
//! - the voice overlay fed by wake-word calls
//!
//! Tokens are issued by the backend (access + refresh JWTs). The client
//! never verifies signatures; it only reads `exp` to know when the access
//! token will need refreshing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::device::{DeviceClient, DeviceError};
use crate::models::{LoginMethod, LoginResponse, Preset, SessionInfo, Tokens, User};
use crate::protocol::{CommandStatus, YoutubeCommand};
use crate::storage::{StorageError, UserStorage};
use crate::validation::{ValidationError, validate_login_form};
use crate::voice::{MediaController, Notifier, VoiceOverlay, dispatch_youtube, handle_voice_command};
use crate::websocket::{WsEvent, WsManager};

/// Claims carried by backend-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    pub token_type: TokenType,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Read claims without checking the signature or expiry
pub fn peek_claims(token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Login response carried no tokens")]
    MissingTokens,

    #[error("{0}")]
    Rejected(String),

    #[error("Device returned no face vectors")]
    NoFaceVectors,

    #[error("Token decoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// What the front end needs to render a logged-in session
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub tokens: Option<Tokens>,
    pub presets: Vec<Preset>,
    pub selected_preset: Option<Preset>,
    pub session: Option<SessionInfo>,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.tokens.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }
}

/// Session provider tying API, storage and push channel together
pub struct AuthService {
    api: ApiClient,
    storage: UserStorage,
    ws: WsManager,
    notifier: Arc<dyn Notifier>,
    media: Arc<dyn MediaController>,
    overlay: VoiceOverlay,
    vibration: Duration,
    snapshot: AuthSnapshot,
}

impl AuthService {
    /// Build the service; the receiver yields push channel events for `handle_event`
    pub fn new(
        config: &Config,
        storage: UserStorage,
        notifier: Arc<dyn Notifier>,
        media: Arc<dyn MediaController>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WsEvent>), AuthError> {
        let api = ApiClient::new(&config.backend, storage.clone())?;
        let (ws, events) = WsManager::new(&config.backend.base_url, config.websocket.clone(), Arc::clone(&notifier));
        let service = Self {
            api,
            storage,
            ws,
            notifier,
            media,
            overlay: VoiceOverlay::new(Duration::from_secs(config.client.overlay_dismiss_secs)),
            vibration: Duration::from_millis(config.client.vibration_ms),
            snapshot: AuthSnapshot::default(),
        };
        Ok((service, events))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn storage(&self) -> &UserStorage {
        &self.storage
    }

    pub fn ws(&self) -> &WsManager {
        &self.ws
    }

    pub fn overlay(&self) -> &VoiceOverlay {
        &self.overlay
    }

    pub fn snapshot(&self) -> &AuthSnapshot {
        &self.snapshot
    }

    /// Rebuild the session from storage after a restart
    pub fn restore(&mut self) -> &AuthSnapshot {
        let (Some(user), Some(tokens)) = (self.storage.user(), self.storage.tokens()) else {
            debug!("no stored login");
            return &self.snapshot;
        };

        self.snapshot = AuthSnapshot {
            user: Some(user),
            tokens: Some(tokens),
            presets: self.storage.presets(),
            selected_preset: self.storage.selected_preset(),
            session: self.storage.session(),
        };
        info!(
            login_id = self.snapshot.user.as_ref().map(|u| u.login_id.as_str()),
            presets = self.snapshot.presets.len(),
            "restored session"
        );

        if let Some(id) = self.snapshot.session_id().map(str::to_string) {
            self.ws.connect(&id);
        }
        &self.snapshot
    }

    /// Commit a successful login response
    ///
    /// Everything is written to storage in one batch before the in-memory
    /// session changes, so a failed write leaves the previous state in place.
    pub fn sign_in(&mut self, resp: LoginResponse, method: LoginMethod) -> Result<&AuthSnapshot, AuthError> {
        let tokens = resp.token_pair().ok_or(AuthError::MissingTokens)?;
        let user = resp.user(method);
        let session = resp.session();
        let presets = resp.presets.clone().unwrap_or_default();

        self.storage.save_login(session.as_ref(), &user, &tokens, &presets)?;

        let selected_preset = self
            .storage
            .selected_preset()
            .filter(|sel| presets.iter().any(|p| p.preset_id == sel.preset_id));

        info!(login_id = %user.login_id, ?method, presets = presets.len(), "signed in");
        self.snapshot = AuthSnapshot {
            user: Some(user),
            tokens: Some(tokens),
            presets,
            selected_preset,
            session,
        };

        if let Some(id) = self.snapshot.session_id().map(str::to_string) {
            self.ws.connect(&id);
        }
        Ok(&self.snapshot)
    }

    pub async fn sign_in_with_password(&mut self, login_id: &str, password: &str) -> Result<&AuthSnapshot, AuthError> {
        validate_login_form(login_id, password)?;
        let resp = self.api.login_password(login_id, password).await?;
        if !resp.success {
            return Err(AuthError::Rejected(
                resp.message.unwrap_or_else(|| "Login failed".to_string()),
            ));
        }
        self.sign_in(resp, LoginMethod::Password)
    }

    /// Face login: the Jetson embeds the image, the backend matches the vectors
    pub async fn sign_in_with_face(&mut self, device: &DeviceClient, image: &[u8]) -> Result<&AuthSnapshot, AuthError> {
        let upload = device.login_face(image).await?;
        let vectors = upload.face_vectors.filter(|v| !v.is_empty()).ok_or(AuthError::NoFaceVectors)?;

        let resp = self.api.login_face(&vectors).await?;
        if !resp.success {
            return Err(AuthError::Rejected(
                resp.message.unwrap_or_else(|| "Face not recognised".to_string()),
            ));
        }
        self.sign_in(resp, LoginMethod::Face)
    }

    /// End the session locally; the server logout is best effort
    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        self.ws.disconnect();
        self.overlay.dismiss();

        let refresh = self
            .snapshot
            .tokens
            .as_ref()
            .map(|t| t.refresh.clone())
            .or_else(|| self.storage.refresh_token());
        if let Some(refresh) = refresh {
            if let Err(e) = self.api.logout(&refresh).await {
                warn!(error = %e, "server logout failed, clearing local session anyway");
            }
        }

        self.storage.clear_auth()?;
        self.snapshot = AuthSnapshot::default();
        info!("signed out");
        Ok(())
    }

    /// Remember `preset` as the active one
    pub fn select_preset(&mut self, preset: Preset) -> Result<(), AuthError> {
        self.storage.save_selected_preset(&preset)?;
        debug!(name = %preset.name, "preset selected");
        self.snapshot.selected_preset = Some(preset);
        Ok(())
    }

    /// Move the robot to `preset` and remember it
    pub async fn activate_preset(&mut self, preset: Preset) -> Result<(), AuthError> {
        if let Some(id) = preset.preset_id {
            let resp = self.api.select_preset(id).await?;
            if !resp.success {
                return Err(AuthError::Rejected(
                    resp.message.unwrap_or_else(|| "Preset could not be applied".to_string()),
                ));
            }
        }
        self.select_preset(preset)
    }

    /// Pull the preset list from the backend
    pub async fn refresh_presets(&mut self) -> Result<&[Preset], AuthError> {
        let resp = self.api.list_presets(None).await?;
        self.storage.save_presets(&resp.presets)?;
        self.snapshot.presets = resp.presets;
        Ok(&self.snapshot.presets)
    }

    /// React to a push channel event
    pub fn handle_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::VoiceCommand { command } => {
                let command = handle_voice_command(self.notifier.as_ref(), &command, false, self.vibration);
                self.ws.send_voice_command_ack();
                self.overlay.show(command);
            }
            WsEvent::YoutubeCommand { command } => {
                handle_voice_command(self.notifier.as_ref(), command.as_str(), true, self.vibration);
                let status = dispatch_youtube(self.media.as_ref(), command);
                self.ws.send_youtube_command_ack(status);
            }
            WsEvent::Connected => debug!("push channel up"),
            WsEvent::Disconnected => debug!("push channel down"),
        }
    }

    /// Run a media command the user triggered locally and report it
    pub fn run_media_command(&self, command: YoutubeCommand) -> CommandStatus {
        let status = dispatch_youtube(self.media.as_ref(), command);
        self.ws.send_youtube_command_report(command, status);
        status
    }

    /// When the current access token expires, if it carries `exp`
    pub fn access_token_expiry(&self) -> Option<DateTime<Utc>> {
        let tokens = self.snapshot.tokens.as_ref()?;
        match peek_claims(&tokens.access) {
            Ok(claims) => DateTime::from_timestamp(claims.exp, 0),
            Err(e) => {
                debug!(error = %e, "access token is not a readable JWT");
                None
            }
        }
    }

    pub fn access_token_expired(&self) -> bool {
        self.access_token_expiry().is_some_and(|exp| exp <= Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use crate::voice::LogNotifier;

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

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.backend.base_url = "http://127.0.0.1:1".to_string();
        config
    }

    fn service(storage: UserStorage) -> AuthService {
        AuthService::new(&offline_config(), storage, Arc::new(LogNotifier), Arc::new(NoMedia))
            .unwrap()
            .0
    }

    fn token(exp: i64, token_type: TokenType) -> String {
        let claims = Claims {
            exp,
            iat: Some(exp - 300),
            token_type,
            jti: Some("j".to_string()),
            user_id: Some(json!(7)),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"server-side-secret")).unwrap()
    }

    fn login_response(with_tokens: bool) -> LoginResponse {
        let mut body = json!({
            "success": true,
            "uid": "u-1",
            "user_id": 7,
            "login_id": "owner1",
            "nickname": "robo",
            "email": "x@y.z",
            "presets": [{ "preset_id": 3, "name": "desk",
                "servo1": 1, "servo2": 2, "servo3": 3, "servo4": 4, "servo5": 5, "servo6": 6 }]
        });
        if with_tokens {
            body["tokens"] = json!({ "access": "a", "refresh": "r" });
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_peek_claims_ignores_signature() {
        let exp = Utc::now().timestamp() + 600;
        let claims = peek_claims(&token(exp, TokenType::Access)).unwrap();
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_peek_claims_accepts_expired() {
        let claims = peek_claims(&token(1_000, TokenType::Refresh)).unwrap();
        assert_eq!(claims.exp, 1_000);
    }

    #[tokio::test]
    async fn test_sign_in_without_tokens_changes_nothing() {
        let storage = UserStorage::in_memory();
        let mut auth = service(storage.clone());

        let result = auth.sign_in(login_response(false), LoginMethod::Password);
        assert!(matches!(result, Err(AuthError::MissingTokens)));
        assert!(!auth.snapshot().is_authenticated());
        assert!(storage.user().is_none());
        assert!(storage.presets().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_persists_then_commits() {
        let storage = UserStorage::in_memory();
        let mut auth = service(storage.clone());

        let snapshot = auth.sign_in(login_response(true), LoginMethod::Password).unwrap();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.presets.len(), 1);

        assert_eq!(storage.user().unwrap().login_id, "owner1");
        assert_eq!(storage.refresh_token().as_deref(), Some("r"));
        assert_eq!(storage.presets()[0].name, "desk");
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_login() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UserStorage::new(Arc::new(crate::storage::FileStore::open(dir.path()).unwrap()));
        let mut auth = service(storage.clone());

        // The temp file path being a directory makes every flush fail
        std::fs::create_dir(dir.path().join("storage.json.tmp")).unwrap();
        let result = auth.sign_in(login_response(true), LoginMethod::Password);

        assert!(matches!(result, Err(AuthError::Storage(_))));
        assert!(!auth.snapshot().is_authenticated());
        assert!(storage.user().is_none());
        assert!(storage.access_token().is_none());
        assert!(storage.presets().is_empty());
    }

    #[tokio::test]
    async fn test_restore_requires_user_and_tokens() {
        let storage = UserStorage::in_memory();
        {
            let mut auth = service(storage.clone());
            auth.sign_in(login_response(true), LoginMethod::Password).unwrap();
        }

        let mut auth = service(storage.clone());
        assert!(auth.restore().is_authenticated());

        storage.raw().remove(crate::storage::TOKENS_KEY).unwrap();
        let mut auth = service(storage);
        assert!(!auth.restore().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_when_server_unreachable() {
        let storage = UserStorage::in_memory();
        let mut auth = service(storage.clone());
        auth.sign_in(login_response(true), LoginMethod::Password).unwrap();

        auth.sign_out().await.unwrap();

        assert!(!auth.snapshot().is_authenticated());
        assert!(storage.user().is_none());
        assert!(storage.tokens().is_none());
    }

    #[tokio::test]
    async fn test_select_preset_persists() {
        let storage = UserStorage::in_memory();
        let mut auth = service(storage.clone());
        let snapshot = auth.sign_in(login_response(true), LoginMethod::Password).unwrap();
        let preset = snapshot.presets[0].clone();

        auth.select_preset(preset.clone()).unwrap();
        assert_eq!(storage.selected_preset().unwrap(), preset);
        assert_eq!(auth.snapshot().selected_preset.as_ref(), Some(&preset));
    }

    #[tokio::test]
    async fn test_access_token_expiry() {
        let storage = UserStorage::in_memory();
        let mut auth = service(storage);
        let mut resp = login_response(true);
        resp.tokens = Some(Tokens {
            access: token(Utc::now().timestamp() - 10, TokenType::Access),
            refresh: "r".to_string(),
        });
        auth.sign_in(resp, LoginMethod::Password).unwrap();

        assert!(auth.access_token_expiry().is_some());
        assert!(auth.access_token_expired());
    }

    #[tokio::test]
    async fn test_voice_event_shows_overlay() {
        let mut auth = service(UserStorage::in_memory());
        auth.handle_event(WsEvent::VoiceCommand {
            command: "싸비스".to_string(),
        });
        assert_eq!(auth.overlay().command().as_deref(), Some("SARVIS"));
    }
}
