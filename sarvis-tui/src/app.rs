//! Application state and logic

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use sarvis_core::control::Arrow;
use sarvis_core::protocol::YoutubeCommand;
use sarvis_core::state::{AppState, Screen, SignupForm, StatusLevel};
use sarvis_core::voice::{MediaController, Notifier};
use sarvis_core::{
    AuthService, ButtonDirection, Config, Controller, DeviceClient, FaceImages, FileStore, LoginMethod, LoginResponse,
    SignupFlow, SignupStep, UserStorage, WsEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Application result for main loop
pub enum AppResult {
    Continue,
    Quit,
}

/// Alerts raised by the core, drained by `App::tick`
#[derive(Debug, Default)]
struct Alerts {
    notifications: VecDeque<(String, String)>,
    status: Option<String>,
}

/// Notifier that surfaces alerts in the status bar
#[derive(Debug, Default, Clone)]
pub struct TuiNotifier {
    alerts: Arc<Mutex<Alerts>>,
}

impl Notifier for TuiNotifier {
    fn notify(&self, title: &str, body: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.notifications.push_back((title.to_string(), body.to_string()));
        }
    }

    fn vibrate(&self, duration: Duration) {
        // Writing a bell to stdout would corrupt the alternate screen
        debug!(?duration, "vibrate");
    }

    fn set_status(&self, text: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.status = Some(text.to_string());
        }
    }
}

/// Playback state of the stand-in media player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Playback {
    #[default]
    Closed,
    Paused { position: u32 },
    Playing { position: u32 },
}

/// Seek step in seconds
const SEEK_SECS: u32 = 10;

/// Media player that only tracks what a real player would be doing
#[derive(Debug, Default, Clone)]
pub struct TuiPlayer {
    playback: Arc<Mutex<Playback>>,
}

impl TuiPlayer {
    pub fn playback(&self) -> Playback {
        self.playback.lock().map(|p| *p).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(Playback) -> anyhow::Result<Playback>) -> anyhow::Result<()> {
        let mut playback = self
            .playback
            .lock()
            .map_err(|_| anyhow::anyhow!("player state poisoned"))?;
        *playback = f(*playback)?;
        Ok(())
    }
}

impl MediaController for TuiPlayer {
    fn open(&self) -> anyhow::Result<()> {
        self.update(|_| Ok(Playback::Paused { position: 0 }))
    }

    fn play(&self) -> anyhow::Result<()> {
        self.update(|p| match p {
            Playback::Closed => anyhow::bail!("player is not open"),
            Playback::Paused { position } | Playback::Playing { position } => Ok(Playback::Playing { position }),
        })
    }

    fn pause(&self) -> anyhow::Result<()> {
        self.update(|p| match p {
            Playback::Closed => anyhow::bail!("player is not open"),
            Playback::Paused { position } | Playback::Playing { position } => Ok(Playback::Paused { position }),
        })
    }

    fn seek_forward(&self) -> anyhow::Result<()> {
        self.update(|p| match p {
            Playback::Closed => anyhow::bail!("player is not open"),
            Playback::Paused { position } => Ok(Playback::Paused {
                position: position + SEEK_SECS,
            }),
            Playback::Playing { position } => Ok(Playback::Playing {
                position: position + SEEK_SECS,
            }),
        })
    }

    fn seek_backward(&self) -> anyhow::Result<()> {
        self.update(|p| match p {
            Playback::Closed => anyhow::bail!("player is not open"),
            Playback::Paused { position } => Ok(Playback::Paused {
                position: position.saturating_sub(SEEK_SECS),
            }),
            Playback::Playing { position } => Ok(Playback::Playing {
                position: position.saturating_sub(SEEK_SECS),
            }),
        })
    }
}

/// Run one signup step from the form; `Some` carries the final login data
async fn run_signup_step(flow: &mut SignupFlow, form: &SignupForm) -> anyhow::Result<Option<LoginResponse>> {
    let input = form.input.trim();
    match flow.step() {
        SignupStep::LoginId => flow.submit_login_id(input).await?,
        SignupStep::Nickname => flow.submit_nickname(input).await?,
        // An address (re)sends the code, anything else is taken as the code
        SignupStep::Email if input.contains('@') || !flow.draft().code_sent => {
            flow.request_email_code(input).await?
        }
        SignupStep::Email => flow.verify_email(input).await?,
        SignupStep::Password => flow.submit_password(&form.input, &form.confirm).await?,
        SignupStep::DeviceLink => flow.link_device(&CancellationToken::new()).await?,
        SignupStep::Face => {
            let images = FaceImages::from_dir(Path::new(input)).with_context(|| format!("reading {input}"))?;
            flow.enroll_face(&images).await?
        }
        SignupStep::Voice if input.is_empty() => return Ok(Some(flow.skip_voice().await?)),
        SignupStep::Voice => {
            let clips = load_clips(Path::new(input)).with_context(|| format!("reading {input}"))?;
            return Ok(Some(flow.enroll_voice(&clips).await?));
        }
        SignupStep::Complete => {}
    }
    Ok(None)
}

/// Wake-word recordings (`*.m4a`) in name order
fn load_clips(dir: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "m4a"))
        .collect();
    paths.sort();
    paths.iter().map(std::fs::read).collect()
}

/// Main application struct
pub struct App {
    /// UI state
    pub state: AppState,

    /// Local player driven by media commands
    pub player: TuiPlayer,

    auth: AuthService,
    controller: Controller,
    device: DeviceClient,
    signup: Option<SignupFlow>,
    face_image: Option<PathBuf>,
    events: mpsc::UnboundedReceiver<WsEvent>,
    notifier: TuiNotifier,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = config.data_dir().context("no data directory")?;
        let store = FileStore::open(&data_dir).context("failed to open local storage")?;
        info!(path = %store.path().display(), "local storage");
        Self::with_storage(config, UserStorage::new(Arc::new(store)))
    }

    pub fn with_storage(config: Config, storage: UserStorage) -> anyhow::Result<Self> {
        let notifier = TuiNotifier::default();
        let player = TuiPlayer::default();
        let (mut auth, events) = AuthService::new(
            &config,
            storage.clone(),
            Arc::new(notifier.clone()),
            Arc::new(player.clone()),
        )?;
        let controller = Controller::new(auth.api().clone(), storage);
        let device = DeviceClient::new(&config.device)?;

        let mut state = AppState::new();
        state.control = controller.state();

        let snapshot = auth.restore();
        if let Some(user) = snapshot.user.clone() {
            state.login_id = user.login_id.clone();
            state.signed_in(user, snapshot.presets.clone(), snapshot.selected_preset.clone());
            state.set_status("Session restored", StatusLevel::Info);
        }

        Ok(Self {
            state,
            player,
            auth,
            controller,
            device,
            signup: None,
            face_image: config.client.tui.face_image,
            events,
            notifier,
        })
    }

    /// Process push channel events and refresh derived state
    pub async fn tick(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.auth.handle_event(event);
        }

        self.state.connection = self.auth.ws().state();
        self.state.overlay = self.auth.overlay().command();

        let (notification, status) = match self.notifier.alerts.lock() {
            Ok(mut alerts) => (alerts.notifications.pop_front(), alerts.status.clone()),
            Err(_) => (None, None),
        };
        if let Some((title, body)) = notification {
            self.state.set_status(format!("{title}: {body}"), StatusLevel::Info);
        }
        self.state.foreground_status = status;
    }

    pub async fn login(&mut self) {
        let login_id = self.state.login_id.trim().to_string();
        let password = self.state.password.clone();
        self.state.busy = true;
        let result = self.auth.sign_in_with_password(&login_id, &password).await.map(|_| ());
        self.state.busy = false;

        match result {
            Ok(()) => self.show_signed_in(),
            Err(e) => {
                warn!(error = %e, "login failed");
                self.state.password.clear();
                self.state.set_status(e.to_string(), StatusLevel::Error);
            }
        }
    }

    /// Face login with the configured capture
    pub async fn login_with_face(&mut self) {
        let Some(path) = self.face_image.clone() else {
            self.state
                .set_status("No face image configured (client.tui.face_image)", StatusLevel::Warning);
            return;
        };
        let image = match std::fs::read(&path) {
            Ok(image) => image,
            Err(e) => return self.fail(&format!("Could not read {}", path.display()), e),
        };

        self.state.busy = true;
        let result = self.auth.sign_in_with_face(&self.device, &image).await.map(|_| ());
        self.state.busy = false;

        match result {
            Ok(()) => self.show_signed_in(),
            Err(e) => self.fail("Face login failed", e),
        }
    }

    fn show_signed_in(&mut self) {
        let snapshot = self.auth.snapshot();
        let Some(user) = snapshot.user.clone() else {
            return;
        };
        let presets = snapshot.presets.clone();
        let selected = snapshot.selected_preset.clone();
        let nickname = user.nickname.clone();
        self.state.signed_in(user, presets, selected);
        self.state.set_status(format!("Welcome, {nickname}"), StatusLevel::Success);
    }

    /// Start a signup, resuming a stored draft
    pub fn open_signup(&mut self) {
        let flow = SignupFlow::new(self.auth.api().clone(), self.device.clone(), self.auth.storage().clone());
        self.state.signup.show(flow.step(), flow.draft().code_sent);
        if flow.step() != SignupStep::LoginId {
            self.state
                .set_status(format!("Resuming signup at {}", flow.step()), StatusLevel::Info);
        }
        self.signup = Some(flow);
        self.state.screen = Screen::Signup;
    }

    /// Back to the login form; the draft stays for later
    pub fn leave_signup(&mut self) {
        self.signup = None;
        self.state.screen = Screen::Login;
    }

    /// Drop the draft and the server-side registration cache
    pub async fn cancel_signup(&mut self) {
        if let Some(mut flow) = self.signup.take() {
            if let Err(e) = flow.cancel().await {
                warn!(error = %e, "signup cancel failed");
            }
        }
        self.state.signup = SignupForm::default();
        self.state.screen = Screen::Login;
        self.state.set_status("Signup cancelled", StatusLevel::Info);
    }

    /// Submit the current signup step
    pub async fn submit_signup(&mut self) {
        let Some(flow) = self.signup.as_mut() else {
            return;
        };

        self.state.busy = true;
        let result = run_signup_step(flow, &self.state.signup).await;
        self.state.busy = false;

        match result {
            Ok(Some(resp)) => {
                self.signup = None;
                self.state.signup = SignupForm::default();
                match self.auth.sign_in(resp, LoginMethod::Password).map(|_| ()) {
                    Ok(()) => self.show_signed_in(),
                    Err(e) => {
                        self.state.screen = Screen::Login;
                        self.fail("Account created but sign in failed", e);
                    }
                }
            }
            Ok(None) => {
                let (step, code_sent) = (flow.step(), flow.draft().code_sent);
                let email = flow.draft().email.clone();
                self.state.signup.show(step, code_sent);
                match step {
                    SignupStep::Email if code_sent => {
                        self.state.set_status(format!("Code sent to {email}"), StatusLevel::Info);
                    }
                    _ => self.state.set_status(format!("Next: {step}"), StatusLevel::Success),
                }
            }
            Err(e) => {
                self.state.signup.clear_secrets();
                self.fail("Signup", e);
            }
        }
    }

    pub async fn sign_out(&mut self) {
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "sign out failed");
        }
        self.state.signed_out();
        self.state.set_status("Signed out", StatusLevel::Info);
    }

    pub async fn refresh_presets(&mut self) {
        match self.auth.refresh_presets().await {
            Ok(presets) => {
                let count = presets.len();
                self.state.set_presets(presets.to_vec());
                self.state.set_status(format!("{count} preset(s)"), StatusLevel::Info);
            }
            Err(e) => self.fail("Could not load presets", e),
        }
    }

    /// Move the robot to the preset under the cursor
    pub async fn apply_preset(&mut self) {
        let Some(preset) = self.state.current_preset().cloned() else {
            return;
        };
        match self.auth.activate_preset(preset.clone()).await {
            Ok(()) => {
                self.state.set_status(format!("Preset '{}' applied", preset.name), StatusLevel::Success);
                self.state.selected_preset = Some(preset);
            }
            Err(e) => self.fail("Could not apply preset", e),
        }
    }

    pub async fn open_control(&mut self) {
        self.state.screen = Screen::Control;
        self.state.control = self.controller.state();
        self.state.control_mode = self.controller.mode();

        let Some(session_id) = self.auth.snapshot().session_id().map(str::to_string) else {
            self.state.set_status("No robot session; commands will not be sent", StatusLevel::Warning);
            return;
        };
        if let Err(e) = self.auth.api().control_enter(&session_id).await {
            warn!(error = %e, "control enter failed");
        }
    }

    pub fn close_control(&mut self) {
        self.state.screen = Screen::Presets;
    }

    pub fn toggle_mode(&mut self) {
        self.state.control_mode = self.controller.toggle_mode();
    }

    pub async fn press_arrow(&mut self, arrow: Arrow) {
        let direction = self.controller.mode().direction(arrow);
        self.press(direction).await;
    }

    pub async fn press(&mut self, direction: ButtonDirection) {
        let result = self.controller.press(direction).await;
        self.state.control = self.controller.state();

        match result {
            Ok(Some(resp)) if resp.success => {
                self.state.set_status(format!("{direction} sent"), StatusLevel::Success);
            }
            Ok(Some(resp)) => {
                let reason = resp.jetson_error.or(resp.message).unwrap_or_default();
                self.state.set_status(format!("{direction} rejected {reason}"), StatusLevel::Warning);
            }
            Ok(None) => {
                self.state.set_status(format!("{direction} (offline)"), StatusLevel::Warning);
            }
            Err(e) => self.fail("Command failed", e),
        }
    }

    pub fn media(&mut self, command: YoutubeCommand) {
        let status = self.auth.run_media_command(command);
        self.state.set_status(format!("{} {:?}", command.as_str(), status), StatusLevel::Info);
    }

    pub fn dismiss_overlay(&mut self) {
        self.auth.overlay().dismiss();
        self.state.overlay = None;
    }

    fn fail(&mut self, what: &str, error: impl std::fmt::Display) {
        warn!(error = %error, "{what}");
        self.state.set_status(format!("{what}: {error}"), StatusLevel::Error);
    }
}
