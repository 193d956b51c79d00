//! Client state consumed by front ends
//!
//! Plain data plus small mutators; all I/O lives in `auth`, `control` and
//! the front end itself, which feeds results back in here.

use crate::control::{ControlMode, ControlState};
use crate::models::{Preset, User};
use crate::signup::SignupStep;

/// Which screen is showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Login,
    Signup,
    Presets,
    Control,
}

/// Focused field on the login form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginField {
    #[default]
    LoginId,
    Password,
}

/// Signup form; one text field per step, two on the password step
#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub step: SignupStep,
    pub input: String,
    pub confirm: String,
    pub confirm_focused: bool,
    /// A code went out and the email step now expects it
    pub code_sent: bool,
}

impl SignupForm {
    /// Show `step` with empty fields
    pub fn show(&mut self, step: SignupStep, code_sent: bool) {
        *self = Self {
            step,
            code_sent,
            ..Self::default()
        };
    }

    pub fn focus_next(&mut self) {
        if self.step == SignupStep::Password {
            self.confirm_focused = !self.confirm_focused;
        }
    }

    fn focused_field(&mut self) -> &mut String {
        if self.confirm_focused {
            &mut self.confirm
        } else {
            &mut self.input
        }
    }

    pub fn push_char(&mut self, c: char) {
        self.focused_field().push(c);
    }

    pub fn pop_char(&mut self) {
        self.focused_field().pop();
    }

    /// Forget typed secrets after a failed attempt
    pub fn clear_secrets(&mut self) {
        if self.step == SignupStep::Password {
            self.input.clear();
            self.confirm.clear();
            self.confirm_focused = false;
        }
    }
}

/// Push channel state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn label(self) -> String {
        match self {
            Self::Disconnected => "offline".to_string(),
            Self::Connecting => "connecting".to_string(),
            Self::Connected => "online".to_string(),
            Self::Reconnecting { attempt } => format!("reconnecting ({attempt})"),
        }
    }
}

/// Status message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Application state
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub screen: Screen,

    // Login form
    pub login_id: String,
    pub password: String,
    pub focus: LoginField,
    pub busy: bool,

    pub signup: SignupForm,

    // Session
    pub user: Option<User>,
    pub presets: Vec<Preset>,
    pub preset_cursor: usize,
    pub selected_preset: Option<Preset>,

    // Control
    pub control: ControlState,
    pub control_mode: ControlMode,

    // UI
    pub status_message: Option<(String, StatusLevel)>,
    pub foreground_status: Option<String>,
    pub overlay: Option<String>,

    pub connection: ConnectionState,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to the next login field
    pub fn focus_next(&mut self) {
        self.focus = match self.focus {
            LoginField::LoginId => LoginField::Password,
            LoginField::Password => LoginField::LoginId,
        };
    }

    fn focused_field(&mut self) -> &mut String {
        match self.focus {
            LoginField::LoginId => &mut self.login_id,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn push_char(&mut self, c: char) {
        self.focused_field().push(c);
    }

    pub fn pop_char(&mut self) {
        self.focused_field().pop();
    }

    /// Logged in: move to the preset list
    pub fn signed_in(&mut self, user: User, presets: Vec<Preset>, selected: Option<Preset>) {
        self.user = Some(user);
        self.set_presets(presets);
        self.selected_preset = selected;
        self.password.clear();
        self.screen = Screen::Presets;
    }

    /// Back to an empty login screen, keeping the typed login id
    pub fn signed_out(&mut self) {
        let login_id = std::mem::take(&mut self.login_id);
        *self = Self {
            login_id,
            ..Self::default()
        };
    }

    /// Replace the preset list, keeping the cursor in range
    pub fn set_presets(&mut self, presets: Vec<Preset>) {
        self.presets = presets;
        if self.preset_cursor >= self.presets.len() {
            self.preset_cursor = self.presets.len().saturating_sub(1);
        }
    }

    pub fn cursor_down(&mut self) {
        if self.preset_cursor + 1 < self.presets.len() {
            self.preset_cursor += 1;
        }
    }

    pub fn cursor_up(&mut self) {
        self.preset_cursor = self.preset_cursor.saturating_sub(1);
    }

    /// Preset under the cursor
    pub fn current_preset(&self) -> Option<&Preset> {
        self.presets.get(self.preset_cursor)
    }

    pub fn is_selected(&self, preset: &Preset) -> bool {
        self.selected_preset
            .as_ref()
            .is_some_and(|s| s.preset_id == preset.preset_id && s.name == preset.name)
    }

    pub fn set_status(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status_message = Some((message.into(), level));
    }

    pub fn clear_status(&mut self) {
        self.status_message = None;
    }
}
