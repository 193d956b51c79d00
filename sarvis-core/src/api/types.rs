//! Backend response bodies
//!
//! The backend is loose about which fields it returns, so most bodies default
//! every field and callers check `success`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Preset, ServoPositions, opt_string_or_number, string_or_number};

/// Generic `{ success, message, errors }` envelope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    pub success: bool,
    pub message: Option<String>,
    pub errors: Option<HashMap<String, Vec<String>>>,
}

/// Result of a registration step (id, nickname, password, face)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupStepResponse {
    pub success: bool,
    pub message: Option<String>,
    pub login_id: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub next_step: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SendEmailCodeResponse {
    pub success: bool,
    pub message: Option<String>,
    pub email: Option<String>,
    /// Code validity in seconds
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub user_id: i64,
    pub uid: String,
    pub login_id: String,
    pub email: String,
    pub nickname: String,
    pub created_at: Option<String>,
    pub last_login_at: Option<String>,
    pub has_voice: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileData {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileResponse {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<ProfileData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FindIdResponse {
    pub success: bool,
    pub login_id: Option<String>,
    pub uid: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordResetVerifyResponse {
    pub success: bool,
    pub reset_token: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionStartResponse {
    pub success: bool,
    #[serde(deserialize_with = "string_or_number")]
    pub session_id: String,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionEndResponse {
    pub success: bool,
    #[serde(deserialize_with = "string_or_number")]
    pub session_id: String,
    pub ended_at: Option<String>,
}

/// Kind of command recorded in the session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    Button,
    Voice,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandLogResponse {
    pub success: bool,
    pub command_log_id: Option<i64>,
    pub occurred_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControlEnterResponse {
    pub success: bool,
    pub message: Option<String>,
    #[serde(deserialize_with = "opt_string_or_number")]
    pub session_id: Option<String>,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ButtonCommandResponse {
    pub success: bool,
    pub message: Option<String>,
    pub command: Option<String>,
    pub command_log_id: Option<i64>,
    /// Set when the backend relayed the command but the robot refused it
    pub jetson_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RobotStatusResponse {
    pub success: bool,
    pub data: Option<ServoPositions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresetListResponse {
    pub success: bool,
    pub count: usize,
    pub presets: Vec<Preset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresetSelectResponse {
    pub success: bool,
    pub message: Option<String>,
    pub preset: Option<ServoPositions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefaultPreset {
    pub name: String,
    pub offsets: ServoPositions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresetDefaultSelectResponse {
    pub success: bool,
    pub message: Option<String>,
    pub preset: Option<DefaultPreset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresetUpdateResponse {
    pub success: bool,
    pub message: Option<String>,
    pub preset_id: Option<i64>,
    pub preset_name: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresetSaveResponse {
    pub success: bool,
    pub message: Option<String>,
    pub preset_id: Option<i64>,
    pub preset: Option<Preset>,
    pub preset_name: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PresetLoadResponse {
    pub success: bool,
    pub message: Option<String>,
    pub preset: Option<Preset>,
}
