//! Robot arm direction control
//!
//! The backend only receives discrete direction commands; the client tracks
//! an approximate pose locally so it can show where the arm should be and
//! restore it on the next launch.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, ButtonCommandResponse};
use crate::storage::{StorageError, UserStorage};

pub const POSITION_LIMIT: i32 = 100;
pub const ROTATION_LIMIT: i32 = 90;
pub const DISTANCE_LIMIT: i32 = 2;

/// Commands accepted by the control endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonDirection {
    Up,
    Down,
    Left,
    Right,
    Far,
    Near,
    YawRight,
    YawLeft,
    PitchUp,
    PitchDown,
    ComeHere,
    TrackOn,
    TrackOff,
    Home,
}

impl ButtonDirection {
    /// Commands that trigger a behaviour rather than a single step
    pub fn is_macro(self) -> bool {
        matches!(self, Self::ComeHere | Self::TrackOn | Self::TrackOff)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Far => "FAR",
            Self::Near => "NEAR",
            Self::YawRight => "YAW_RIGHT",
            Self::YawLeft => "YAW_LEFT",
            Self::PitchUp => "PITCH_UP",
            Self::PitchDown => "PITCH_DOWN",
            Self::ComeHere => "COME_HERE",
            Self::TrackOn => "TRACK_ON",
            Self::TrackOff => "TRACK_OFF",
            Self::Home => "HOME",
        }
    }
}

impl std::fmt::Display for ButtonDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the arrow pad moves or tilts the arm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlMode {
    #[default]
    Position,
    Rotation,
}

/// Arrow pad key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Left,
    Right,
}

impl ControlMode {
    pub fn toggle(self) -> Self {
        match self {
            Self::Position => Self::Rotation,
            Self::Rotation => Self::Position,
        }
    }

    pub fn direction(self, arrow: Arrow) -> ButtonDirection {
        match (self, arrow) {
            (Self::Position, Arrow::Up) => ButtonDirection::Up,
            (Self::Position, Arrow::Down) => ButtonDirection::Down,
            (Self::Position, Arrow::Left) => ButtonDirection::Left,
            (Self::Position, Arrow::Right) => ButtonDirection::Right,
            (Self::Rotation, Arrow::Up) => ButtonDirection::PitchUp,
            (Self::Rotation, Arrow::Down) => ButtonDirection::PitchDown,
            (Self::Rotation, Arrow::Left) => ButtonDirection::YawLeft,
            (Self::Rotation, Arrow::Right) => ButtonDirection::YawRight,
        }
    }
}

/// Locally tracked pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    pub position_x: i32,
    pub position_y: i32,
    pub rotation_x: i32,
    pub rotation_y: i32,
    pub distance: i32,
}

impl ControlState {
    /// Step the tracked pose; macro commands leave it alone
    pub fn apply(&mut self, direction: ButtonDirection) {
        use ButtonDirection::*;
        match direction {
            Up => self.position_y = step(self.position_y, 1, POSITION_LIMIT),
            Down => self.position_y = step(self.position_y, -1, POSITION_LIMIT),
            Right => self.position_x = step(self.position_x, 1, POSITION_LIMIT),
            Left => self.position_x = step(self.position_x, -1, POSITION_LIMIT),
            PitchUp => self.rotation_x = step(self.rotation_x, 1, ROTATION_LIMIT),
            PitchDown => self.rotation_x = step(self.rotation_x, -1, ROTATION_LIMIT),
            YawRight => self.rotation_y = step(self.rotation_y, 1, ROTATION_LIMIT),
            YawLeft => self.rotation_y = step(self.rotation_y, -1, ROTATION_LIMIT),
            Far => self.distance = step(self.distance, 1, DISTANCE_LIMIT),
            Near => self.distance = step(self.distance, -1, DISTANCE_LIMIT),
            Home => *self = Self::default(),
            ComeHere | TrackOn | TrackOff => {}
        }
    }
}

fn step(value: i32, delta: i32, limit: i32) -> i32 {
    (value + delta).clamp(-limit, limit)
}

/// Sends direction commands and keeps the tracked pose in storage
pub struct Controller {
    api: ApiClient,
    storage: UserStorage,
    state: ControlState,
    mode: ControlMode,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Controller {
    /// Restore the saved pose; distance always restarts centred
    pub fn new(api: ApiClient, storage: UserStorage) -> Self {
        let mut state = storage.control_state().unwrap_or_default();
        state.distance = 0;
        Self {
            api,
            storage,
            state,
            mode: ControlMode::default(),
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn toggle_mode(&mut self) -> ControlMode {
        self.mode = self.mode.toggle();
        self.mode
    }

    pub async fn press_arrow(&mut self, arrow: Arrow) -> Result<Option<ButtonDirection>, ControlError> {
        let direction = self.mode.direction(arrow);
        self.press(direction).await.map(|sent| sent.map(|_| direction))
    }

    /// Update the tracked pose and relay the command for the current session.
    /// Returns `None` when there is no session to send to.
    pub async fn press(&mut self, direction: ButtonDirection) -> Result<Option<ButtonCommandResponse>, ControlError> {
        self.state.apply(direction);
        self.storage.save_control_state(&self.state)?;

        let Some(session) = self.storage.session() else {
            warn!(%direction, "no active session, command not sent");
            return Ok(None);
        };

        let resp = if direction.is_macro() {
            let uid = self.storage.user().map(|u| u.uid).unwrap_or_default();
            self.api.send_macro_command(&uid, &session.session_id, direction).await?
        } else {
            self.api.send_button_command(&session.session_id, direction).await?
        };

        if resp.success {
            info!(%direction, "command delivered");
        } else {
            warn!(%direction, message = ?resp.message, jetson_error = ?resp.jetson_error, "command rejected");
        }
        Ok(Some(resp))
    }

    /// Zero the tracked pose without talking to the robot
    pub fn reset(&mut self) -> Result<(), ControlError> {
        self.state = ControlState::default();
        self.storage.save_control_state(&self.state)?;
        Ok(())
    }
}
