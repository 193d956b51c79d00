//! sarvis-core: Shared library for SARVIS robot-assistant clients
//!
//! This crate provides:
//! - Backend REST client with bearer auth and token refresh
//! - SoftAP link to the robot's onboard Jetson for enrollment uploads
//! - WebSocket push channel for voice and media commands
//! - Local key-value persistence of user, session and preset state
//! - Form validation, signup flow and device control state

pub mod api;
pub mod auth;
pub mod config;
pub mod control;
pub mod device;
pub mod models;
pub mod protocol;
pub mod signup;
pub mod state;
pub mod storage;
pub mod validation;
pub mod voice;
pub mod websocket;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthService, AuthSnapshot};
pub use config::Config;
pub use control::{ButtonDirection, ControlMode, ControlState, Controller};
pub use device::{DeviceClient, FaceImages};
pub use models::{LoginMethod, LoginResponse, Preset, ServoPositions, SessionInfo, Tokens, User};
pub use protocol::{ClientMessage, ServerMessage};
pub use signup::{SignupFlow, SignupStep};
pub use state::{AppState, ConnectionState, Screen, StatusLevel};
pub use storage::{FileStore, KeyValueStore, MemoryStore, UserStorage};
pub use voice::{LogNotifier, MediaController, Notifier, VoiceOverlay};
pub use websocket::{WsEvent, WsManager};

/// Default backend (EC2) base URL
pub const DEFAULT_BACKEND_URL: &str = "http://i14a104.p.ssafy.io:8080";

/// Jetson address on the robot's own access point
pub const DEFAULT_JETSON_HOST: &str = "10.42.0.1";

/// Jetson HTTP port
pub const DEFAULT_JETSON_PORT: u16 = 5000;

/// Default timeout for backend and upload requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
