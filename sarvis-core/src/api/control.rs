//! Control, session and robot status endpoints

use serde_json::json;

use super::{ApiClient, ApiError};
use crate::api::types::{
    ApiResponse, ButtonCommandResponse, CommandKind, CommandLogResponse, ControlEnterResponse,
    RobotStatusResponse, SessionEndResponse, SessionStartResponse,
};
use crate::control::ButtonDirection;

impl ApiClient {
    /// Announce that the control screen is open for this session
    pub async fn control_enter(&self, session_id: &str) -> Result<ControlEnterResponse, ApiError> {
        self.post("/api/control/enter/", &json!({ "session_id": session_id }))
            .await
    }

    /// Relay a direction command to the robot arm
    pub async fn send_button_command(
        &self,
        session_id: &str,
        direction: ButtonDirection,
    ) -> Result<ButtonCommandResponse, ApiError> {
        self.post(
            "/api/control/button/",
            &json!({ "session_id": session_id, "command": direction }),
        )
        .await
    }

    /// Macro commands ("come here", follow on/off) go through the legacy route
    pub async fn send_macro_command(
        &self,
        uid: &str,
        session_id: &str,
        command: ButtonDirection,
    ) -> Result<ButtonCommandResponse, ApiError> {
        self.post(
            "/api/button-command/",
            &json!({ "uid": uid, "session_id": session_id, "command": command }),
        )
        .await
    }

    pub async fn start_session(&self, session_id: &str) -> Result<SessionStartResponse, ApiError> {
        self.post("/api/session/start/", &json!({ "session_id": session_id }))
            .await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<SessionEndResponse, ApiError> {
        self.post("/api/session/end/", &json!({ "session_id": session_id }))
            .await
    }

    pub async fn log_command(
        &self,
        session_id: &str,
        kind: CommandKind,
        content: &str,
        success: bool,
    ) -> Result<CommandLogResponse, ApiError> {
        self.post(
            "/api/session/command-log/",
            &json!({
                "session_id": session_id,
                "command_type": kind,
                "command_content": content,
                "is_success": success,
            }),
        )
        .await
    }

    pub async fn robot_latest(&self) -> Result<RobotStatusResponse, ApiError> {
        self.get("/api/robot/latest/").await
    }

    /// Return the arm to its home pose
    pub async fn robot_reset(&self) -> Result<ApiResponse, ApiError> {
        self.post("/api/robot/reset/", &json!({})).await
    }
}
