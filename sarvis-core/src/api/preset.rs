//! Preset endpoints

use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{ApiClient, ApiError, ApiRequest};
use crate::api::types::{
    ApiResponse, PresetDefaultSelectResponse, PresetListResponse, PresetLoadResponse, PresetSaveResponse,
    PresetSelectResponse, PresetUpdateResponse,
};
use crate::models::ServoPositions;

impl ApiClient {
    /// List presets, optionally only those recorded on one device session
    pub async fn list_presets(&self, session_id: Option<&str>) -> Result<PresetListResponse, ApiError> {
        let mut req = ApiRequest::new(Method::GET, "/api/preset/list/");
        if let Some(id) = session_id {
            req = req.query("session_id", id);
        }
        self.execute(req).await
    }

    /// Move the robot to a saved preset
    pub async fn select_preset(&self, preset_id: i64) -> Result<PresetSelectResponse, ApiError> {
        self.post("/api/preset/select/", &json!({ "preset_id": preset_id }))
            .await
    }

    pub async fn select_default_preset(&self) -> Result<PresetDefaultSelectResponse, ApiError> {
        self.post("/api/preset/select-default/", &json!({})).await
    }

    /// Save an explicit servo vector
    pub async fn save_preset(
        &self,
        name: &str,
        servos: ServoPositions,
        session_id: Option<&str>,
    ) -> Result<PresetSaveResponse, ApiError> {
        #[derive(Serialize)]
        struct SavePreset<'a> {
            name: &'a str,
            #[serde(flatten)]
            servos: ServoPositions,
            #[serde(skip_serializing_if = "Option::is_none")]
            session_id: Option<&'a str>,
        }

        let resp: PresetSaveResponse = self
            .post("/api/preset/save/", &SavePreset { name, servos, session_id })
            .await?;
        info!(name, preset_id = ?resp.preset_id, "preset saved");
        Ok(resp)
    }

    /// Save whatever pose the robot currently holds; the backend asks the device
    pub async fn save_preset_from_device(
        &self,
        session_id: &str,
        preset_name: Option<&str>,
    ) -> Result<PresetSaveResponse, ApiError> {
        self.post(
            "/api/preset/save/",
            &json!({ "session_id": session_id, "preset_name": preset_name }),
        )
        .await
    }

    pub async fn load_preset(&self, preset_id: i64) -> Result<PresetLoadResponse, ApiError> {
        self.post("/api/preset/load/", &json!({ "preset_id": preset_id })).await
    }

    /// Overwrite the active preset with the robot's current pose
    pub async fn update_active_preset(&self) -> Result<PresetUpdateResponse, ApiError> {
        self.post("/api/preset/update/", &json!({})).await
    }

    pub async fn rename_preset(&self, preset_id: i64, name: &str) -> Result<PresetUpdateResponse, ApiError> {
        self.patch(
            "/api/preset/rename/",
            &json!({ "preset_id": preset_id, "preset_name": name }),
        )
        .await
    }

    pub async fn delete_preset(&self, preset_id: i64) -> Result<ApiResponse, ApiError> {
        self.delete(&format!("/api/preset/{preset_id}/")).await
    }
}
