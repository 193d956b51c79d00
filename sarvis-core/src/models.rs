//! Records exchanged with the backend and persisted locally

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// How the user authenticated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    #[default]
    Password,
    Face,
}

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub uid: String,
    pub login_id: String,
    pub nickname: String,
    pub email: String,
    pub login_method: LoginMethod,
    #[serde(default)]
    pub face_registered: bool,
    #[serde(default)]
    pub voice_registered: bool,
}

/// Partial update applied with `UserStorage::update_user`
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub face_registered: Option<bool>,
    pub voice_registered: Option<bool>,
}

impl User {
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(nickname) = patch.nickname {
            self.nickname = nickname;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(face) = patch.face_registered {
            self.face_registered = face;
        }
        if let Some(voice) = patch.voice_registered {
            self.voice_registered = voice;
        }
    }
}

/// JWT access/refresh pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

/// Backend control session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub session_id: String,
    #[serde(default)]
    pub session_started_at: Option<String>,
}

/// Servo offsets making up a preset's control vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServoPositions {
    pub servo1: f64,
    pub servo2: f64,
    pub servo3: f64,
    pub servo4: f64,
    pub servo5: f64,
    pub servo6: f64,
}

/// Saved robot pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<i64>,
    pub name: String,
    #[serde(flatten)]
    pub servos: ServoPositions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body returned by password/face login and by signup completion
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub uid: Option<String>,
    pub user_id: Option<i64>,
    pub login_id: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<LoginMethod>,
    pub tokens: Option<Tokens>,
    /// Some login paths nest the pair under `access_token` instead
    pub access_token: Option<serde_json::Value>,
    pub similarity: Option<f64>,
    pub presets: Option<Vec<Preset>>,
    pub has_presets: Option<bool>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub session_id: Option<String>,
    pub session_started_at: Option<String>,
    pub has_face: Option<bool>,
    pub has_voice: Option<bool>,
}

impl LoginResponse {
    /// Token pair from either `tokens` or an `access_token` object
    pub fn token_pair(&self) -> Option<Tokens> {
        if let Some(ref tokens) = self.tokens {
            return Some(tokens.clone());
        }
        let nested = self.access_token.as_ref()?.as_object()?;
        let access = nested.get("access")?.as_str()?;
        let refresh = nested.get("refresh")?.as_str()?;
        Some(Tokens {
            access: access.to_string(),
            refresh: refresh.to_string(),
        })
    }

    pub fn user(&self, fallback_method: LoginMethod) -> User {
        User {
            user_id: self.user_id.unwrap_or_default(),
            uid: self.uid.clone().unwrap_or_default(),
            login_id: self.login_id.clone().unwrap_or_default(),
            nickname: self.nickname.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            login_method: self.login_method.unwrap_or(fallback_method),
            face_registered: self.has_face.unwrap_or(true),
            voice_registered: self.has_voice.unwrap_or(false),
        }
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.session_id.as_ref().map(|id| SessionInfo {
            session_id: id.clone(),
            session_started_at: self.session_started_at.clone(),
        })
    }
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_response_with_tokens() {
        let resp: LoginResponse = serde_json::from_value(json!({
            "success": true,
            "uid": "u-1",
            "user_id": 7,
            "login_id": "owner1",
            "nickname": "robo",
            "email": "x@y.z",
            "login_method": "password",
            "tokens": { "access": "a", "refresh": "r" },
            "session_id": 42,
            "session_started_at": "2026-01-01T00:00:00Z",
            "presets": [{ "preset_id": 1, "name": "desk",
                "servo1": 1, "servo2": 2, "servo3": 3, "servo4": 4, "servo5": 5, "servo6": 6 }]
        }))
        .unwrap();

        assert_eq!(resp.token_pair().unwrap().refresh, "r");
        assert_eq!(resp.session().unwrap().session_id, "42");
        let presets = resp.presets.unwrap();
        assert_eq!(presets[0].servos.servo6, 6.0);
    }

    #[test]
    fn test_login_response_with_nested_access_token() {
        let resp: LoginResponse = serde_json::from_value(json!({
            "success": true,
            "access_token": { "access": "a2", "refresh": "r2" }
        }))
        .unwrap();

        let tokens = resp.token_pair().unwrap();
        assert_eq!(tokens.access, "a2");
        assert_eq!(resp.user(LoginMethod::Face).login_method, LoginMethod::Face);
    }

    #[test]
    fn test_login_response_without_tokens() {
        let resp: LoginResponse = serde_json::from_value(json!({
            "success": true,
            "access_token": "bare-string"
        }))
        .unwrap();
        assert!(resp.token_pair().is_none());
        assert!(resp.session().is_none());
    }

    #[test]
    fn test_preset_wire_shape_is_flat() {
        let preset = Preset {
            preset_id: None,
            name: "couch".to_string(),
            servos: ServoPositions {
                servo1: 10.0,
                ..Default::default()
            },
            created_at: None,
        };
        let value = serde_json::to_value(&preset).unwrap();
        assert_eq!(value["servo1"], json!(10.0));
        assert!(value.get("preset_id").is_none());
    }

    #[test]
    fn test_user_patch() {
        let mut user = LoginResponse::default().user(LoginMethod::Password);
        user.apply(UserPatch {
            nickname: Some("new".to_string()),
            voice_registered: Some(true),
            ..Default::default()
        });
        assert_eq!(user.nickname, "new");
        assert!(user.voice_registered);
        assert!(user.face_registered);
    }
}
