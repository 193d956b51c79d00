//! Local link to the robot's onboard Jetson
//!
//! During enrollment the phone joins the robot's own access point and talks
//! to the Jetson directly. The Jetson turns raw captures into embedding
//! vectors, which the client then hands to the backend:
//! - `/upload_face`: five face images -> face vectors
//! - `/upload_voice`: wake-word clips -> voice vectors
//! - `/login_face`: one image -> face vectors for face login
//!
//! Responses are JSON when things go well; anything else is surfaced as the
//! error message.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Device returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Device not reachable within {0:?}")]
    Timeout(Duration),

    #[error("Waiting for device was cancelled")]
    Cancelled,

    #[error("No data to upload")]
    Empty,
}

/// Result of a reachability probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommunicationStatus {
    pub connected: bool,
    pub jetson_reachable: bool,
    pub last_error: Option<String>,
}

/// Reply from the Jetson's upload endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiometricUploadResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub face_vectors: Option<Vec<Vec<f64>>>,
    pub voice_vectors: Option<Vec<f64>>,
    /// Older firmware uses the singular key
    voice_vector: Option<Vec<f64>>,
    pub voice_profile_path: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

/// Captured face images by direction
#[derive(Debug, Clone, Default)]
pub struct FaceImages {
    pub front: Option<Vec<u8>>,
    pub left: Option<Vec<u8>>,
    pub right: Option<Vec<u8>>,
    pub top: Option<Vec<u8>>,
    pub bottom: Option<Vec<u8>>,
}

impl FaceImages {
    pub const DIRECTIONS: [&'static str; 5] = ["front", "left", "right", "top", "bottom"];

    /// Captured images in upload order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[u8])> {
        [&self.front, &self.left, &self.right, &self.top, &self.bottom]
            .into_iter()
            .zip(Self::DIRECTIONS)
            .filter_map(|(image, dir)| image.as_deref().map(|bytes| (dir, bytes)))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Load `face_<direction>.jpg` files from a directory, skipping missing ones
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let load = |dir_name: &str| -> std::io::Result<Option<Vec<u8>>> {
            match std::fs::read(dir.join(format!("face_{dir_name}.jpg"))) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        };
        Ok(Self {
            front: load("front")?,
            left: load("left")?,
            right: load("right")?,
            top: load("top")?,
            bottom: load("bottom")?,
        })
    }
}

/// HTTP client for the Jetson
#[derive(Clone)]
pub struct DeviceClient {
    client: Client,
    base_url: String,
    config: DeviceConfig,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the Jetson's root endpoint; never fails
    pub async fn test_connection(&self) -> CommunicationStatus {
        let result = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(Duration::from_secs(self.config.probe_timeout_secs))
            .send()
            .await;

        match result {
            Ok(resp) => CommunicationStatus {
                connected: true,
                jetson_reachable: resp.status() == reqwest::StatusCode::OK,
                last_error: None,
            },
            Err(e) => CommunicationStatus {
                connected: false,
                jetson_reachable: false,
                last_error: Some(e.to_string()),
            },
        }
    }

    /// Poll until the Jetson answers, the poll timeout passes or `cancel` fires
    pub async fn wait_for_device(&self, cancel: &CancellationToken) -> Result<CommunicationStatus, DeviceError> {
        let timeout = self.config.poll_timeout();
        let probe = async {
            let mut ticker = interval(self.config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = self.test_connection().await;
                if status.jetson_reachable {
                    return status;
                }
                debug!(error = ?status.last_error, "device not reachable yet");
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(DeviceError::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                warn!(?timeout, "device did not come up");
                Err(DeviceError::Timeout(timeout))
            }
            status = probe => {
                info!(url = %self.base_url, "device reachable");
                Ok(status)
            }
        }
    }

    /// Send the face captures for enrollment
    pub async fn upload_face_images(
        &self,
        login_id: &str,
        images: &FaceImages,
    ) -> Result<BiometricUploadResponse, DeviceError> {
        if images.count() == 0 {
            return Err(DeviceError::Empty);
        }

        let mut form = Form::new().text("login_id", login_id.to_string());
        for (dir, bytes) in images.iter() {
            form = form.part("image", file_part(bytes, format!("face_{dir}.jpg"), "image/jpeg")?);
        }

        info!(login_id, images = images.count(), "uploading face images");
        self.post_form("/upload_face", form).await
    }

    /// Send wake-word recordings for enrollment
    pub async fn upload_voice(&self, login_id: &str, clips: &[Vec<u8>]) -> Result<BiometricUploadResponse, DeviceError> {
        if clips.is_empty() {
            return Err(DeviceError::Empty);
        }

        let mut form = Form::new().text("login_id", login_id.to_string());
        for (i, clip) in clips.iter().enumerate() {
            form = form.part("voice", file_part(clip, format!("voice_{}.m4a", i + 1), "audio/mp4")?);
        }

        info!(login_id, clips = clips.len(), "uploading voice clips");
        let mut resp = self.post_form("/upload_voice", form).await?;
        if resp.voice_vectors.is_none() {
            resp.voice_vectors = resp.voice_vector.take();
        }
        Ok(resp)
    }

    /// Turn one face image into login vectors
    pub async fn login_face(&self, image: &[u8]) -> Result<BiometricUploadResponse, DeviceError> {
        let form = Form::new().part("image", file_part(image, "login_face.jpg".to_string(), "image/jpeg")?);
        self.post_form("/login_face", form).await
    }

    /// Raw audio registration used by the speaker-id service
    pub async fn register_upload(&self, uid: &str, files: &[Vec<u8>]) -> Result<BiometricUploadResponse, DeviceError> {
        if files.is_empty() {
            return Err(DeviceError::Empty);
        }

        let mut form = Form::new().text("uid", uid.to_string());
        for (i, file) in files.iter().enumerate() {
            form = form.part("audio", file_part(file, format!("audio_{}.wav", i + 1), "audio/wav")?);
        }
        self.post_form("/register/upload", form).await
    }

    /// Diagnostic round trip
    pub async fn echo(&self, message: &str) -> Result<serde_json::Value, DeviceError> {
        let resp = self
            .client
            .post(format!("{}/api/echo", self.base_url))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(DeviceError::Rejected {
                status,
                message: body_message(&text),
            });
        }
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    }

    async fn post_form(&self, path: &str, form: Form) -> Result<BiometricUploadResponse, DeviceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "device upload");

        let resp = self.client.post(&url).multipart(form).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!(status, url = %url, "device response");

        parse_upload_response(status, &text)
    }
}

fn file_part(bytes: &[u8], name: String, mime: &str) -> Result<Part, DeviceError> {
    Ok(Part::bytes(bytes.to_vec()).file_name(name).mime_str(mime)?)
}

fn parse_upload_response(status: u16, text: &str) -> Result<BiometricUploadResponse, DeviceError> {
    if !(200..300).contains(&status) {
        let message = body_message(text);
        warn!(status, message = %message, "device rejected upload");
        return Err(DeviceError::Rejected { status, message });
    }

    match serde_json::from_str(text) {
        Ok(body) => Ok(body),
        Err(e) => {
            warn!(error = %e, "device response is not JSON");
            Ok(BiometricUploadResponse {
                success: true,
                message: Some(text.to_string()),
                error: Some("INVALID_RESPONSE".to_string()),
                ..Default::default()
            })
        }
    }
}

/// `message` or `error` from a JSON body, else the body itself
fn body_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(String::from))
        })
        .unwrap_or_else(|| text.to_string())
}
