//! Multi-step account enrollment
//!
//! Registration is split across several backend calls plus two uploads to
//! the robot's Jetson. The draft is persisted after every step so an
//! interrupted signup resumes where it stopped. The password itself is never
//! stored.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::device::{DeviceClient, DeviceError, FaceImages};
use crate::models::LoginResponse;
use crate::storage::{StorageError, UserStorage};
use crate::validation::{
    OTP_LEN, ValidationError, is_valid_email, is_valid_login_id, is_valid_nickname, is_valid_password, sanitize_otp,
};

/// Enrollment steps in order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupStep {
    #[default]
    LoginId,
    Nickname,
    Email,
    Password,
    DeviceLink,
    Face,
    Voice,
    Complete,
}

impl std::fmt::Display for SignupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LoginId => "login id",
            Self::Nickname => "nickname",
            Self::Email => "email",
            Self::Password => "password",
            Self::DeviceLink => "device link",
            Self::Face => "face",
            Self::Voice => "voice",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Persisted progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupDraft {
    pub step: SignupStep,
    #[serde(default)]
    pub login_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: String,
    /// A code was mailed to `email`
    #[serde(default)]
    pub code_sent: bool,
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Expected the {expected} step, signup is at {actual}")]
    WrongStep { expected: SignupStep, actual: SignupStep },

    #[error("Request the email code first")]
    CodeNotRequested,

    #[error("{0}")]
    Rejected(String),

    #[error("Device returned no face vectors")]
    NoFaceVectors,
}

/// Drives enrollment one step at a time
pub struct SignupFlow {
    api: ApiClient,
    device: DeviceClient,
    storage: UserStorage,
    draft: SignupDraft,
}

impl SignupFlow {
    /// Start a new signup or resume the stored one
    pub fn new(api: ApiClient, device: DeviceClient, storage: UserStorage) -> Self {
        let draft = storage.signup_draft().unwrap_or_default();
        if draft.step != SignupStep::LoginId {
            info!(step = %draft.step, login_id = %draft.login_id, "resuming signup");
        }
        Self {
            api,
            device,
            storage,
            draft,
        }
    }

    pub fn step(&self) -> SignupStep {
        self.draft.step
    }

    pub fn draft(&self) -> &SignupDraft {
        &self.draft
    }

    fn ensure_step(&self, expected: SignupStep) -> Result<(), SignupError> {
        if self.draft.step == expected {
            Ok(())
        } else {
            Err(SignupError::WrongStep {
                expected,
                actual: self.draft.step,
            })
        }
    }

    /// Persist `draft` first and only then adopt it
    fn commit(&mut self, draft: SignupDraft) -> Result<(), SignupError> {
        self.storage.save_signup_draft(&draft)?;
        self.draft = draft;
        Ok(())
    }

    fn advance(&mut self, next: SignupStep) -> Result<(), SignupError> {
        self.advance_with(next, |_| {})
    }

    fn advance_with(&mut self, next: SignupStep, update: impl FnOnce(&mut SignupDraft)) -> Result<(), SignupError> {
        let mut draft = self.draft.clone();
        update(&mut draft);
        draft.step = next;
        self.commit(draft)?;
        info!(step = %next, "signup advanced");
        Ok(())
    }

    pub async fn submit_login_id(&mut self, login_id: &str) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::LoginId)?;
        if !is_valid_login_id(login_id) {
            return Err(ValidationError::LoginId.into());
        }

        let resp = self.api.check_id(login_id).await?;
        if !resp.success {
            return Err(rejected(resp.message, "Login id is not available"));
        }
        self.advance_with(SignupStep::Nickname, |d| d.login_id = login_id.to_string())
    }

    pub async fn submit_nickname(&mut self, nickname: &str) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::Nickname)?;
        if !is_valid_nickname(nickname) {
            return Err(ValidationError::Nickname.into());
        }

        let resp = self.api.register_nickname(&self.draft.login_id, nickname).await?;
        if !resp.success {
            return Err(rejected(resp.message, "Nickname was rejected"));
        }
        self.advance_with(SignupStep::Email, |d| d.nickname = nickname.to_string())
    }

    /// Mail a code to `email`; may be called again to resend
    pub async fn request_email_code(&mut self, email: &str) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::Email)?;
        if !is_valid_email(email) {
            return Err(ValidationError::Email.into());
        }

        let resp = self.api.send_email_code(email).await?;
        if !resp.success {
            return Err(rejected(resp.message, "Could not send the code"));
        }
        let mut draft = self.draft.clone();
        draft.email = email.to_string();
        draft.code_sent = true;
        self.commit(draft)?;
        info!(email, expires_in = ?resp.expires_in, "email code sent");
        Ok(())
    }

    pub async fn verify_email(&mut self, code: &str) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::Email)?;
        if !self.draft.code_sent {
            return Err(SignupError::CodeNotRequested);
        }
        let code = sanitize_otp(code);
        if code.len() != OTP_LEN {
            return Err(ValidationError::Otp.into());
        }

        let resp = self
            .api
            .register_email(&self.draft.login_id, &self.draft.nickname, &self.draft.email, &code)
            .await?;
        if !resp.success {
            return Err(rejected(resp.message, "Verification code is incorrect"));
        }
        self.advance(SignupStep::Password)
    }

    pub async fn submit_password(&mut self, password: &str, confirm: &str) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::Password)?;
        if !is_valid_password(password) {
            return Err(ValidationError::Password.into());
        }
        if password != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }

        let resp = self
            .api
            .register_password(&self.draft.login_id, &self.draft.nickname, password)
            .await?;
        if !resp.success {
            return Err(rejected(resp.message, "Password was rejected"));
        }
        self.advance(SignupStep::DeviceLink)
    }

    /// Wait for the phone to reach the robot's access point
    pub async fn link_device(&mut self, cancel: &CancellationToken) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::DeviceLink)?;
        self.device.wait_for_device(cancel).await?;
        self.advance(SignupStep::Face)
    }

    pub async fn enroll_face(&mut self, images: &FaceImages) -> Result<(), SignupError> {
        self.ensure_step(SignupStep::Face)?;

        let upload = self.device.upload_face_images(&self.draft.login_id, images).await?;
        let vectors = upload
            .face_vectors
            .filter(|v| !v.is_empty())
            .ok_or(SignupError::NoFaceVectors)?;

        let resp = self.api.save_face_vector(&self.draft.login_id, &vectors).await?;
        if !resp.success {
            return Err(rejected(resp.message, "Face could not be saved"));
        }
        self.advance(SignupStep::Voice)
    }

    /// Upload wake-word clips and finish; the response carries login data
    pub async fn enroll_voice(&mut self, clips: &[Vec<u8>]) -> Result<LoginResponse, SignupError> {
        self.ensure_step(SignupStep::Voice)?;

        let upload = self.device.upload_voice(&self.draft.login_id, clips).await?;
        if upload.voice_vectors.is_none() {
            warn!("device returned no voice vectors, finishing without voice");
        }
        let resp = self
            .api
            .save_voice_vector(&self.draft.login_id, upload.voice_vectors.as_deref())
            .await?;
        self.complete(resp)
    }

    pub async fn skip_voice(&mut self) -> Result<LoginResponse, SignupError> {
        self.ensure_step(SignupStep::Voice)?;
        let resp = self.api.skip_voice(&self.draft.login_id).await?;
        self.complete(resp)
    }

    fn complete(&mut self, resp: LoginResponse) -> Result<LoginResponse, SignupError> {
        if !resp.success {
            return Err(rejected(resp.message, "Signup could not be completed"));
        }
        self.storage.clear_signup_draft()?;
        self.draft.step = SignupStep::Complete;
        info!(login_id = %self.draft.login_id, "signup complete");
        Ok(resp)
    }

    /// Abandon the signup; the server-side cache is cleared best effort
    pub async fn cancel(&mut self) -> Result<(), SignupError> {
        if !self.draft.login_id.is_empty() {
            if let Err(e) = self.api.clear_registration_cache(&self.draft.login_id).await {
                warn!(error = %e, "failed to clear registration cache");
            }
        }
        self.storage.clear_signup_draft()?;
        self.draft = SignupDraft::default();
        Ok(())
    }
}

fn rejected(message: Option<String>, fallback: &str) -> SignupError {
    SignupError::Rejected(message.unwrap_or_else(|| fallback.to_string()))
}
