//! Registration, login and account endpoints

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{ApiClient, ApiError, ApiRequest};
use crate::api::types::{
    ApiResponse, FindIdResponse, PasswordResetVerifyResponse, ProfileResponse, SendEmailCodeResponse,
    SignupStepResponse,
};
use crate::models::LoginResponse;

impl ApiClient {
    /// Signup step 1: reserve a login id (also resets the server-side draft)
    pub async fn check_id(&self, login_id: &str) -> Result<SignupStepResponse, ApiError> {
        self.post("/api/register/check-id/", &json!({ "login_id": login_id })).await
    }

    /// Signup step 2
    pub async fn register_nickname(&self, login_id: &str, nickname: &str) -> Result<SignupStepResponse, ApiError> {
        self.post(
            "/api/register/nickname/",
            &json!({ "login_id": login_id, "nickname": nickname }),
        )
        .await
    }

    /// Mail the verification code; delivery can take a while
    pub async fn send_email_code(&self, email: &str) -> Result<SendEmailCodeResponse, ApiError> {
        let req = ApiRequest::new(Method::POST, "/api/register/email-request/")
            .json(&json!({ "email": email }))?
            .timeout(Duration::from_secs(self.config.email_timeout_secs));
        self.execute(req).await
    }

    /// Signup step 3: attach the verified email
    pub async fn register_email(
        &self,
        login_id: &str,
        nickname: &str,
        email: &str,
        code: &str,
    ) -> Result<SignupStepResponse, ApiError> {
        let req = ApiRequest::new(Method::POST, "/api/register/email/")
            .json(&json!({ "login_id": login_id, "nickname": nickname, "email": email, "code": code }))?
            .timeout(Duration::from_secs(self.config.email_verify_timeout_secs));
        self.execute(req).await
    }

    /// Standalone code check (find-id / reset flows)
    pub async fn verify_email_code(&self, email: &str, code: &str) -> Result<SignupStepResponse, ApiError> {
        self.post("/api/register/verify-email/", &json!({ "email": email, "code": code }))
            .await
    }

    /// Signup step 4
    pub async fn register_password(
        &self,
        login_id: &str,
        nickname: &str,
        password: &str,
    ) -> Result<SignupStepResponse, ApiError> {
        self.post(
            "/api/register/password/",
            &json!({ "login_id": login_id, "nickname": nickname, "password": password }),
        )
        .await
    }

    /// Signup step 5: face vectors produced by the Jetson
    pub async fn save_face_vector(&self, login_id: &str, face_vectors: &[Vec<f64>]) -> Result<SignupStepResponse, ApiError> {
        self.post(
            "/api/biometric/save-face/",
            &json!({ "login_id": login_id, "face_vectors": face_vectors }),
        )
        .await
    }

    /// Signup step 6: voice vectors (or none to skip); completes registration
    pub async fn save_voice_vector(&self, login_id: &str, voice_vectors: Option<&[f64]>) -> Result<LoginResponse, ApiError> {
        if login_id.is_empty() {
            return Err(ApiError::InvalidRequest("login_id is required"));
        }
        debug!(login_id, has_vectors = voice_vectors.is_some(), "saving voice vectors");
        self.post(
            "/api/biometric/save-voice/",
            &json!({ "login_id": login_id, "voice_vectors": voice_vectors }),
        )
        .await
    }

    pub async fn skip_voice(&self, login_id: &str) -> Result<LoginResponse, ApiError> {
        self.save_voice_vector(login_id, None).await
    }

    pub async fn clear_registration_cache(&self, login_id: &str) -> Result<ApiResponse, ApiError> {
        self.post("/api/register/clear-cache/", &json!({ "login_id": login_id }))
            .await
    }

    pub async fn login_password(&self, login_id: &str, password: &str) -> Result<LoginResponse, ApiError> {
        #[derive(Serialize)]
        struct PasswordLogin<'a> {
            login_id: &'a str,
            password: &'a str,
        }

        self.post("/api/login/password/", &PasswordLogin { login_id, password })
            .await
    }

    /// Log in with vectors the Jetson extracted from a face image
    pub async fn login_face(&self, face_vectors: &[Vec<f64>]) -> Result<LoginResponse, ApiError> {
        self.post("/api/login/face/", &json!({ "face_vectors": face_vectors }))
            .await
    }

    /// Blacklist the refresh token and end the server session
    pub async fn logout(&self, refresh_token: &str) -> Result<ApiResponse, ApiError> {
        self.post("/api/auth/logout/", &json!({ "refresh": refresh_token }))
            .await
    }

    pub async fn profile(&self) -> Result<ProfileResponse, ApiError> {
        self.get("/api/user/profile/").await
    }

    pub async fn update_profile(&self, nickname: &str) -> Result<ApiResponse, ApiError> {
        self.patch("/api/user/profile/update/", &json!({ "nickname": nickname }))
            .await
    }

    pub async fn delete_account(
        &self,
        login_id: &str,
        password: &str,
        reason: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        self.post(
            "/api/account/delete/",
            &json!({ "login_id": login_id, "password": password, "deletion_reason": reason }),
        )
        .await
    }

    pub async fn find_id(&self, email: &str, code: &str) -> Result<FindIdResponse, ApiError> {
        self.post("/api/find-id/", &json!({ "email": email, "code": code })).await
    }

    pub async fn request_password_reset(&self, login_id: &str, email: &str) -> Result<ApiResponse, ApiError> {
        self.post(
            "/api/password/reset-request/",
            &json!({ "login_id": login_id, "email": email }),
        )
        .await
    }

    pub async fn verify_password_reset_code(
        &self,
        login_id: &str,
        email: &str,
        code: &str,
    ) -> Result<PasswordResetVerifyResponse, ApiError> {
        self.post(
            "/api/password/reset-verify-code/",
            &json!({ "login_id": login_id, "email": email, "code": code }),
        )
        .await
    }

    pub async fn set_new_password(&self, reset_token: &str, new_password: &str) -> Result<ApiResponse, ApiError> {
        self.post(
            "/api/password/reset-set-new/",
            &json!({ "reset_token": reset_token, "new_password": new_password }),
        )
        .await
    }
}
