//! Form validation rules for login and signup input

use thiserror::Error;

/// Symbols accepted as the "special character" class in passwords
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Length of emailed one-time codes
pub const OTP_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Login id must be 5-20 letters or digits")]
    LoginId,

    #[error("Password must be 8-20 characters with a letter, a digit and a symbol")]
    Password,

    #[error("Password must be exactly 6 digits")]
    Pin,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Nickname must be 2-20 Hangul letters, letters or digits")]
    Nickname,

    #[error("Invalid email address")]
    Email,

    #[error("Verification code must be 6 digits")]
    Otp,
}

/// `local@domain.tld` with no whitespace
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn is_valid_login_id(s: &str) -> bool {
    (5..=20).contains(&s.chars().count()) && s.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn is_valid_password(s: &str) -> bool {
    let len = s.chars().count();
    (8..=20).contains(&len)
        && s.chars().any(|c| c.is_ascii_alphabetic())
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
}

pub fn is_valid_nickname(s: &str) -> bool {
    (2..=20).contains(&s.chars().count()) && s.chars().all(|c| c.is_ascii_alphanumeric() || is_hangul_syllable(c))
}

/// Six ASCII digits
pub fn is_valid_pin(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Keep digits only, capped at six
pub fn sanitize_otp(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).take(OTP_LEN).collect()
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

pub fn validate_login_form(login_id: &str, password: &str) -> Result<(), ValidationError> {
    if !is_valid_login_id(login_id) {
        return Err(ValidationError::LoginId);
    }
    if !is_valid_password(password) {
        return Err(ValidationError::Password);
    }
    Ok(())
}

pub fn validate_signup_form(
    login_id: &str,
    nickname: &str,
    email: &str,
    password: &str,
    password_confirm: &str,
) -> Result<(), ValidationError> {
    if !is_valid_login_id(login_id) {
        return Err(ValidationError::LoginId);
    }
    if !is_valid_nickname(nickname) {
        return Err(ValidationError::Nickname);
    }
    if !is_valid_email(email) {
        return Err(ValidationError::Email);
    }
    if !is_valid_password(password) {
        return Err(ValidationError::Password);
    }
    if password != password_confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}
