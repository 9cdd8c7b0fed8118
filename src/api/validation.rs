//! Input validation for API requests.
//!
//! Each function checks a single field and returns a human-readable message
//! on failure. Collect several of them with `ValidationErrorBuilder::check`.

use lazy_static::lazy_static;
use regex::Regex;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_TEXT_LENGTH: usize = 2000;
pub const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    /// Deliberately loose: one `@`, no whitespace, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < min_length {
        return Err(format!(
            "Password is too short (min {} characters)",
            min_length
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LENGTH
        ));
    }

    Ok(())
}

/// Validate an athlete display name
pub fn validate_athlete_name(name: &str) -> Result<(), String> {
    validate_name(name, "Name")
}

pub fn validate_tag_name(name: &str) -> Result<(), String> {
    validate_name(name, "Tag name")
}

fn validate_name(name: &str, label: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("{} is required", label));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "{} is too long (max {} characters)",
            label, MAX_NAME_LENGTH
        ));
    }

    Ok(())
}

/// Validate optional free text (descriptions, notes)
pub fn validate_text(text: &Option<String>) -> Result<(), String> {
    if let Some(t) = text {
        if t.chars().count() > MAX_TEXT_LENGTH {
            return Err(format!(
                "Text is too long (max {} characters)",
                MAX_TEXT_LENGTH
            ));
        }
    }

    Ok(())
}

/// Validate a position inside a video, in whole seconds (optional field)
pub fn validate_timestamp(timestamp_sec: Option<i64>) -> Result<(), String> {
    match timestamp_sec {
        Some(t) if t < 0 => Err("Timestamp must not be negative".to_string()),
        _ => Ok(()),
    }
}

/// Validate an uploaded file name and return its lower-cased extension.
///
/// The MIME type guessed from the extension must be `video/*`.
pub fn validate_video_filename(filename: &str) -> Result<String, String> {
    if filename.is_empty() {
        return Err("Video file name is required".to_string());
    }

    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| "Video file must have an extension".to_string())?;

    let is_video = mime_guess::from_ext(&extension)
        .iter()
        .any(|m| m.type_() == mime_guess::mime::VIDEO);
    if !is_video {
        return Err(format!("Unsupported video format: .{}", extension));
    }

    Ok(extension)
}

/// Trim a text field and drop it when nothing is left
pub fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
