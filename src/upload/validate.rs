//! Upload validation and naming
//!
//! The same rules apply to a finished interview recording and to files a
//! candidate picks by hand.

use super::UploadError;
use crate::recorder::container_type;
use chrono::{DateTime, TimeZone};

/// Largest accepted interview video
pub const MAX_VIDEO_BYTES: u64 = 500 * 1024 * 1024;

/// Largest accepted resume
pub const MAX_RESUME_BYTES: u64 = 10 * 1024 * 1024;

pub const VIDEO_MIME_TYPES: [&str; 4] = ["video/mp4", "video/webm", "video/avi", "video/quicktime"];

pub const RESUME_MIME_TYPES: [&str; 3] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "webm", "avi", "mov"];

pub const RESUME_EXTENSIONS: [&str; 3] = ["pdf", "doc", "docx"];

fn validate(mime_type: &str, size: u64, allowed: &[&str], limit: u64) -> Result<(), UploadError> {
    let container = container_type(mime_type);
    if !allowed.contains(&container) {
        return Err(UploadError::UnsupportedType(mime_type.to_string()));
    }
    if size == 0 {
        return Err(UploadError::EmptyFile);
    }
    if size > limit {
        return Err(UploadError::TooLarge { size, limit });
    }
    Ok(())
}

/// MP4, WebM, AVI or QuickTime, at most 500 MB
pub fn validate_video(mime_type: &str, size: u64) -> Result<(), UploadError> {
    validate(mime_type, size, &VIDEO_MIME_TYPES, MAX_VIDEO_BYTES)
}

/// PDF, DOC or DOCX, at most 10 MB
pub fn validate_resume(mime_type: &str, size: u64) -> Result<(), UploadError> {
    validate(mime_type, size, &RESUME_MIME_TYPES, MAX_RESUME_BYTES)
}

/// Whether `file_name` has one of `extensions` (case-insensitive)
pub fn allowed_file(file_name: &str, extensions: &[&str]) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Reduce a user-supplied name to a safe ASCII file name
pub fn secure_filename(file_name: &str) -> String {
    // Only the last path component counts.
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// `YYYYmmdd_HHMMSS_<secure name>`
pub fn stored_file_name<Tz: TimeZone>(file_name: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), secure_filename(file_name))
}
