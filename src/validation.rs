//! Input validation for values that reach the filesystem or the scheduler
//!
//! Profile names become file names in the directory store, so anything that
//! could escape the store directory is rejected here.

use crate::error::{VpnsyncError, VpnsyncResult};

/// Maximum length of a profile name (platform phonebook entry limit)
const MAX_PROFILE_NAME_LEN: usize = 256;

/// Maximum length for error messages shown to users
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Validate a profile name before it is used as a store key
///
/// Names may contain spaces and most punctuation, but not path separators,
/// control characters, or a leading dot.
pub fn validate_profile_name(name: &str) -> VpnsyncResult<()> {
    if name.trim().is_empty() {
        return Err(VpnsyncError::InvalidParameter(
            "Profile name cannot be empty".to_string()
        ));
    }

    if name.chars().count() > MAX_PROFILE_NAME_LEN {
        return Err(VpnsyncError::InvalidParameter(
            format!("Profile name too long (max {} characters)", MAX_PROFILE_NAME_LEN)
        ));
    }

    for c in name.chars() {
        if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            return Err(VpnsyncError::InvalidParameter(
                format!("Invalid profile name '{}': contains invalid character {:?}", name.escape_debug(), c)
            ));
        }
    }

    // Hidden files and "..", which would also escape the directory
    if name.starts_with('.') {
        return Err(VpnsyncError::InvalidParameter(
            "Profile name cannot start with a dot".to_string()
        ));
    }

    if name != name.trim() {
        return Err(VpnsyncError::InvalidParameter(
            "Profile name cannot start or end with whitespace".to_string()
        ));
    }

    Ok(())
}

/// Validate the base reconciliation period
pub fn validate_period(seconds: u64) -> VpnsyncResult<()> {
    if seconds == 0 {
        return Err(VpnsyncError::InvalidParameter(
            "Reconciliation period must be at least 1 second".to_string()
        ));
    }
    // One day
    if seconds > 86_400 {
        return Err(VpnsyncError::InvalidParameter(
            "Reconciliation period cannot exceed 86400 seconds".to_string()
        ));
    }
    Ok(())
}

/// Validate the jitter fraction applied around the base period
pub fn validate_jitter_fraction(fraction: f64) -> VpnsyncResult<()> {
    if !fraction.is_finite() || !(0.0..1.0).contains(&fraction) {
        return Err(VpnsyncError::InvalidParameter(
            format!("Jitter fraction must be in [0, 1), got {}", fraction)
        ));
    }
    Ok(())
}

/// Sanitize platform error text before it is logged or reported
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized: String = message
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("... (truncated)");
    }

    sanitized
}
