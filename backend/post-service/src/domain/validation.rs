/// Input rules for user-supplied text
///
/// Lengths are counted in characters after trimming surrounding whitespace.
use thiserror::Error;

pub const MAX_COMMENT_CHARS: usize = 500;
pub const MAX_CAPTION_CHARS: usize = 2200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{field} exceeds {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// Trimmed comment body, 1..=500 characters
pub fn comment_content(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty("comment"));
    }
    check_length("comment", trimmed, MAX_COMMENT_CHARS)?;
    Ok(trimmed.to_string())
}

/// Trimmed caption; blank captions are stored as no caption
pub fn caption(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let trimmed = match raw.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => return Ok(None),
    };
    check_length("caption", trimmed, MAX_CAPTION_CHARS)?;
    Ok(Some(trimmed.to_string()))
}

fn check_length(field: &'static str, text: &str, max: usize) -> Result<(), ValidationError> {
    let actual = text.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}
