//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates that a user or challenge identifier is non-empty, at most 64
/// characters, and free of whitespace.
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        let mut err = ValidationError::new("identifier_empty");
        err.message = Some("Identifier must not be empty".into());
        return Err(err);
    }

    if id.len() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!("Identifier must be at most {MAX_IDENTIFIER_LEN} characters (got {})", id.len())
                .into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("identifier_whitespace");
        err.message = Some("Identifier must not contain whitespace".into());
        return Err(err);
    }

    Ok(())
}
