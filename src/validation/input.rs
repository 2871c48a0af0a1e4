use garde::Validate;

use crate::error::{AppError, Result};

/// Runs the garde rules of a request payload.
///
/// # Arguments
///
/// * `value` - The payload to validate.
///
/// # Returns
///
/// A `Result<()>` carrying every rule violation as a `BadRequest`.
pub fn validate<T>(value: &T) -> Result<()>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| AppError::BadRequest(report.to_string().trim().to_string()))
}

/// Validates a session hash: eight lowercase hex characters.
pub fn validate_session_hash(hash: &str) -> Result<()> {
    if hash.len() != 8 || !hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return Err(AppError::BadRequest(
            "Session hash must be 8 lowercase hex characters".to_string(),
        ));
    }
    Ok(())
}

/// Validates a search query.
pub fn validate_query(query: &str) -> Result<()> {
    if query.is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".to_string()));
    }

    if query.len() > 200 {
        return Err(AppError::BadRequest(
            "Query must be at most 200 characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{Difficulty, TaskDescriptor};

    #[test]
    fn session_hash_shape() {
        assert!(validate_session_hash("0a1b2c3d").is_ok());
        assert!(validate_session_hash("0A1B2C3D").is_err());
        assert!(validate_session_hash("0a1b2c3").is_err());
        assert!(validate_session_hash("0a1b2c3g").is_err());
    }

    #[test]
    fn query_bounds() {
        assert!(validate_query("stack").is_ok());
        assert!(validate_query("").is_err());
        assert!(validate_query(&"q".repeat(201)).is_err());
    }

    #[test]
    fn descriptor_rules_surface_as_bad_request() {
        let descriptor = TaskDescriptor {
            category: String::new(),
            difficulty: Difficulty::Easy,
            title: None,
        };
        let err = validate(&descriptor).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("category")));
    }
}
