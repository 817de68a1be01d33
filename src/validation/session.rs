use sonic_rs::JsonValueTrait;

use crate::error::{AppError, Result};

/// Extracts the `identity` field from a session-creation body.
///
/// The body is parsed as JSON whatever the declared content type. Valid JSON
/// that is not an object has no `identity` and is reported as such.
///
/// # Arguments
///
/// * `body` - The raw request body.
///
/// # Returns
///
/// A `Result` containing the identity, or a validation error carrying the
/// message the API reports.
pub fn extract_identity(body: &[u8]) -> Result<String> {
    let json: sonic_rs::Value = sonic_rs::from_slice(body)
        .map_err(|_| AppError::Validation("invalid json payload".to_string()))?;

    json.get("identity")
        .and_then(|identity| identity.as_str())
        .map(|identity| identity.to_string())
        .ok_or_else(|| AppError::Validation("identity missing".to_string()))
}
