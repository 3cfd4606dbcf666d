//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::InvalidKey(_) => format!("{}\n\nKeys look like movie:tt0111161 or episode:tt0903747:2:5", e),
        _ => e.to_string(),
    }
}
