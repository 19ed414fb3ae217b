//! Pure functions for mapping repository errors to HTTP status codes.
//!
//! Handlers live outside this crate; this is the mapping they answer with.

use super::RepositoryError;

/// Maps a [`RepositoryError`] to an HTTP status code.
///
/// - `NotFound` -> 404 (Not Found)
/// - `AlreadyExists` / `AllocationCollision` -> 409 (Conflict)
/// - `InvalidKey` / `InvalidData` -> 400 (Bad Request)
/// - `Throttled` -> 429 (Too Many Requests)
/// - `ConnectionFailed` -> 503 (Service Unavailable)
/// - `UnroutableQuery` / `QueryFailed` / `Serialization` -> 500 (Internal Server Error)
///
/// # Examples
///
/// ```
/// use issuetrack_core::storage::{RepositoryError, repository_error_to_status_code};
///
/// let error = RepositoryError::NotFound {
///     entity_type: "Project",
///     id: "abc-123".to_string(),
/// };
/// assert_eq!(repository_error_to_status_code(&error), 404);
/// ```
pub fn repository_error_to_status_code(error: &RepositoryError) -> u16 {
    match error {
        RepositoryError::NotFound { .. } => 404,
        RepositoryError::AlreadyExists { .. } => 409,
        RepositoryError::AllocationCollision { .. } => 409,
        RepositoryError::InvalidKey(_) => 400,
        RepositoryError::InvalidData(_) => 400,
        RepositoryError::Throttled(_) => 429,
        RepositoryError::ConnectionFailed(_) => 503,
        RepositoryError::UnroutableQuery(_) => 500,
        RepositoryError::QueryFailed(_) => 500,
        RepositoryError::Serialization(_) => 500,
    }
}
