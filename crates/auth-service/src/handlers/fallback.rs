//! Error page and unmatched-route handler.

use crate::errors::AuthError;

/// Generic error page.
///
/// ANY /error
pub async fn error_page() -> AuthError {
    AuthError::BadRequest("The request could not be processed".to_string())
}

/// Fallback for unmatched routes.
pub async fn not_found() -> AuthError {
    AuthError::NotFound
}
