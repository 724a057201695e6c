//! Authorization policy enforcement.
//!
//! Runs after the authentication gate. Reads the optional [`AuthContext`]
//! from the request extensions and asks the [`AuthorizationPolicy`] whether
//! the request may reach its handler.

use crate::errors::AuthError;
use crate::middleware::auth::AuthContext;
use crate::observability::metrics::record_authorization_decision;
use crate::policy::{AuthorizationPolicy, PolicyDenial};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Policy enforcement middleware.
#[instrument(skip_all, name = "auth.policy")]
pub async fn enforce_policy(
    State(policy): State<Arc<AuthorizationPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    let decision = policy.authorize(
        req.method(),
        req.uri().path(),
        req.extensions().get::<AuthContext>(),
    );

    match decision {
        Ok(()) => {
            record_authorization_decision("allowed");
            next.run(req).await
        }
        Err(denial) => {
            let outcome = match &denial {
                PolicyDenial::Forbidden => "forbidden",
                PolicyDenial::InsufficientRole { .. } => "insufficient_role",
            };
            tracing::debug!(
                target: "auth.policy",
                method = %req.method(),
                path = %req.uri().path(),
                outcome,
                "Request denied by policy"
            );
            record_authorization_decision(outcome);
            AuthError::from(denial).into_response()
        }
    }
}
