use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::warn;

use crate::error::AppError;
use crate::integrations::identity::bearer_token;
use crate::models::identity::{Actor, Role};
use crate::state::AppState;

/// Resolves `Authorization: Bearer <token>` to the calling [`Actor`].
#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(*actor);
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
        let token = bearer_token(header)
            .ok_or_else(|| AppError::Unauthorized("malformed authorization header".to_string()))?;

        let actor = state.identity.verify(token).inspect_err(|err| {
            warn!(uri = %parts.uri, error = %err, "authentication failed");
        })?;

        parts.extensions.insert(actor);
        Ok(actor)
    }
}

pub fn require_role(actor: &Actor, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&actor.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("{:?} role cannot do this", actor.role)))
    }
}
