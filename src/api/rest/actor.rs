use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::Actor;
use crate::policy::{Action, Decision, Resource};
use crate::state::AppState;
use crate::store::EntityStore;

/// Set by the session layer in front of this service.
pub const USER_HEADER: &str = "x-user-id";

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_HEADER} header")))?;

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::Unauthorized(format!("malformed {USER_HEADER} header")))?;

        let user = state
            .store
            .get_user(user_id)
            .filter(|user| user.is_active)
            .ok_or_else(|| AppError::Unauthorized("unknown or inactive user".to_string()))?;

        Ok(Actor::from(&user))
    }
}

pub fn authorize(
    state: &AppState,
    actor: &Actor,
    action: Action,
    resource: Resource,
) -> Result<(), AppError> {
    match state.policy.authorize(actor, action, &resource) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            warn!(
                actor_id = %actor.user_id,
                role = %actor.role,
                action = %action,
                resource = %resource,
                "access denied"
            );
            Err(AppError::Forbidden(format!(
                "role {} may not {} on {}",
                actor.role, action, resource
            )))
        }
    }
}
