use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::actor::authorize;
use crate::error::AppError;
use crate::models::user::{Actor, NewUser, Role, User};
use crate::policy::{Action, Resource};
use crate::state::AppState;
use crate::store::{EntityStore, StoreTx};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/role", patch(update_role))
        .route("/users/:id/active", patch(update_active))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub is_active: bool,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<User>>, AppError> {
    authorize(&state, &actor, Action::ManageUsers, Resource::User(None))?;
    Ok(Json(state.store.list_users()))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    authorize(&state, &actor, Action::ManageUsers, Resource::User(None))?;

    let user = User::new(payload)?;

    let mut tx = state.store.begin()?;
    tx.insert_user(user.clone())?;
    tx.commit()?;

    info!(user_id = %user.id, role = %user.role, actor_id = %actor.user_id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    authorize(&state, &actor, Action::ManageUsers, Resource::User(Some(id)))?;

    let user = modify_user(&state, id, |user| user.role = payload.role)?;

    info!(user_id = %id, role = %user.role, actor_id = %actor.user_id, "user role changed");
    Ok(Json(user))
}

async fn update_active(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<User>, AppError> {
    authorize(&state, &actor, Action::ManageUsers, Resource::User(Some(id)))?;

    if id == actor.user_id && !payload.is_active {
        return Err(AppError::BadRequest(
            "an admin cannot deactivate their own account".to_string(),
        ));
    }

    let user = modify_user(&state, id, |user| user.is_active = payload.is_active)?;

    info!(
        user_id = %id,
        is_active = user.is_active,
        actor_id = %actor.user_id,
        "user activation changed"
    );
    Ok(Json(user))
}

fn modify_user(
    state: &AppState,
    id: Uuid,
    change: impl FnOnce(&mut User),
) -> Result<User, AppError> {
    let mut tx = state.store.begin()?;
    let mut user = tx
        .get_user(id)?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    change(&mut user);
    tx.update_user(user.clone())?;
    tx.commit()?;

    Ok(user)
}
