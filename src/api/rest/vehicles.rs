use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::actor::authorize;
use crate::error::AppError;
use crate::models::user::Actor;
use crate::models::vehicle::{NewVehicle, Vehicle, VehiclePatch, VehicleStatus};
use crate::policy::{Action, Resource};
use crate::state::AppState;
use crate::store::{EntityStore, StoreTx};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route(
            "/vehicles/:id",
            get(get_vehicle).put(update_vehicle).delete(delete_vehicle),
        )
        .route("/vehicles/:id/status", patch(update_vehicle_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: VehicleStatus,
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    authorize(&state, &actor, Action::View, Resource::Vehicle(None))?;
    Ok(Json(state.store.list_vehicles()))
}

async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    authorize(&state, &actor, Action::View, Resource::Vehicle(Some(id)))?;

    let vehicle = state
        .store
        .get_vehicle(id)
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

    Ok(Json(vehicle))
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewVehicle>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    authorize(&state, &actor, Action::CreateVehicle, Resource::Vehicle(None))?;

    let vehicle = Vehicle::new(payload)?;

    let mut tx = state.store.begin()?;
    tx.insert_vehicle(vehicle.clone())?;
    tx.commit()?;

    info!(
        vehicle_id = %vehicle.id,
        license_plate = %vehicle.license_plate,
        actor_id = %actor.user_id,
        "vehicle registered"
    );
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<VehiclePatch>,
) -> Result<Json<Vehicle>, AppError> {
    authorize(&state, &actor, Action::UpdateVehicle, Resource::Vehicle(Some(id)))?;

    let mut tx = state.store.begin()?;
    let mut vehicle = tx
        .get_vehicle(id)?
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

    vehicle.apply(payload)?;
    tx.update_vehicle(vehicle.clone())?;
    tx.commit()?;

    info!(vehicle_id = %id, actor_id = %actor.user_id, "vehicle updated");
    Ok(Json(vehicle))
}

async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &actor, Action::DeleteVehicle, Resource::Vehicle(Some(id)))?;

    let mut tx = state.store.begin()?;
    tx.delete_vehicle(id)?;
    tx.commit()?;

    info!(vehicle_id = %id, actor_id = %actor.user_id, "vehicle deleted");
    Ok(Json(json!({ "id": id, "deleted": true })))
}

async fn update_vehicle_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Vehicle>, AppError> {
    authorize(&state, &actor, Action::UpdateVehicle, Resource::Vehicle(Some(id)))?;

    let vehicle = state.engine.set_vehicle_status(&actor, id, payload.status)?;
    Ok(Json(vehicle))
}
