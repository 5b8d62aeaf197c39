use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::rest::actor::authorize;
use crate::engine::capacity::Verdict;
use crate::engine::{NewTrip, TripAssignments, TripDetail};
use crate::error::AppError;
use crate::models::trip::{Trip, TripStatus};
use crate::models::user::Actor;
use crate::policy::{Action, Resource};
use crate::state::{AppState, TripEventKind};
use crate::store::EntityStore;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/preview", post(preview_trip))
        .route("/trips/:id", get(get_trip).delete(delete_trip))
        .route("/trips/:id/deliveries", put(replace_deliveries))
        .route("/trips/:id/status", patch(update_trip_status))
}

#[derive(Serialize)]
pub struct TripSummary {
    #[serde(flatten)]
    pub trip: Trip,
    pub vehicle_name: Option<String>,
    pub license_plate: Option<String>,
    pub delivery_count: usize,
}

#[derive(Deserialize)]
pub struct ReplaceDeliveriesRequest {
    pub delivery_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TripStatus,
}

#[derive(Deserialize)]
pub struct PreviewRequest {
    pub vehicle_id: Uuid,
    pub delivery_ids: Vec<Uuid>,
}

async fn list_trips(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<TripSummary>>, AppError> {
    authorize(&state, &actor, Action::View, Resource::Trip(None))?;

    let vehicles: HashMap<Uuid, (String, String)> = state
        .store
        .list_vehicles()
        .into_iter()
        .map(|vehicle| (vehicle.id, (vehicle.name, vehicle.license_plate)))
        .collect();

    let summaries = state
        .store
        .list_trips()
        .into_iter()
        .map(|trip| {
            let vehicle = vehicles.get(&trip.vehicle_id);
            TripSummary {
                vehicle_name: vehicle.map(|(name, _)| name.clone()),
                license_plate: vehicle.map(|(_, plate)| plate.clone()),
                delivery_count: state.store.assignment_count(trip.id),
                trip,
            }
        })
        .collect();

    Ok(Json(summaries))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<TripDetail>, AppError> {
    authorize(&state, &actor, Action::View, Resource::Trip(Some(id)))?;
    Ok(Json(state.engine.trip_detail(id)?))
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewTrip>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    authorize(&state, &actor, Action::PlanTrips, Resource::Trip(None))?;

    let started = Instant::now();
    let result = state.engine.create_trip(&actor, payload);
    state
        .metrics
        .observe_operation("create_trip", started, &result);
    let trip = result?;

    refresh_utilization(&state, trip.vehicle_id);
    state.publish(TripEventKind::Created, &trip);

    Ok((StatusCode::CREATED, Json(trip)))
}

async fn replace_deliveries(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceDeliveriesRequest>,
) -> Result<Json<TripAssignments>, AppError> {
    authorize(&state, &actor, Action::PlanTrips, Resource::Trip(Some(id)))?;

    let started = Instant::now();
    let result = state
        .engine
        .replace_assignments(&actor, id, payload.delivery_ids);
    state
        .metrics
        .observe_operation("replace_assignments", started, &result);
    let replaced = result?;

    refresh_utilization(&state, replaced.trip.vehicle_id);
    state.publish(TripEventKind::AssignmentsReplaced, &replaced.trip);

    Ok(Json(replaced))
}

async fn update_trip_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Trip>, AppError> {
    authorize(&state, &actor, Action::PlanTrips, Resource::Trip(Some(id)))?;

    let started = Instant::now();
    let result = state.engine.update_trip_status(&actor, id, payload.status);
    state
        .metrics
        .observe_operation("update_trip_status", started, &result);
    let trip = result?;

    refresh_utilization(&state, trip.vehicle_id);
    state.publish(TripEventKind::StatusChanged, &trip);
    Ok(Json(trip))
}

async fn delete_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &actor, Action::PlanTrips, Resource::Trip(Some(id)))?;

    let started = Instant::now();
    let result = state.engine.delete_trip(&actor, id);
    state
        .metrics
        .observe_operation("delete_trip", started, &result);
    let trip = result?;

    refresh_utilization(&state, trip.vehicle_id);
    state.publish(TripEventKind::Deleted, &trip);
    Ok(Json(json!({ "id": id, "deleted": true })))
}

async fn preview_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<PreviewRequest>,
) -> Result<Json<Verdict>, AppError> {
    authorize(&state, &actor, Action::PlanTrips, Resource::Trip(None))?;

    let verdict = state
        .engine
        .preview(payload.vehicle_id, &payload.delivery_ids)?;
    Ok(Json(verdict))
}

/// Recomputes a vehicle's load over all of its active trips.
fn refresh_utilization(state: &AppState, vehicle_id: Uuid) {
    let active: Vec<Trip> = state
        .store
        .list_trips()
        .into_iter()
        .filter(|trip| trip.vehicle_id == vehicle_id && trip.status.is_active())
        .collect();

    match state.store.get_vehicle(vehicle_id) {
        Some(vehicle) if !active.is_empty() => {
            let total_weight: f64 = active.iter().map(|trip| trip.total_weight).sum();
            state
                .metrics
                .record_utilization(vehicle_id, total_weight, vehicle.capacity_weight);
        }
        _ => state.metrics.clear_utilization(vehicle_id),
    }
}
