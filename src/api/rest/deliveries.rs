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
use crate::models::delivery::{Delivery, DeliveryPatch, DeliveryStatus, NewDelivery};
use crate::models::user::Actor;
use crate::policy::{Action, Resource};
use crate::state::AppState;
use crate::store::{EntityStore, StoreTx};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", get(list_deliveries).post(create_delivery))
        .route(
            "/deliveries/:id",
            get(get_delivery)
                .put(update_delivery)
                .delete(delete_delivery),
        )
        .route("/deliveries/:id/status", patch(update_delivery_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Delivery>>, AppError> {
    authorize(&state, &actor, Action::View, Resource::Delivery(None))?;
    Ok(Json(state.store.list_deliveries()))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    authorize(&state, &actor, Action::View, Resource::Delivery(Some(id)))?;

    let delivery = state
        .store
        .get_delivery(id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    Ok(Json(delivery))
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewDelivery>,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    authorize(&state, &actor, Action::CreateDelivery, Resource::Delivery(None))?;

    let delivery = Delivery::new(payload, actor.user_id)?;

    let mut tx = state.store.begin()?;
    tx.insert_delivery(delivery.clone())?;
    tx.commit()?;

    info!(delivery_id = %delivery.id, actor_id = %actor.user_id, "delivery created");
    Ok((StatusCode::CREATED, Json(delivery)))
}

async fn update_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryPatch>,
) -> Result<Json<Delivery>, AppError> {
    authorize(&state, &actor, Action::UpdateDelivery, Resource::Delivery(Some(id)))?;

    let mut tx = state.store.begin()?;
    let mut delivery = tx
        .get_delivery(id)?
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    if payload.touches_load() {
        if let Some(trip_id) = tx.trips_for_delivery(id)?.first() {
            return Err(AppError::Conflict(format!(
                "delivery {id} is on trip {trip_id}; remove it from the trip before changing weight or volume"
            )));
        }
    }

    delivery.apply(payload)?;
    tx.update_delivery(delivery.clone())?;
    tx.commit()?;

    info!(delivery_id = %id, actor_id = %actor.user_id, "delivery updated");
    Ok(Json(delivery))
}

async fn delete_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &actor, Action::DeleteDelivery, Resource::Delivery(Some(id)))?;

    let mut tx = state.store.begin()?;
    tx.delete_delivery(id)?;
    tx.commit()?;

    info!(delivery_id = %id, actor_id = %actor.user_id, "delivery deleted");
    Ok(Json(json!({ "id": id, "deleted": true })))
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    authorize(
        &state,
        &actor,
        Action::RecordDeliveryEvent,
        Resource::Delivery(Some(id)),
    )?;

    let delivery = state
        .engine
        .record_delivery_event(&actor, id, payload.status)?;
    Ok(Json(delivery))
}
