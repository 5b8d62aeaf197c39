use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::capacity::{self, Candidate, Verdict};
use crate::engine::{TripEngine, ensure_distinct, load_deliveries, transitions};
use crate::error::EngineError;
use crate::geo::{RouteLength, route_length};
use crate::models::delivery::Delivery;
use crate::models::trip::{Trip, TripAssignment, TripStatus};
use crate::models::user::Actor;
use crate::models::vehicle::Vehicle;
use crate::models::{EntityKind, required_text};
use crate::store::{EntityStore, StoreTx};

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySpec {
    pub delivery_id: Uuid,
    pub sequence_order: u32,
    #[serde(default)]
    pub estimated_arrival: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub name: String,
    pub vehicle_id: Uuid,
    pub planned_start: DateTime<Utc>,
    #[serde(default)]
    pub planned_end: Option<DateTime<Utc>>,
    pub deliveries: Vec<DeliverySpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripAssignments {
    pub trip: Trip,
    pub assignments: Vec<TripAssignment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripStop {
    #[serde(flatten)]
    pub assignment: TripAssignment,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripDetail {
    pub trip: Trip,
    pub vehicle: Vehicle,
    pub stops: Vec<TripStop>,
    pub route: RouteLength,
}

/// Caller-supplied sequence numbers must already be exactly 1..N.
fn validate_specs(specs: &[DeliverySpec]) -> Result<(), EngineError> {
    if specs.is_empty() {
        return Err(EngineError::validation(
            "a trip needs at least one delivery",
        ));
    }

    let ids: Vec<Uuid> = specs.iter().map(|spec| spec.delivery_id).collect();
    ensure_distinct(&ids)?;

    let mut orders: Vec<u32> = specs.iter().map(|spec| spec.sequence_order).collect();
    orders.sort_unstable();
    let dense = orders
        .iter()
        .enumerate()
        .all(|(index, order)| *order as usize == index + 1);
    if !dense {
        return Err(EngineError::validation(format!(
            "sequence_order must run from 1 to {} without gaps or repeats",
            specs.len()
        )));
    }

    Ok(())
}

fn rebind_delivery<T: StoreTx>(tx: &mut T, delivery: &Delivery) -> Result<(), EngineError> {
    let next = transitions::bind_delivery(delivery.status)?;
    tx.update_delivery_status(delivery.id, next)?;
    Ok(())
}

/// Puts an assigned delivery back to pending, unless another trip still holds it.
/// Returns whether the status changed.
fn release_delivery<T: StoreTx>(
    tx: &mut T,
    trip_id: Uuid,
    delivery_id: Uuid,
) -> Result<bool, EngineError> {
    let held_elsewhere = tx
        .trips_for_delivery(delivery_id)?
        .into_iter()
        .any(|other| other != trip_id);
    if held_elsewhere {
        return Ok(false);
    }

    let Some(delivery) = tx.get_delivery(delivery_id)? else {
        return Ok(false);
    };
    match transitions::release_delivery(delivery.status) {
        Some(next) => {
            tx.update_delivery_status(delivery_id, next)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Puts every assigned delivery of a trip back to pending and returns the ids released.
pub(crate) fn release_trip_deliveries<T: StoreTx>(
    tx: &mut T,
    trip_id: Uuid,
    assignments: &[TripAssignment],
) -> Result<Vec<Uuid>, EngineError> {
    let mut released = Vec::new();
    for row in assignments {
        if release_delivery(tx, trip_id, row.delivery_id)? {
            released.push(row.delivery_id);
        }
    }
    Ok(released)
}

/// Re-derives a vehicle's status once one of its trips is no longer active.
pub(crate) fn settle_vehicle<T: StoreTx>(tx: &mut T, vehicle_id: Uuid) -> Result<(), EngineError> {
    let Some(vehicle) = tx.get_vehicle(vehicle_id)? else {
        return Ok(());
    };
    let has_active_trip = !tx.get_active_trips_for_vehicle(vehicle_id)?.is_empty();
    let next = transitions::release_vehicle(vehicle.status, has_active_trip);
    if next != vehicle.status {
        tx.update_vehicle_status(vehicle_id, next)?;
    }
    Ok(())
}

impl<S: EntityStore> TripEngine<S> {
    pub fn create_trip(&self, actor: &Actor, input: NewTrip) -> Result<Trip, EngineError> {
        let vehicle_id = input.vehicle_id;
        self.plan_trip(actor, input).inspect_err(|err| {
            warn!(
                vehicle_id = %vehicle_id,
                actor_id = %actor.user_id,
                error = %err,
                "trip creation rejected"
            );
        })
    }

    fn plan_trip(&self, actor: &Actor, input: NewTrip) -> Result<Trip, EngineError> {
        let name = required_text("name", &input.name)?;
        if let Some(end) = input.planned_end {
            if end < input.planned_start {
                return Err(EngineError::validation(
                    "planned_end must not be before planned_start",
                ));
            }
        }
        validate_specs(&input.deliveries)?;

        let mut tx = self.store().begin()?;

        let vehicle = tx
            .get_vehicle(input.vehicle_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, input.vehicle_id))?;

        let ids: Vec<Uuid> = input.deliveries.iter().map(|spec| spec.delivery_id).collect();
        let deliveries = load_deliveries(&tx, &ids)?;

        let candidates: Vec<Candidate> = deliveries.iter().map(Candidate::from).collect();
        let verdict = capacity::evaluate(vehicle.capacity(), &candidates)?;

        let now = Utc::now();
        let trip = Trip {
            id: Uuid::new_v4(),
            name,
            vehicle_id: vehicle.id,
            planned_start: input.planned_start,
            planned_end: input.planned_end,
            total_weight: verdict.total_weight,
            total_volume: verdict.total_volume,
            status: TripStatus::Planned,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };
        tx.insert_trip(trip.clone())?;

        let rows = input
            .deliveries
            .iter()
            .map(|spec| TripAssignment {
                trip_id: trip.id,
                delivery_id: spec.delivery_id,
                sequence_order: spec.sequence_order,
                estimated_arrival: spec.estimated_arrival,
                actual_arrival: None,
            })
            .collect();
        tx.insert_assignments(trip.id, rows)?;

        for delivery in &deliveries {
            rebind_delivery(&mut tx, delivery)?;
        }

        let vehicle_status = transitions::bind_vehicle(vehicle.status)?;
        if vehicle_status != vehicle.status {
            tx.update_vehicle_status(vehicle.id, vehicle_status)?;
        }

        tx.commit()?;

        info!(
            trip_id = %trip.id,
            vehicle_id = %vehicle.id,
            actor_id = %actor.user_id,
            deliveries = deliveries.len(),
            total_weight = trip.total_weight,
            total_volume = trip.total_volume,
            "trip created"
        );

        Ok(trip)
    }

    /// Replaces a trip's delivery set with `delivery_ids`, numbered 1..N in the given order.
    pub fn replace_assignments(
        &self,
        actor: &Actor,
        trip_id: Uuid,
        delivery_ids: Vec<Uuid>,
    ) -> Result<TripAssignments, EngineError> {
        self.reassign(actor, trip_id, delivery_ids)
            .inspect_err(|err| {
                warn!(
                    trip_id = %trip_id,
                    actor_id = %actor.user_id,
                    error = %err,
                    "trip deliveries replacement rejected"
                );
            })
    }

    fn reassign(
        &self,
        actor: &Actor,
        trip_id: Uuid,
        delivery_ids: Vec<Uuid>,
    ) -> Result<TripAssignments, EngineError> {
        ensure_distinct(&delivery_ids)?;

        let mut tx = self.store().begin()?;

        let mut trip = tx
            .get_trip(trip_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Trip, trip_id))?;
        if !trip.status.is_active() {
            return Err(EngineError::validation(format!(
                "trip {trip_id} is {}; its deliveries can no longer change",
                trip.status
            )));
        }
        let vehicle = tx
            .get_vehicle(trip.vehicle_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, trip.vehicle_id))?;

        let current = tx.get_assignments(trip_id)?;
        let current_ids: HashSet<Uuid> = current.iter().map(|row| row.delivery_id).collect();
        let wanted_ids: HashSet<Uuid> = delivery_ids.iter().copied().collect();

        for row in current
            .iter()
            .filter(|row| !wanted_ids.contains(&row.delivery_id))
        {
            release_delivery(&mut tx, trip_id, row.delivery_id)?;
        }

        let deliveries = load_deliveries(&tx, &delivery_ids)?;
        let added: Vec<&Delivery> = deliveries
            .iter()
            .filter(|delivery| !current_ids.contains(&delivery.id))
            .collect();

        let added_candidates: Vec<Candidate> =
            added.iter().map(|delivery| Candidate::from(*delivery)).collect();
        capacity::ensure_assignable(&added_candidates)?;

        let candidates: Vec<Candidate> = deliveries.iter().map(Candidate::from).collect();
        let verdict = capacity::check_totals(vehicle.capacity(), &candidates)?;

        let arrivals: HashMap<Uuid, &TripAssignment> =
            current.iter().map(|row| (row.delivery_id, row)).collect();
        let rows: Vec<TripAssignment> = delivery_ids
            .iter()
            .enumerate()
            .map(|(index, delivery_id)| {
                let previous = arrivals.get(delivery_id);
                TripAssignment {
                    trip_id,
                    delivery_id: *delivery_id,
                    sequence_order: index as u32 + 1,
                    estimated_arrival: previous.and_then(|row| row.estimated_arrival),
                    actual_arrival: previous.and_then(|row| row.actual_arrival),
                }
            })
            .collect();

        tx.delete_assignments(trip_id)?;
        tx.insert_assignments(trip_id, rows.clone())?;

        trip.total_weight = verdict.total_weight;
        trip.total_volume = verdict.total_volume;
        trip.updated_at = Utc::now();
        tx.update_trip(trip.clone())?;

        for delivery in &added {
            rebind_delivery(&mut tx, delivery)?;
        }

        tx.commit()?;

        info!(
            trip_id = %trip_id,
            actor_id = %actor.user_id,
            deliveries = rows.len(),
            added = added.len(),
            removed = current.len() + added.len() - rows.len(),
            total_weight = trip.total_weight,
            "trip deliveries replaced"
        );

        Ok(TripAssignments {
            trip,
            assignments: rows,
        })
    }

    pub fn delete_trip(&self, actor: &Actor, trip_id: Uuid) -> Result<Trip, EngineError> {
        self.remove_trip(actor, trip_id).inspect_err(|err| {
            warn!(
                trip_id = %trip_id,
                actor_id = %actor.user_id,
                error = %err,
                "trip deletion rejected"
            );
        })
    }

    fn remove_trip(&self, actor: &Actor, trip_id: Uuid) -> Result<Trip, EngineError> {
        let mut tx = self.store().begin()?;

        let trip = tx
            .get_trip(trip_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Trip, trip_id))?;

        let assignments = tx.get_assignments(trip_id)?;
        release_trip_deliveries(&mut tx, trip_id, &assignments)?;

        tx.delete_assignments(trip_id)?;
        tx.delete_trip(trip_id)?;

        settle_vehicle(&mut tx, trip.vehicle_id)?;

        tx.commit()?;

        info!(
            trip_id = %trip_id,
            vehicle_id = %trip.vehicle_id,
            actor_id = %actor.user_id,
            released = assignments.len(),
            "trip deleted"
        );

        Ok(trip)
    }

    /// Capacity check for a prospective trip. Nothing is written.
    pub fn preview(&self, vehicle_id: Uuid, delivery_ids: &[Uuid]) -> Result<Verdict, EngineError> {
        ensure_distinct(delivery_ids)?;

        let tx = self.store().begin()?;
        let vehicle = tx
            .get_vehicle(vehicle_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, vehicle_id))?;
        let deliveries = load_deliveries(&tx, delivery_ids)?;
        drop(tx);

        let candidates: Vec<Candidate> = deliveries.iter().map(Candidate::from).collect();
        capacity::evaluate(vehicle.capacity(), &candidates).inspect_err(|err| {
            warn!(vehicle_id = %vehicle_id, error = %err, "capacity preview rejected");
        })
    }

    pub fn trip_detail(&self, trip_id: Uuid) -> Result<TripDetail, EngineError> {
        let tx = self.store().begin()?;

        let trip = tx
            .get_trip(trip_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Trip, trip_id))?;
        let vehicle = tx
            .get_vehicle(trip.vehicle_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, trip.vehicle_id))?;
        let assignments = tx.get_assignments(trip_id)?;
        let ids: Vec<Uuid> = assignments.iter().map(|row| row.delivery_id).collect();
        let deliveries = load_deliveries(&tx, &ids)?;
        drop(tx);

        let stops: Vec<TripStop> = assignments
            .into_iter()
            .zip(deliveries)
            .map(|(assignment, delivery)| TripStop {
                assignment,
                delivery,
            })
            .collect();
        let route = route_length(stops.iter().map(|stop| stop.delivery.location.as_ref()));

        Ok(TripDetail {
            trip,
            vehicle,
            stops,
            route,
        })
    }
}
