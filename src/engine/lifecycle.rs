use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::trips::{release_trip_deliveries, settle_vehicle};
use crate::engine::{TripEngine, load_deliveries, transitions};
use crate::error::EngineError;
use crate::models::EntityKind;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::trip::{Trip, TripAssignment, TripStatus};
use crate::models::user::Actor;
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::store::{EntityStore, StoreTx};

impl<S: EntityStore> TripEngine<S> {
    /// Moves a trip along its lifecycle.
    ///
    /// Starting a trip re-binds its vehicle. Cancelling hands assigned deliveries
    /// back to the pending pool and drops them from the trip. Once a trip stops
    /// being active the vehicle status is recomputed from the trips it still has.
    pub fn update_trip_status(
        &self,
        actor: &Actor,
        trip_id: Uuid,
        to: TripStatus,
    ) -> Result<Trip, EngineError> {
        self.move_trip(actor, trip_id, to).inspect_err(|err| {
            warn!(
                trip_id = %trip_id,
                actor_id = %actor.user_id,
                to = %to,
                error = %err,
                "trip status change rejected"
            );
        })
    }

    fn move_trip(&self, actor: &Actor, trip_id: Uuid, to: TripStatus) -> Result<Trip, EngineError> {
        let mut tx = self.store().begin()?;

        let mut trip = tx
            .get_trip(trip_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Trip, trip_id))?;
        let from = trip.status;
        let next = transitions::trip_transition(from, to)?;

        if next == TripStatus::InProgress {
            let vehicle = tx
                .get_vehicle(trip.vehicle_id)?
                .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, trip.vehicle_id))?;
            let bound = transitions::bind_vehicle(vehicle.status)?;
            if bound != vehicle.status {
                tx.update_vehicle_status(vehicle.id, bound)?;
            }
        }

        if next == TripStatus::Cancelled {
            let assignments = tx.get_assignments(trip_id)?;
            let released = release_trip_deliveries(&mut tx, trip_id, &assignments)?;
            if !released.is_empty() {
                // Released deliveries leave the trip so a later plan owns them alone.
                let kept: Vec<TripAssignment> = assignments
                    .into_iter()
                    .filter(|row| !released.contains(&row.delivery_id))
                    .enumerate()
                    .map(|(index, row)| TripAssignment {
                        sequence_order: index as u32 + 1,
                        ..row
                    })
                    .collect();
                let ids: Vec<Uuid> = kept.iter().map(|row| row.delivery_id).collect();
                let remaining = load_deliveries(&tx, &ids)?;
                trip.total_weight = remaining.iter().map(|delivery| delivery.weight).sum();
                trip.total_volume = remaining.iter().map(|delivery| delivery.volume).sum();

                tx.delete_assignments(trip_id)?;
                tx.insert_assignments(trip_id, kept)?;
            }
        }

        trip.status = next;
        trip.updated_at = Utc::now();
        tx.update_trip(trip.clone())?;

        if !next.is_active() {
            settle_vehicle(&mut tx, trip.vehicle_id)?;
        }

        tx.commit()?;

        info!(
            trip_id = %trip_id,
            actor_id = %actor.user_id,
            from = %from,
            to = %next,
            "trip status changed"
        );

        Ok(trip)
    }

    /// Applies an operational event (picked up, delivered, failed) to a delivery.
    pub fn record_delivery_event(
        &self,
        actor: &Actor,
        delivery_id: Uuid,
        to: DeliveryStatus,
    ) -> Result<Delivery, EngineError> {
        self.apply_delivery_event(actor, delivery_id, to)
            .inspect_err(|err| {
                warn!(
                    delivery_id = %delivery_id,
                    actor_id = %actor.user_id,
                    to = %to,
                    error = %err,
                    "delivery event rejected"
                );
            })
    }

    fn apply_delivery_event(
        &self,
        actor: &Actor,
        delivery_id: Uuid,
        to: DeliveryStatus,
    ) -> Result<Delivery, EngineError> {
        let mut tx = self.store().begin()?;

        let delivery = tx
            .get_delivery(delivery_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Delivery, delivery_id))?;
        let next = transitions::record_delivery_event(delivery.status, to)?;
        tx.update_delivery_status(delivery_id, next)?;

        let updated = tx
            .get_delivery(delivery_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Delivery, delivery_id))?;
        tx.commit()?;

        info!(
            delivery_id = %delivery_id,
            actor_id = %actor.user_id,
            from = %delivery.status,
            to = %next,
            "delivery status changed"
        );

        Ok(updated)
    }

    /// Sets a status on a vehicle by hand. `in_use` is never set this way.
    pub fn set_vehicle_status(
        &self,
        actor: &Actor,
        vehicle_id: Uuid,
        to: VehicleStatus,
    ) -> Result<Vehicle, EngineError> {
        self.apply_vehicle_status(actor, vehicle_id, to)
            .inspect_err(|err| {
                warn!(
                    vehicle_id = %vehicle_id,
                    actor_id = %actor.user_id,
                    to = %to,
                    error = %err,
                    "vehicle status change rejected"
                );
            })
    }

    fn apply_vehicle_status(
        &self,
        actor: &Actor,
        vehicle_id: Uuid,
        to: VehicleStatus,
    ) -> Result<Vehicle, EngineError> {
        let mut tx = self.store().begin()?;

        let vehicle = tx
            .get_vehicle(vehicle_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, vehicle_id))?;
        let has_active_trip = !tx.get_active_trips_for_vehicle(vehicle_id)?.is_empty();
        let next = transitions::set_vehicle_status(vehicle.status, to, has_active_trip)?;
        tx.update_vehicle_status(vehicle_id, next)?;

        let updated = tx
            .get_vehicle(vehicle_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Vehicle, vehicle_id))?;
        tx.commit()?;

        info!(
            vehicle_id = %vehicle_id,
            actor_id = %actor.user_id,
            from = %vehicle.status,
            to = %next,
            "vehicle status changed"
        );

        Ok(updated)
    }
}
