//! Legal status moves for deliveries, vehicles and trips.
//!
//! Trip assignment drives `pending <-> assigned` and `available <-> in_use`.
//! Everything past `assigned` on a delivery comes from operational events,
//! and `maintenance`/`inactive` on a vehicle are only ever set by people.

use crate::error::EngineError;
use crate::models::EntityKind;
use crate::models::delivery::DeliveryStatus;
use crate::models::trip::TripStatus;
use crate::models::vehicle::VehicleStatus;

fn invalid(entity: EntityKind, from: &'static str, to: &'static str) -> EngineError {
    EngineError::InvalidTransition { entity, from, to }
}

pub fn delivery_allows(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, Pending)
            | (Assigned, InTransit)
            | (InTransit, Delivered)
            | (InTransit, Failed)
    )
}

pub fn delivery_transition(
    from: DeliveryStatus,
    to: DeliveryStatus,
) -> Result<DeliveryStatus, EngineError> {
    if delivery_allows(from, to) {
        Ok(to)
    } else {
        Err(invalid(EntityKind::Delivery, from.as_str(), to.as_str()))
    }
}

/// Binding a delivery to a trip.
pub fn bind_delivery(from: DeliveryStatus) -> Result<DeliveryStatus, EngineError> {
    delivery_transition(from, DeliveryStatus::Assigned)
}

/// Unbinding a delivery. Only `assigned` goes back to `pending`; deliveries
/// already moved on by operations are left where they are.
pub fn release_delivery(from: DeliveryStatus) -> Option<DeliveryStatus> {
    match from {
        DeliveryStatus::Assigned => Some(DeliveryStatus::Pending),
        _ => None,
    }
}

/// Operational events reported from the road.
pub fn record_delivery_event(
    from: DeliveryStatus,
    to: DeliveryStatus,
) -> Result<DeliveryStatus, EngineError> {
    match to {
        DeliveryStatus::InTransit | DeliveryStatus::Delivered | DeliveryStatus::Failed => {
            delivery_transition(from, to)
        }
        DeliveryStatus::Pending | DeliveryStatus::Assigned => Err(EngineError::validation(
            format!("delivery status {to} is managed by trip assignment"),
        )),
    }
}

/// Putting a vehicle on an active trip.
pub fn bind_vehicle(from: VehicleStatus) -> Result<VehicleStatus, EngineError> {
    match from {
        VehicleStatus::Available | VehicleStatus::InUse => Ok(VehicleStatus::InUse),
        VehicleStatus::Maintenance | VehicleStatus::Inactive => Err(invalid(
            EntityKind::Vehicle,
            from.as_str(),
            VehicleStatus::InUse.as_str(),
        )),
    }
}

/// Recomputes a vehicle's status after one of its trips went away or finished.
pub fn release_vehicle(current: VehicleStatus, has_active_trip: bool) -> VehicleStatus {
    match current {
        VehicleStatus::InUse if !has_active_trip => VehicleStatus::Available,
        other => other,
    }
}

/// A status set by a person through the vehicle registry.
pub fn set_vehicle_status(
    current: VehicleStatus,
    to: VehicleStatus,
    has_active_trip: bool,
) -> Result<VehicleStatus, EngineError> {
    match to {
        VehicleStatus::Maintenance | VehicleStatus::Inactive => Ok(to),
        VehicleStatus::Available if !has_active_trip => Ok(to),
        VehicleStatus::Available | VehicleStatus::InUse => Err(invalid(
            EntityKind::Vehicle,
            current.as_str(),
            to.as_str(),
        )),
    }
}

pub fn trip_transition(from: TripStatus, to: TripStatus) -> Result<TripStatus, EngineError> {
    use TripStatus::*;

    let legal = matches!(
        (from, to),
        (Planned, InProgress)
            | (InProgress, Completed)
            | (Planned, Cancelled)
            | (InProgress, Cancelled)
    );

    if legal {
        Ok(to)
    } else {
        Err(invalid(EntityKind::Trip, from.as_str(), to.as_str()))
    }
}
