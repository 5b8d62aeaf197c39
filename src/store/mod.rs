pub mod memory;

use thiserror::Error;
use uuid::Uuid;

use crate::models::EntityKind;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::trip::{Trip, TripAssignment};
use crate::models::user::User;
use crate::models::vehicle::{Vehicle, VehicleStatus};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{entity} with {field} '{value}' already exists")]
    UniqueViolation {
        entity: EntityKind,
        field: &'static str,
        value: String,
    },

    #[error("{entity} {id} does not exist")]
    MissingRow { entity: EntityKind, id: Uuid },

    #[error("{entity} {id} is still referenced by {referenced_by}")]
    ForeignKey {
        entity: EntityKind,
        id: Uuid,
        referenced_by: EntityKind,
    },

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A persistent home for the planner's records.
///
/// Every write goes through a [`StoreTx`]. Reads on the store itself only see
/// committed data.
pub trait EntityStore: Send + Sync + 'static {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;

    fn list_deliveries(&self) -> Vec<Delivery>;
    fn list_vehicles(&self) -> Vec<Vehicle>;
    fn list_trips(&self) -> Vec<Trip>;
    fn list_users(&self) -> Vec<User>;
    fn get_user(&self, id: Uuid) -> Option<User>;
    fn get_delivery(&self, id: Uuid) -> Option<Delivery>;
    fn get_vehicle(&self, id: Uuid) -> Option<Vehicle>;
    fn assignment_count(&self, trip_id: Uuid) -> usize;
    fn counts(&self) -> StoreCounts;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub deliveries: usize,
    pub vehicles: usize,
    pub trips: usize,
    pub assignments: usize,
    pub users: usize,
}

/// One unit of work. Dropping a transaction without calling [`StoreTx::commit`]
/// discards every write made through it.
pub trait StoreTx {
    fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError>;
    fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError>;
    /// Returns the deliveries that exist, in the order of `ids`.
    fn get_deliveries_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Delivery>, StoreError>;
    fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError>;
    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Assignments of a trip ordered by `sequence_order`.
    fn get_assignments(&self, trip_id: Uuid) -> Result<Vec<TripAssignment>, StoreError>;
    fn get_active_trips_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Trip>, StoreError>;
    fn trips_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Trip>, StoreError>;
    /// Every trip holding an assignment row for the delivery.
    fn trips_for_delivery(&self, delivery_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    fn insert_delivery(&mut self, delivery: Delivery) -> Result<(), StoreError>;
    fn update_delivery(&mut self, delivery: Delivery) -> Result<(), StoreError>;
    fn update_delivery_status(&mut self, id: Uuid, status: DeliveryStatus)
    -> Result<(), StoreError>;
    fn delete_delivery(&mut self, id: Uuid) -> Result<(), StoreError>;

    fn insert_vehicle(&mut self, vehicle: Vehicle) -> Result<(), StoreError>;
    fn update_vehicle(&mut self, vehicle: Vehicle) -> Result<(), StoreError>;
    fn update_vehicle_status(&mut self, id: Uuid, status: VehicleStatus) -> Result<(), StoreError>;
    fn delete_vehicle(&mut self, id: Uuid) -> Result<(), StoreError>;

    fn insert_trip(&mut self, trip: Trip) -> Result<(), StoreError>;
    fn update_trip(&mut self, trip: Trip) -> Result<(), StoreError>;
    fn delete_trip(&mut self, id: Uuid) -> Result<(), StoreError>;

    fn insert_assignments(
        &mut self,
        trip_id: Uuid,
        rows: Vec<TripAssignment>,
    ) -> Result<(), StoreError>;
    fn delete_assignments(&mut self, trip_id: Uuid) -> Result<(), StoreError>;

    fn insert_user(&mut self, user: User) -> Result<(), StoreError>;
    fn update_user(&mut self, user: User) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}
