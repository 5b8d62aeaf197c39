use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::EntityKind;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::trip::{Trip, TripAssignment};
use crate::models::user::User;
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::store::{EntityStore, StoreCounts, StoreError, StoreTx};

/// In-process store. Committed rows live in concurrent maps; transactions are
/// serialised by a single write gate and stage their writes until commit.
#[derive(Default)]
pub struct MemoryStore {
    deliveries: DashMap<Uuid, Delivery>,
    vehicles: DashMap<Uuid, Vehicle>,
    trips: DashMap<Uuid, Trip>,
    assignments: DashMap<Uuid, Vec<TripAssignment>>,
    users: DashMap<Uuid, User>,
    write_gate: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn committed_rows<T: Clone>(table: &DashMap<Uuid, T>) -> Vec<T> {
    table.iter().map(|entry| entry.value().clone()).collect()
}

impl EntityStore for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> Result<MemoryTx<'_>, StoreError> {
        let gate = self
            .write_gate
            .lock()
            .map_err(|_| StoreError::Unavailable("write gate poisoned".to_string()))?;

        Ok(MemoryTx {
            store: self,
            _gate: gate,
            deliveries: HashMap::new(),
            vehicles: HashMap::new(),
            trips: HashMap::new(),
            assignments: HashMap::new(),
            users: HashMap::new(),
        })
    }

    fn list_deliveries(&self) -> Vec<Delivery> {
        let mut rows = committed_rows(&self.deliveries);
        rows.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        rows
    }

    fn list_vehicles(&self) -> Vec<Vehicle> {
        let mut rows = committed_rows(&self.vehicles);
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    fn list_trips(&self) -> Vec<Trip> {
        let mut rows = committed_rows(&self.trips);
        rows.sort_by(|a, b| b.planned_start.cmp(&a.planned_start));
        rows
    }

    fn list_users(&self) -> Vec<User> {
        let mut rows = committed_rows(&self.users);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    fn get_delivery(&self, id: Uuid) -> Option<Delivery> {
        self.deliveries.get(&id).map(|entry| entry.value().clone())
    }

    fn get_vehicle(&self, id: Uuid) -> Option<Vehicle> {
        self.vehicles.get(&id).map(|entry| entry.value().clone())
    }

    fn assignment_count(&self, trip_id: Uuid) -> usize {
        self.assignments
            .get(&trip_id)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    fn counts(&self) -> StoreCounts {
        StoreCounts {
            deliveries: self.deliveries.len(),
            vehicles: self.vehicles.len(),
            trips: self.trips.len(),
            assignments: self.assignments.iter().map(|rows| rows.len()).sum(),
            users: self.users.len(),
        }
    }
}

/// Staged writes of one transaction. `None` marks a deleted row; an empty
/// assignment list marks a trip whose assignments were removed.
pub struct MemoryTx<'a> {
    store: &'a MemoryStore,
    _gate: MutexGuard<'a, ()>,
    deliveries: HashMap<Uuid, Option<Delivery>>,
    vehicles: HashMap<Uuid, Option<Vehicle>>,
    trips: HashMap<Uuid, Option<Trip>>,
    assignments: HashMap<Uuid, Vec<TripAssignment>>,
    users: HashMap<Uuid, Option<User>>,
}

fn read_row<T: Clone>(
    committed: &DashMap<Uuid, T>,
    staged: &HashMap<Uuid, Option<T>>,
    id: Uuid,
) -> Option<T> {
    match staged.get(&id) {
        Some(row) => row.clone(),
        None => committed.get(&id).map(|entry| entry.value().clone()),
    }
}

fn merged_rows<T: Clone>(committed: &DashMap<Uuid, T>, staged: &HashMap<Uuid, Option<T>>) -> Vec<T> {
    let mut rows: Vec<T> = committed
        .iter()
        .filter(|entry| !staged.contains_key(entry.key()))
        .map(|entry| entry.value().clone())
        .collect();
    rows.extend(staged.values().flatten().cloned());
    rows
}

fn apply_staged<T>(committed: &DashMap<Uuid, T>, staged: HashMap<Uuid, Option<T>>) {
    for (id, row) in staged {
        match row {
            Some(row) => {
                committed.insert(id, row);
            }
            None => {
                committed.remove(&id);
            }
        }
    }
}

impl MemoryTx<'_> {
    fn trip_rows(&self) -> Vec<Trip> {
        merged_rows(&self.store.trips, &self.trips)
    }

    fn assignment_sets(&self) -> Vec<(Uuid, Vec<TripAssignment>)> {
        let mut sets: Vec<(Uuid, Vec<TripAssignment>)> = self
            .store
            .assignments
            .iter()
            .filter(|entry| !self.assignments.contains_key(entry.key()))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        sets.extend(
            self.assignments
                .iter()
                .map(|(trip_id, rows)| (*trip_id, rows.clone())),
        );
        sets
    }

    fn ensure_unique_plate(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let taken = merged_rows(&self.store.vehicles, &self.vehicles)
            .iter()
            .any(|other| {
                other.id != vehicle.id
                    && other.license_plate.eq_ignore_ascii_case(&vehicle.license_plate)
            });

        if taken {
            return Err(StoreError::UniqueViolation {
                entity: EntityKind::Vehicle,
                field: "license_plate",
                value: vehicle.license_plate.clone(),
            });
        }
        Ok(())
    }

    fn ensure_unique_email(&self, user: &User) -> Result<(), StoreError> {
        let taken = merged_rows(&self.store.users, &self.users)
            .iter()
            .any(|other| other.id != user.id && other.email == user.email);

        if taken {
            return Err(StoreError::UniqueViolation {
                entity: EntityKind::User,
                field: "email",
                value: user.email.clone(),
            });
        }
        Ok(())
    }

    fn require_delivery(&self, id: Uuid) -> Result<Delivery, StoreError> {
        self.get_delivery(id)?.ok_or(StoreError::MissingRow {
            entity: EntityKind::Delivery,
            id,
        })
    }

    fn require_vehicle(&self, id: Uuid) -> Result<Vehicle, StoreError> {
        self.get_vehicle(id)?.ok_or(StoreError::MissingRow {
            entity: EntityKind::Vehicle,
            id,
        })
    }

    fn require_trip(&self, id: Uuid) -> Result<Trip, StoreError> {
        self.get_trip(id)?.ok_or(StoreError::MissingRow {
            entity: EntityKind::Trip,
            id,
        })
    }
}

impl StoreTx for MemoryTx<'_> {
    fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        Ok(read_row(&self.store.vehicles, &self.vehicles, id))
    }

    fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(read_row(&self.store.deliveries, &self.deliveries, id))
    }

    fn get_deliveries_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Delivery>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| read_row(&self.store.deliveries, &self.deliveries, *id))
            .collect())
    }

    fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(read_row(&self.store.trips, &self.trips, id))
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(read_row(&self.store.users, &self.users, id))
    }

    fn get_assignments(&self, trip_id: Uuid) -> Result<Vec<TripAssignment>, StoreError> {
        let mut rows = match self.assignments.get(&trip_id) {
            Some(rows) => rows.clone(),
            None => self
                .store
                .assignments
                .get(&trip_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default(),
        };
        rows.sort_by_key(|row| row.sequence_order);
        Ok(rows)
    }

    fn get_active_trips_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Trip>, StoreError> {
        Ok(self
            .trips_for_vehicle(vehicle_id)?
            .into_iter()
            .filter(|trip| trip.status.is_active())
            .collect())
    }

    fn trips_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Trip>, StoreError> {
        let mut trips: Vec<Trip> = self
            .trip_rows()
            .into_iter()
            .filter(|trip| trip.vehicle_id == vehicle_id)
            .collect();
        trips.sort_by(|a, b| a.planned_start.cmp(&b.planned_start));
        Ok(trips)
    }

    fn trips_for_delivery(&self, delivery_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut trips: Vec<Uuid> = self
            .assignment_sets()
            .into_iter()
            .filter(|(_, rows)| rows.iter().any(|row| row.delivery_id == delivery_id))
            .map(|(trip_id, _)| trip_id)
            .collect();
        trips.sort_unstable();
        Ok(trips)
    }

    fn insert_delivery(&mut self, delivery: Delivery) -> Result<(), StoreError> {
        if self.get_delivery(delivery.id)?.is_some() {
            return Err(StoreError::UniqueViolation {
                entity: EntityKind::Delivery,
                field: "id",
                value: delivery.id.to_string(),
            });
        }
        self.deliveries.insert(delivery.id, Some(delivery));
        Ok(())
    }

    fn update_delivery(&mut self, delivery: Delivery) -> Result<(), StoreError> {
        self.require_delivery(delivery.id)?;
        self.deliveries.insert(delivery.id, Some(delivery));
        Ok(())
    }

    fn update_delivery_status(
        &mut self,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        let mut delivery = self.require_delivery(id)?;
        delivery.status = status;
        delivery.updated_at = chrono::Utc::now();
        self.deliveries.insert(id, Some(delivery));
        Ok(())
    }

    fn delete_delivery(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.require_delivery(id)?;
        if !self.trips_for_delivery(id)?.is_empty() {
            return Err(StoreError::ForeignKey {
                entity: EntityKind::Delivery,
                id,
                referenced_by: EntityKind::Assignment,
            });
        }
        self.deliveries.insert(id, None);
        Ok(())
    }

    fn insert_vehicle(&mut self, vehicle: Vehicle) -> Result<(), StoreError> {
        if self.get_vehicle(vehicle.id)?.is_some() {
            return Err(StoreError::UniqueViolation {
                entity: EntityKind::Vehicle,
                field: "id",
                value: vehicle.id.to_string(),
            });
        }
        self.ensure_unique_plate(&vehicle)?;
        self.vehicles.insert(vehicle.id, Some(vehicle));
        Ok(())
    }

    fn update_vehicle(&mut self, vehicle: Vehicle) -> Result<(), StoreError> {
        self.require_vehicle(vehicle.id)?;
        self.ensure_unique_plate(&vehicle)?;
        self.vehicles.insert(vehicle.id, Some(vehicle));
        Ok(())
    }

    fn update_vehicle_status(&mut self, id: Uuid, status: VehicleStatus) -> Result<(), StoreError> {
        let mut vehicle = self.require_vehicle(id)?;
        vehicle.status = status;
        vehicle.updated_at = chrono::Utc::now();
        self.vehicles.insert(id, Some(vehicle));
        Ok(())
    }

    fn delete_vehicle(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.require_vehicle(id)?;
        if !self.trips_for_vehicle(id)?.is_empty() {
            return Err(StoreError::ForeignKey {
                entity: EntityKind::Vehicle,
                id,
                referenced_by: EntityKind::Trip,
            });
        }
        self.vehicles.insert(id, None);
        Ok(())
    }

    fn insert_trip(&mut self, trip: Trip) -> Result<(), StoreError> {
        if self.get_trip(trip.id)?.is_some() {
            return Err(StoreError::UniqueViolation {
                entity: EntityKind::Trip,
                field: "id",
                value: trip.id.to_string(),
            });
        }
        self.require_vehicle(trip.vehicle_id)?;
        self.trips.insert(trip.id, Some(trip));
        Ok(())
    }

    fn update_trip(&mut self, trip: Trip) -> Result<(), StoreError> {
        self.require_trip(trip.id)?;
        self.require_vehicle(trip.vehicle_id)?;
        self.trips.insert(trip.id, Some(trip));
        Ok(())
    }

    fn delete_trip(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.require_trip(id)?;
        if !self.get_assignments(id)?.is_empty() {
            return Err(StoreError::ForeignKey {
                entity: EntityKind::Trip,
                id,
                referenced_by: EntityKind::Assignment,
            });
        }
        self.trips.insert(id, None);
        Ok(())
    }

    fn insert_assignments(
        &mut self,
        trip_id: Uuid,
        rows: Vec<TripAssignment>,
    ) -> Result<(), StoreError> {
        self.require_trip(trip_id)?;
        let mut current = self.get_assignments(trip_id)?;

        for row in rows {
            if row.trip_id != trip_id {
                return Err(StoreError::MissingRow {
                    entity: EntityKind::Trip,
                    id: row.trip_id,
                });
            }
            self.require_delivery(row.delivery_id)?;

            if current.iter().any(|other| other.delivery_id == row.delivery_id) {
                return Err(StoreError::UniqueViolation {
                    entity: EntityKind::Assignment,
                    field: "delivery_id",
                    value: row.delivery_id.to_string(),
                });
            }
            if current
                .iter()
                .any(|other| other.sequence_order == row.sequence_order)
            {
                return Err(StoreError::UniqueViolation {
                    entity: EntityKind::Assignment,
                    field: "sequence_order",
                    value: row.sequence_order.to_string(),
                });
            }
            current.push(row);
        }

        current.sort_by_key(|row| row.sequence_order);
        self.assignments.insert(trip_id, current);
        Ok(())
    }

    fn delete_assignments(&mut self, trip_id: Uuid) -> Result<(), StoreError> {
        self.assignments.insert(trip_id, Vec::new());
        Ok(())
    }

    fn insert_user(&mut self, user: User) -> Result<(), StoreError> {
        if self.get_user(user.id)?.is_some() {
            return Err(StoreError::UniqueViolation {
                entity: EntityKind::User,
                field: "id",
                value: user.id.to_string(),
            });
        }
        self.ensure_unique_email(&user)?;
        self.users.insert(user.id, Some(user));
        Ok(())
    }

    fn update_user(&mut self, user: User) -> Result<(), StoreError> {
        if self.get_user(user.id)?.is_none() {
            return Err(StoreError::MissingRow {
                entity: EntityKind::User,
                id: user.id,
            });
        }
        self.ensure_unique_email(&user)?;
        self.users.insert(user.id, Some(user));
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let MemoryTx {
            store,
            _gate,
            deliveries,
            vehicles,
            trips,
            assignments,
            users,
        } = self;

        apply_staged(&store.deliveries, deliveries);
        apply_staged(&store.vehicles, vehicles);
        apply_staged(&store.trips, trips);
        apply_staged(&store.users, users);
        for (trip_id, rows) in assignments {
            if rows.is_empty() {
                store.assignments.remove(&trip_id);
            } else {
                store.assignments.insert(trip_id, rows);
            }
        }

        Ok(())
    }
}
