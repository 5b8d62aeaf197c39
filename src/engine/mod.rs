pub mod capacity;
pub mod lifecycle;
pub mod transitions;
pub mod trips;

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::EngineError;
use crate::models::EntityKind;
use crate::models::delivery::Delivery;
use crate::store::{EntityStore, StoreTx};

pub use trips::{DeliverySpec, NewTrip, TripAssignments, TripDetail, TripStop};

/// Runs trip assignment and status changes, each inside one store transaction.
///
/// The engine does no authorization; callers consult the access policy first
/// and hand the resolved actor in.
pub struct TripEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for TripEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: EntityStore> TripEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Loads deliveries in the order of `ids`, failing on the first id that does not exist.
pub(crate) fn load_deliveries<T: StoreTx>(
    tx: &T,
    ids: &[Uuid],
) -> Result<Vec<Delivery>, EngineError> {
    let mut found: HashMap<Uuid, Delivery> = tx
        .get_deliveries_by_ids(ids)?
        .into_iter()
        .map(|delivery| (delivery.id, delivery))
        .collect();

    ids.iter()
        .map(|id| {
            found
                .remove(id)
                .ok_or_else(|| EngineError::not_found(EntityKind::Delivery, *id))
        })
        .collect()
}

pub(crate) fn ensure_distinct(ids: &[Uuid]) -> Result<(), EngineError> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(*id) {
            return Err(EngineError::delivery_rejected(
                *id,
                format!("delivery {id} is listed more than once"),
            ));
        }
    }
    Ok(())
}
