use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::TripEngine;
use crate::models::trip::Trip;
use crate::observability::metrics::Metrics;
use crate::policy::{AccessPolicy, RolePolicy};
use crate::store::{EntityStore, MemoryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEventKind {
    Created,
    AssignmentsReplaced,
    StatusChanged,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripEvent {
    pub kind: TripEventKind,
    pub trip_id: Uuid,
    pub trip: Trip,
    pub at: DateTime<Utc>,
}

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub engine: TripEngine<MemoryStore>,
    pub policy: Box<dyn AccessPolicy>,
    pub trip_events_tx: broadcast::Sender<TripEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), event_buffer_size)
    }

    pub fn with_store(store: Arc<MemoryStore>, event_buffer_size: usize) -> Self {
        let (trip_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            engine: TripEngine::new(store.clone()),
            store,
            policy: Box::new(RolePolicy),
            trip_events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn publish(&self, kind: TripEventKind, trip: &Trip) {
        let event = TripEvent {
            kind,
            trip_id: trip.id,
            trip: trip.clone(),
            at: Utc::now(),
        };
        // No subscribers is fine.
        let _ = self.trip_events_tx.send(event);

        let active = self
            .store
            .list_trips()
            .iter()
            .filter(|trip| trip.status.is_active())
            .count();
        self.metrics.active_trips.set(active as i64);
    }
}
