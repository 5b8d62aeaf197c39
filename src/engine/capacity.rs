use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::vehicle::Capacity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityKind {
    Weight,
    Volume,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKind::Weight => f.write_str("weight"),
            CapacityKind::Volume => f.write_str("volume"),
        }
    }
}

/// The load facts the evaluator needs about one delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: Uuid,
    pub weight: f64,
    pub volume: f64,
    pub status: DeliveryStatus,
}

impl From<&Delivery> for Candidate {
    fn from(delivery: &Delivery) -> Self {
        Self {
            id: delivery.id,
            weight: delivery.weight,
            volume: delivery.volume,
            status: delivery.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub ok: bool,
    pub total_weight: f64,
    pub total_volume: f64,
}

/// Checks a candidate set against a vehicle's limits.
///
/// Status is checked before totals; weight is checked before volume, and only
/// the first violation is reported. A total equal to the capacity passes.
pub fn evaluate(capacity: Capacity, candidates: &[Candidate]) -> Result<Verdict, EngineError> {
    ensure_assignable(candidates)?;
    check_totals(capacity, candidates)
}

/// Fails on the first candidate that is already in transit or delivered.
pub fn ensure_assignable(candidates: &[Candidate]) -> Result<(), EngineError> {
    match candidates.iter().find(|c| c.status.is_underway()) {
        Some(candidate) => Err(EngineError::delivery_rejected(
            candidate.id,
            format!("delivery {} is already {}", candidate.id, candidate.status),
        )),
        None => Ok(()),
    }
}

/// Sums the candidates and compares against capacity without looking at status.
pub fn check_totals(capacity: Capacity, candidates: &[Candidate]) -> Result<Verdict, EngineError> {
    let total_weight: f64 = candidates.iter().map(|c| c.weight).sum();
    let total_volume: f64 = candidates.iter().map(|c| c.volume).sum();

    if total_weight > capacity.weight {
        return Err(EngineError::CapacityExceeded {
            kind: CapacityKind::Weight,
            total: total_weight,
            capacity: capacity.weight,
        });
    }

    if total_volume > capacity.volume {
        return Err(EngineError::CapacityExceeded {
            kind: CapacityKind::Volume,
            total: total_volume,
            capacity: capacity.volume,
        });
    }

    Ok(Verdict {
        ok: true,
        total_weight,
        total_volume,
    })
}
