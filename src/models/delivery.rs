use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::geo::GeoPoint;
use crate::models::{non_negative, optional_text, required_text};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Deliveries already on the road or handed over never join a trip again.
    pub fn is_underway(&self) -> bool {
        matches!(self, DeliveryStatus::InTransit | DeliveryStatus::Delivered)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub address: String,
    pub location: Option<GeoPoint>,
    pub scheduled_at: DateTime<Utc>,
    pub weight: f64,
    pub volume: f64,
    pub status: DeliveryStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDelivery {
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub address: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub scheduled_at: DateTime<Utc>,
    pub weight: f64,
    pub volume: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryPatch {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
    pub notes: Option<String>,
}

impl DeliveryPatch {
    pub fn is_empty(&self) -> bool {
        self.customer_name.is_none()
            && self.customer_phone.is_none()
            && self.address.is_none()
            && self.location.is_none()
            && self.scheduled_at.is_none()
            && self.weight.is_none()
            && self.volume.is_none()
            && self.notes.is_none()
    }

    /// Weight or volume edits change trip aggregates.
    pub fn touches_load(&self) -> bool {
        self.weight.is_some() || self.volume.is_some()
    }
}

impl Delivery {
    pub fn new(input: NewDelivery, created_by: Uuid) -> Result<Self, EngineError> {
        let now = Utc::now();
        let location = input
            .location
            .map(GeoPoint::validated)
            .transpose()
            .map_err(EngineError::validation)?;

        Ok(Self {
            id: Uuid::new_v4(),
            customer_name: required_text("customer_name", &input.customer_name)?,
            customer_phone: optional_text(input.customer_phone),
            address: required_text("address", &input.address)?,
            location,
            scheduled_at: input.scheduled_at,
            weight: non_negative("weight", input.weight)?,
            volume: non_negative("volume", input.volume)?,
            status: DeliveryStatus::Pending,
            notes: optional_text(input.notes),
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a partial edit. Status is never touched here.
    pub fn apply(&mut self, patch: DeliveryPatch) -> Result<(), EngineError> {
        if patch.is_empty() {
            return Err(EngineError::validation("no fields to update"));
        }

        let mut next = self.clone();
        if let Some(name) = patch.customer_name {
            next.customer_name = required_text("customer_name", &name)?;
        }
        if let Some(phone) = patch.customer_phone {
            next.customer_phone = optional_text(Some(phone));
        }
        if let Some(address) = patch.address {
            next.address = required_text("address", &address)?;
        }
        if let Some(location) = patch.location {
            next.location = Some(location.validated().map_err(EngineError::validation)?);
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            next.scheduled_at = scheduled_at;
        }
        if let Some(weight) = patch.weight {
            next.weight = non_negative("weight", weight)?;
        }
        if let Some(volume) = patch.volume {
            next.volume = non_negative("volume", volume)?;
        }
        if let Some(notes) = patch.notes {
            next.notes = optional_text(Some(notes));
        }
        next.updated_at = Utc::now();

        *self = next;
        Ok(())
    }
}
