use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::geo::GeoPoint;
use crate::models::{non_negative, optional_text, required_text};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Available,
    InUse,
    Maintenance,
    Inactive,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::InUse => "in_use",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load limits of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub weight: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub license_plate: String,
    pub capacity_weight: f64,
    pub capacity_volume: f64,
    pub location: Option<GeoPoint>,
    pub start_location: Option<String>,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
    pub name: String,
    pub license_plate: String,
    pub capacity_weight: f64,
    pub capacity_volume: f64,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub start_location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehiclePatch {
    pub name: Option<String>,
    pub license_plate: Option<String>,
    pub capacity_weight: Option<f64>,
    pub capacity_volume: Option<f64>,
    pub location: Option<GeoPoint>,
    pub start_location: Option<String>,
}

impl VehiclePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.license_plate.is_none()
            && self.capacity_weight.is_none()
            && self.capacity_volume.is_none()
            && self.location.is_none()
            && self.start_location.is_none()
    }
}

impl Vehicle {
    pub fn new(input: NewVehicle) -> Result<Self, EngineError> {
        let now = Utc::now();
        let location = input
            .location
            .map(GeoPoint::validated)
            .transpose()
            .map_err(EngineError::validation)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: required_text("name", &input.name)?,
            license_plate: required_text("license_plate", &input.license_plate)?,
            capacity_weight: non_negative("capacity_weight", input.capacity_weight)?,
            capacity_volume: non_negative("capacity_volume", input.capacity_volume)?,
            location,
            start_location: optional_text(input.start_location),
            status: VehicleStatus::Available,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn capacity(&self) -> Capacity {
        Capacity {
            weight: self.capacity_weight,
            volume: self.capacity_volume,
        }
    }

    pub fn apply(&mut self, patch: VehiclePatch) -> Result<(), EngineError> {
        if patch.is_empty() {
            return Err(EngineError::validation("no fields to update"));
        }

        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = required_text("name", &name)?;
        }
        if let Some(plate) = patch.license_plate {
            next.license_plate = required_text("license_plate", &plate)?;
        }
        if let Some(weight) = patch.capacity_weight {
            next.capacity_weight = non_negative("capacity_weight", weight)?;
        }
        if let Some(volume) = patch.capacity_volume {
            next.capacity_volume = non_negative("capacity_volume", volume)?;
        }
        if let Some(location) = patch.location {
            next.location = Some(location.validated().map_err(EngineError::validation)?);
        }
        if let Some(start) = patch.start_location {
            next.start_location = optional_text(Some(start));
        }
        next.updated_at = Utc::now();

        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{NewVehicle, Vehicle, VehiclePatch, VehicleStatus};

    fn input() -> NewVehicle {
        NewVehicle {
            name: "Van 1".to_string(),
            license_plate: " B-TP 100 ".to_string(),
            capacity_weight: 800.0,
            capacity_volume: 6.0,
            location: None,
            start_location: Some("Depot North".to_string()),
        }
    }

    #[test]
    fn new_vehicle_is_available() {
        let vehicle = Vehicle::new(input()).unwrap();

        assert_eq!(vehicle.status, VehicleStatus::Available);
        assert_eq!(vehicle.license_plate, "B-TP 100");
        assert_eq!(vehicle.capacity().weight, 800.0);
        assert_eq!(vehicle.capacity().volume, 6.0);
    }

    #[test]
    fn blank_plate_is_rejected() {
        let mut raw = input();
        raw.license_plate = "   ".to_string();
        assert!(Vehicle::new(raw).is_err());
    }

    #[test]
    fn patch_updates_capacity() {
        let mut vehicle = Vehicle::new(input()).unwrap();
        vehicle
            .apply(VehiclePatch {
                capacity_weight: Some(1000.0),
                ..VehiclePatch::default()
            })
            .unwrap();

        assert_eq!(vehicle.capacity_weight, 1000.0);
        assert_eq!(vehicle.capacity_volume, 6.0);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(VehicleStatus::InUse).unwrap();
        assert_eq!(json, "in_use");
    }
}
