use std::fmt;

use uuid::Uuid;

use crate::models::user::{Actor, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    CreateDelivery,
    UpdateDelivery,
    DeleteDelivery,
    RecordDeliveryEvent,
    CreateVehicle,
    UpdateVehicle,
    DeleteVehicle,
    PlanTrips,
    ManageUsers,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::CreateDelivery => "create_delivery",
            Action::UpdateDelivery => "update_delivery",
            Action::DeleteDelivery => "delete_delivery",
            Action::RecordDeliveryEvent => "record_delivery_event",
            Action::CreateVehicle => "create_vehicle",
            Action::UpdateVehicle => "update_vehicle",
            Action::DeleteVehicle => "delete_vehicle",
            Action::PlanTrips => "plan_trips",
            Action::ManageUsers => "manage_users",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Delivery(Option<Uuid>),
    Vehicle(Option<Uuid>),
    Trip(Option<Uuid>),
    User(Option<Uuid>),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, id) = match self {
            Resource::Delivery(id) => ("delivery", id),
            Resource::Vehicle(id) => ("vehicle", id),
            Resource::Trip(id) => ("trip", id),
            Resource::User(id) => ("user", id),
        };
        match id {
            Some(id) => write!(f, "{kind} {id}"),
            None => write!(f, "{kind}s"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, actor: &Actor, action: Action, resource: &Resource) -> Decision;
}

/// Fixed role matrix; the resource does not influence the decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

pub fn allowed_roles(action: Action) -> &'static [Role] {
    use Role::*;

    match action {
        Action::View => &[Viewer, DeliveryCreator, TripPlanner, Admin],
        Action::CreateDelivery | Action::DeleteDelivery => &[DeliveryCreator, Admin],
        Action::UpdateDelivery => &[DeliveryCreator, TripPlanner, Admin],
        Action::RecordDeliveryEvent => &[TripPlanner, Admin],
        Action::CreateVehicle | Action::DeleteVehicle => &[Admin],
        Action::UpdateVehicle => &[TripPlanner, Admin],
        Action::PlanTrips => &[TripPlanner, Admin],
        Action::ManageUsers => &[Admin],
    }
}

impl AccessPolicy for RolePolicy {
    fn authorize(&self, actor: &Actor, action: Action, _resource: &Resource) -> Decision {
        if allowed_roles(action).contains(&actor.role) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}
