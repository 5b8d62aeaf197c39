use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::capacity::CapacityKind;
use crate::models::EntityKind;
use crate::store::StoreError;

/// Failures of the trip assignment core. The first violation wins; nothing is persisted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("{message}")]
    Validation {
        message: String,
        delivery_id: Option<Uuid>,
    },

    #[error("total {kind} {total} exceeds vehicle capacity {capacity}")]
    CapacityExceeded {
        kind: CapacityKind,
        total: f64,
        capacity: f64,
    },

    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: EntityKind,
        from: &'static str,
        to: &'static str,
    },

    #[error("concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            delivery_id: None,
        }
    }

    pub fn delivery_rejected(delivery_id: Uuid, message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            delivery_id: Some(delivery_id),
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Validation { .. } => "validation",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::ConcurrencyConflict(_) => "conflict",
            EngineError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(msg) => EngineError::ConcurrencyConflict(msg),
            StoreError::MissingRow { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("total {kind} {total} exceeds vehicle capacity {capacity}")]
    CapacityExceeded {
        kind: CapacityKind,
        total: f64,
        capacity: f64,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { .. } => AppError::NotFound(err.to_string()),
            EngineError::Validation { message, .. } => AppError::BadRequest(message),
            EngineError::CapacityExceeded {
                kind,
                total,
                capacity,
            } => AppError::CapacityExceeded {
                kind,
                total,
                capacity,
            },
            EngineError::InvalidTransition { .. } | EngineError::ConcurrencyConflict(_) => {
                AppError::Conflict(err.to_string())
            }
            EngineError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { .. }
            | StoreError::ForeignKey { .. }
            | StoreError::Serialization(_) => AppError::Conflict(err.to_string()),
            StoreError::MissingRow { .. } => AppError::NotFound(err.to_string()),
            StoreError::Unavailable(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::CapacityExceeded {
                kind,
                total,
                capacity,
            } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": self.to_string(),
                    "kind": kind,
                    "total": total,
                    "capacity": capacity,
                }),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
