//! Cluster-wide error type and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors produced by the cluster aggregator and everything it calls through.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("engine is not connected: {0}")]
    NotConnected(String),

    #[error("no scheduler registered for type {0}")]
    NoScheduler(String),

    #[error("no eligible engines to run image")]
    NoEligibleEngines,

    #[error("engine with id {0} is not in cluster")]
    EngineMissing(String),

    #[error("image validation failed: {0}")]
    ValidationFailed(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] bollard::errors::Error),

    #[error("discovery service error: {0}")]
    Discovery(String),

    #[error("{0}")]
    Internal(String),
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        let status = match &self {
            ClusterError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ClusterError::NotFound(_) | ClusterError::EngineMissing(_) => StatusCode::NOT_FOUND,
            ClusterError::NoScheduler(_) | ClusterError::NoEligibleEngines => {
                StatusCode::BAD_REQUEST
            }
            // `NotConnected` falls into the "500 for others" bucket (§7) rather
            // than a fourth status code of its own.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": true,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
