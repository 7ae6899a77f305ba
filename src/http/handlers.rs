//! Management API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::http::server::AppState;
use crate::registry::{RegistryError, Service, ServiceId, ServiceRegistry};
use crate::resilience::BreakerSnapshot;

const MAX_FIELD_LEN: usize = 255;

/// Errors returned to API clients as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid service payload received")]
    InvalidPayload,

    #[error("service not found to {action}: {id}")]
    NotFound { action: &'static str, id: ServiceId },

    #[error("internal server error")]
    Storage(#[from] RegistryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidPayload => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage error while handling API request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewService {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceUpdate {
    pub id: ServiceId,
    pub name: String,
    pub url: String,
}

#[derive(Serialize)]
pub struct ServiceList {
    pub services: Vec<Service>,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub services: usize,
    pub realtime_subscribers: usize,
}

/// Check name and url the way the registry expects them.
pub fn validate_service_fields(name: &str, url: &str) -> Result<Url, ApiError> {
    if name.is_empty() || name.chars().count() > MAX_FIELD_LEN {
        return Err(ApiError::InvalidPayload);
    }
    if url.is_empty() || url.len() > MAX_FIELD_LEN {
        return Err(ApiError::InvalidPayload);
    }
    let parsed = Url::parse(url).map_err(|_| ApiError::InvalidPayload)?;
    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    if !matches!(parsed.scheme(), "http" | "https") || !has_host {
        return Err(ApiError::InvalidPayload);
    }
    Ok(parsed)
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected service payload");
        ApiError::InvalidPayload
    })
}

pub async fn list_services(State(state): State<AppState>) -> Result<Json<ServiceList>, ApiError> {
    let services = state.store.get_all_services().await?;
    Ok(Json(ServiceList { services }))
}

pub async fn create_service(
    State(state): State<AppState>,
    body: Result<Json<NewService>, JsonRejection>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let new = payload(body)?;
    let url = validate_service_fields(&new.name, &new.url)?;
    let service = state.store.insert(new.name, url).await?;
    tracing::info!(id = service.id, name = %service.name, url = %service.endpoint, "Service registered");
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<AppState>,
    body: Result<Json<ServiceUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let update = payload(body)?;
    let url = validate_service_fields(&update.name, &update.url)?;
    if state.store.update(update.id, update.name, url).await? {
        tracing::info!(id = update.id, "Service updated");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound { action: "update", id: update.id })
    }
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(id).await? {
        tracing::info!(id, "Service deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound { action: "delete", id })
    }
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        services: state.store.len(),
        realtime_subscribers: state.sink.subscriber_count(),
    })
}
