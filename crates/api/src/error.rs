//! HTTP error rendering.

use axum::Json;
use axum::response::{IntoResponse, Response};
use meridian_dispatch::DispatchError;
use meridian_error::{ControlError, ErrorKind};
use meridian_registry::RegistryError;

/// An error ready to render as the shared payload shape.
#[derive(Debug)]
pub struct ApiError(pub ControlError);

impl ApiError {
    /// The underlying control error.
    #[must_use]
    pub fn inner(&self) -> &ControlError {
        &self.0
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        Self(err)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let control = match &err {
            RegistryError::InvalidWorkflow(inner) => {
                ControlError::new(ErrorKind::InvalidWorkflow, inner.to_string())
            }
            RegistryError::RunNotFound(_) => ControlError::new(ErrorKind::NotFound, err.to_string()),
            RegistryError::RunExists(_) | RegistryError::DispatchConflict(_) => {
                ControlError::new(ErrorKind::Conflict, err.to_string())
            }
            RegistryError::Finalised(_) => ControlError::new(ErrorKind::Conflict, err.to_string()),
            _ => ControlError::new(ErrorKind::Internal, err.to_string()),
        };
        Self(control)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let control = match &err {
            DispatchError::NoWorkerAvailable(_) => {
                ControlError::new(ErrorKind::WorkerUnavailable, err.to_string())
            }
            DispatchError::Gateway(_) => {
                ControlError::new(ErrorKind::WorkerUnavailable, err.to_string())
            }
            DispatchError::Registry(inner) => return Self::from_registry_ref(inner),
            DispatchError::InvalidChain(_) => {
                ControlError::new(ErrorKind::BadRequest, err.to_string())
            }
        };
        Self(control)
    }
}

impl ApiError {
    fn from_registry_ref(err: &RegistryError) -> Self {
        match err {
            RegistryError::RunNotFound(id) => {
                Self(ControlError::new(ErrorKind::NotFound, format!("run not found: {id}")))
            }
            other => Self(ControlError::new(ErrorKind::Internal, other.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.kind.status();
        let payload = self.0.to_payload(None);
        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::RunId;
    use meridian_workflow::WorkflowError;

    #[test]
    fn invalid_workflow_maps_to_bad_request() {
        let err = ApiError::from(RegistryError::InvalidWorkflow(WorkflowError::Empty));
        assert_eq!(err.inner().kind, ErrorKind::InvalidWorkflow);
        assert_eq!(err.inner().kind.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_run_maps_to_not_found() {
        let err = ApiError::from(RegistryError::RunNotFound(RunId::nil()));
        assert_eq!(err.inner().kind, ErrorKind::NotFound);
    }

    #[test]
    fn no_worker_maps_to_service_unavailable() {
        let err = ApiError::from(DispatchError::NoWorkerAvailable(
            meridian_core::NodeKey::new("a").unwrap(),
        ));
        assert_eq!(err.inner().kind, ErrorKind::WorkerUnavailable);
        assert_eq!(
            err.inner().kind.status(),
            http::StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
