use crate::metrics::metrics;
use crate::pipeline::PredictError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

/// Every failure leaves the service as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing file or class_name.")]
    MissingFields,
    #[error("{}", .0.body_text())]
    Multipart(MultipartError),
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error("Unable to fetch image: {0}")]
    ExampleImage(#[source] reqwest::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Predict(_) | ApiError::ExampleImage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn metric_kind(&self) -> Option<&'static str> {
        match self {
            ApiError::MissingFields | ApiError::Multipart(_) => Some("bad_request"),
            ApiError::Predict(e) => Some(e.kind()),
            ApiError::Internal(_) => Some("internal"),
            ApiError::ExampleImage(_) => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if let Some(kind) = self.metric_kind() {
            metrics().prediction_errors.with_label_values(&[kind]).inc();
        }
        if status.is_server_error() {
            error!(%status, error = %message, "request failed");
        } else {
            warn!(%status, error = %message, "request rejected");
        }
        error_response(status, message)
    }
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
