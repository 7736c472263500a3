use super::error::ApiError;
use super::AppState;
use crate::metrics::metrics;
use crate::pipeline::Prediction;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

/// `POST /predict`: multipart `file` + `class_name`.
pub async fn predict(State(state): State<AppState>, multipart: Result<Multipart, MultipartRejection>) -> Result<Json<Prediction>, ApiError> {
    // a non-multipart request carries neither field
    let Ok(mut multipart) = multipart else { return Err(ApiError::MissingFields) };
    let mut file: Option<Bytes> = None;
    let mut class_name: Option<String> = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::Multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            // a plain text part named `file` is not an upload
            "file" if field.file_name().is_some() => file = Some(field.bytes().await.map_err(ApiError::Multipart)?),
            "class_name" => class_name = Some(field.text().await.map_err(ApiError::Multipart)?),
            other => debug!(field = other, "ignoring multipart field"),
        }
    }
    let (Some(file), Some(class_name)) = (file, class_name) else { return Err(ApiError::MissingFields) };

    let pipeline = state.pipeline.clone();
    let prediction = tokio::task::spawn_blocking(move || pipeline.predict(&class_name, &file))
        .await
        .map_err(|e| ApiError::Internal(format!("inference task failed: {e}")))??;
    info!(class_index = prediction.class_index, score = prediction.score, result = prediction.label.as_str(), "prediction served");
    Ok(Json(prediction))
}

/// `GET /example-image`: proxies the configured reference image.
pub async fn example_image(State(state): State<AppState>) -> Result<Response, ApiError> {
    let fetched = async {
        state.http.get(&*state.example_image_url).send().await?.error_for_status()?.bytes().await
    }
    .await;
    match fetched {
        Ok(bytes) => {
            metrics().example_image_fetches.with_label_values(&["ok"]).inc();
            Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
        }
        Err(e) => {
            metrics().example_image_fetches.with_label_values(&["error"]).inc();
            Err(ApiError::ExampleImage(e))
        }
    }
}

/// `GET /classes`: registered classes ordered by index.
pub async fn classes(State(state): State<AppState>) -> Json<serde_json::Value> {
    let classes: Vec<_> = state.pipeline.registry().entries().collect();
    Json(serde_json::json!({ "classes": classes }))
}

pub async fn not_found(uri: Uri) -> Response {
    super::error::error_response(StatusCode::NOT_FOUND, format!("No route for {}", uri.path()))
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    super::error::error_response(StatusCode::METHOD_NOT_ALLOWED, format!("Method {method} not allowed for {}", uri.path()))
}
