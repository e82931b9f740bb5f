use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::fmt::Write;
use telemon_common::format_value;
use telemon_common::types::{parse_value, Metric, MetricKind, MetricPayload, ValidationError};
use telemon_storage::StorageError;

/// Errors returned by the HTTP handlers, rendered as a plain-text body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid request body: {0}")]
    BadBody(String),

    #[error("expected Content-Type: application/json")]
    NotJson,

    #[error("metric '{0}' not found")]
    NotFound(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadBody(_) | ApiError::NotJson => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(StorageError::KindMismatch { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub fn metric_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping).post(ping))
        .route("/update", post(update_json))
        .route("/update/", post(update_json))
        .route("/update/:type/:name/:value", post(update_path))
        .route("/value", post(value_json))
        .route("/value/", post(value_json))
        .route("/value/:type/:name", get(value_path))
}

/// Applies one write and journals it; returns the merged metric.
fn apply_write(state: &AppState, request: &MetricPayload) -> Result<Metric, ApiError> {
    let amount = request.amount()?;
    Ok(state.apply_write(request, amount)?)
}

/// Looks up `name`, treating a stored metric of another kind as absent.
fn find_metric(state: &AppState, kind: MetricKind, name: &str) -> Result<Metric, ApiError> {
    match state.storage.get_record(name) {
        Ok(metric) if metric.kind == kind => Ok(metric),
        Ok(_) | Err(StorageError::NotFound(_)) => Err(ApiError::NotFound(name.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);
    if is_json {
        Ok(())
    } else {
        Err(ApiError::NotJson)
    }
}

fn parse_payload(body: &[u8]) -> Result<MetricPayload, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadBody(e.to_string()))
}

async fn update_path(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let amount = parse_value(&value)?;
    let request = MetricPayload::new(kind, name, amount);

    let merged = apply_write(&state, &request).map_err(|e| {
        tracing::warn!(
            trace_id = %trace_id,
            metric = %request.id,
            error = %e,
            "Update rejected"
        );
        e
    })?;
    tracing::debug!(
        trace_id = %trace_id,
        metric = %merged.id,
        value = merged.value,
        "Metric updated"
    );

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "").into_response())
}

async fn update_json(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetricPayload>, ApiError> {
    require_json(&headers)?;
    let request = parse_payload(&body)?;

    let merged = apply_write(&state, &request).map_err(|e| {
        tracing::warn!(
            trace_id = %trace_id,
            metric = %request.id,
            error = %e,
            "Update rejected"
        );
        e
    })?;
    tracing::debug!(
        trace_id = %trace_id,
        metric = %merged.id,
        value = merged.value,
        "Metric updated"
    );

    Ok(Json(MetricPayload::from(&merged)))
}

async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetricPayload>, ApiError> {
    require_json(&headers)?;
    let request = parse_payload(&body)?;
    if request.id.is_empty() {
        return Err(ValidationError::MissingName.into());
    }

    let metric = find_metric(&state, request.kind, &request.id)?;
    Ok(Json(MetricPayload::from(&metric)))
}

async fn value_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let kind: MetricKind = kind.parse()?;
    let metric = find_metric(&state, kind, &name)?;
    Ok(format_value(metric.value))
}

async fn list_metrics(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let mut metrics: Vec<Metric> = state.storage.get_all_metrics()?.into_values().collect();
    metrics.sort_by(|a, b| a.id.cmp(&b.id));

    let mut items = String::new();
    for metric in &metrics {
        let name = escape_html(&metric.id);
        let _ = writeln!(
            items,
            "<li><a href=\"/value/{}/{name}\">{name}</a> = {}</li>",
            metric.kind,
            format_value(metric.value)
        );
    }

    Ok(Html(format!(
        "<html>\n<head><title>Metrics</title></head>\n<body>\n\
         <h1>Metrics</h1>\n<ul>\n{items}</ul>\n</body>\n</html>\n"
    )))
}

async fn ping(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let Some(db) = &state.sqlite else {
        return Ok(StatusCode::NOT_FOUND);
    };
    db.ping().map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(StatusCode::OK)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            ApiError::from(ValidationError::UnknownKind("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::KindMismatch {
                name: "m".into(),
                stored: MetricKind::Gauge,
                requested: MetricKind::Counter,
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::NotFound("m".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::Other("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn escapes_markup_in_names() {
        assert_eq!(escape_html("<a&b>"), "&lt;a&amp;b&gt;");
    }
}
