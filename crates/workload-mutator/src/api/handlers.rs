use std::{any::Any, sync::Arc};

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn, Span};

use crate::{
    admission_request::AdmissionRequest,
    admission_response::AdmissionResponse,
    api::{
        admission_review::{AdmissionReviewRequest, AdmissionReviewResponse},
        api_error::ApiError,
        state::ApiServerState,
    },
};

const JSON_CONTENT_TYPE: &str = "application/json";

// All methods are routed here, anything but POST gets a 405.
#[tracing::instrument(
    name = "mutate",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        kind=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
/// Run the admission request through the mutation rules.
pub(crate) async fn mutate_handler(
    State(state): State<Arc<ApiServerState>>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request = decode_admission_request(&method, &headers, body).map_err(|e| {
        warn!(status = e.status.as_u16(), error = %e.message, "admission review rejected");
        e
    })?;

    populate_span_with_admission_request_data(&request);
    if let Some(object) = request.object.as_deref() {
        debug!(object = object.get(), "admission object");
    }

    let response = match state.dispatcher.dispatch(&request) {
        Ok(patch) => AdmissionResponse::allow(request.uid.clone())
            .with_patch(&patch)
            .map_err(|e| {
                error!(error = %e, "cannot encode patch");
                ApiError::internal()
            })?,
        Err(e) => {
            warn!(error = %e, "mutation rejected");
            AdmissionResponse::reject(request.uid.clone(), e.to_string())
        }
    };

    populate_span_with_admission_response_data(&response);

    let payload = serde_json::to_vec(&AdmissionReviewResponse::new(response)).map_err(|e| {
        error!(error = %e, "cannot encode admission review response");
        ApiError::internal()
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
        payload,
    )
        .into_response())
}

fn decode_admission_request(
    method: &Method,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<AdmissionRequest, ApiError> {
    if *method != Method::POST {
        return Err(ApiError::method_not_allowed(format!(
            "invalid method {method}, only POST requests are allowed"
        )));
    }

    let body = body.map_err(|rejection| {
        ApiError::bad_request(format!("cannot read request body: {}", rejection.body_text()))
    })?;
    if body.is_empty() {
        return Err(ApiError::bad_request("empty request body"));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != JSON_CONTENT_TYPE {
        return Err(ApiError::bad_request(format!(
            "invalid Content-Type {content_type:?}, expected {JSON_CONTENT_TYPE}"
        )));
    }

    let admission_review: AdmissionReviewRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("cannot decode admission review: {e}")))?;
    admission_review
        .request
        .ok_or_else(|| ApiError::bad_request("admission review carries no request"))
}

pub(crate) async fn readiness_handler() -> StatusCode {
    StatusCode::OK
}

/// Turn a panic raised while serving a request into a 500, the server keeps
/// running. The backtrace is logged by the panic hook installed at startup.
pub(crate) fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_owned()
    };

    error!(panic = %details, "request handler panicked");

    ApiError::internal().into_response()
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    let span = Span::current();
    span.record("request_uid", adm_req.uid.as_str());
    span.record("kind", adm_req.kind.kind.as_str());
    span.record("name", adm_req.name.as_deref().unwrap_or_default());
    span.record("namespace", adm_req.namespace.as_deref().unwrap_or_default());
    span.record("operation", adm_req.operation.to_string().as_str());
}

fn populate_span_with_admission_response_data(response: &AdmissionResponse) {
    let span = Span::current();
    span.record("allowed", response.allowed);
    span.record("mutated", response.patch.is_some());
    if let Some(message) = response
        .status
        .as_ref()
        .and_then(|status| status.message.as_deref())
    {
        span.record("response_message", message);
    }
}
