use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use serde_json::Value;

use crate::error::WebErrorKind;
use crate::{AppState, Error};
use broker::channel::Channel;
use domain::access;
use domain::authenticator::SERVICE_TOKEN_HEADER;
use log::*;

/// Request body for publishing one log record.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishRequest {
    /// Name of the publishing service; must match the service component of
    /// the derived channel.
    pub service: String,
    pub workspace_id: String,
    pub workflow_id: Option<String>,
    pub function_id: Option<String>,
    /// Opaque log payload, fanned out verbatim.
    #[serde(rename = "logData")]
    #[schema(value_type = Object)]
    pub log_data: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    pub success: bool,
    pub channel: String,
    /// Number of subscriber queues that accepted the record.
    pub delivered: usize,
    pub timestamp: u64,
}

/// Derive the target channel from the request body. `function_id` takes
/// precedence over `workflow_id` when both are present.
fn derive_channel(request: &PublishRequest) -> Result<Channel, Error> {
    let channel = if let Some(function_id) = request.function_id.as_deref() {
        Channel::new("function", &request.workspace_id, Some(function_id))
    } else if let Some(workflow_id) = request.workflow_id.as_deref() {
        Channel::new(&request.service, &request.workspace_id, Some(workflow_id))
    } else {
        Channel::new(&request.service, &request.workspace_id, None)
    };

    channel.map_err(|e| {
        debug!("Rejecting publish with malformed channel components: {e}");
        Error::Web(WebErrorKind::BadRequest)
    })
}

fn service_token(headers: &HeaderMap) -> &str {
    headers
        .get(SERVICE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// POST publish a log record to its derived channel
#[utoipa::path(
    post,
    path = "/api/logs/publish",
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Record fanned out to the current subscriber set", body = PublishResponse),
        (status = 400, description = "Malformed body or channel components"),
        (status = 403, description = "Service token, declared service, and channel do not line up")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let Json(request) = body.map_err(|e| {
        debug!("Rejecting malformed publish body: {e}");
        Error::Web(WebErrorKind::BadRequest)
    })?;

    let channel = derive_channel(&request)?;
    access::authorize_publish(
        app_state.service_authenticator.as_ref(),
        service_token(&headers),
        &request.service,
        &channel,
    )
    .await?;

    Ok(Json(fan_out(&app_state, &channel, request.log_data)))
}

/// POST synthesize a publish without service credentials
///
/// Test convenience sharing the publish semantics and response shape; the
/// channel shape is still validated but the service authenticator is skipped.
#[utoipa::path(
    post,
    path = "/test/logs",
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Record fanned out to the current subscriber set", body = PublishResponse),
        (status = 400, description = "Malformed body or channel components")
    )
)]
pub async fn publish_test(
    State(app_state): State<AppState>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let Json(request) = body.map_err(|e| {
        debug!("Rejecting malformed test publish body: {e}");
        Error::Web(WebErrorKind::BadRequest)
    })?;

    let channel = derive_channel(&request)?;
    Ok(Json(fan_out(&app_state, &channel, request.log_data)))
}

fn fan_out(app_state: &AppState, channel: &Channel, payload: Value) -> PublishResponse {
    let receipt = app_state.broker.publish(channel, payload);
    debug!(
        "Publish to {} delivered to {} subscriber(s)",
        channel, receipt.delivered
    );
    PublishResponse {
        success: true,
        channel: channel.name().to_string(),
        delivered: receipt.delivered,
        timestamp: receipt.envelope.published_at,
    }
}
