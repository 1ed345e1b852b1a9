use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use atende_core::domain::appointment::{Appointment, AppointmentId};
use atende_core::domain::session::UserId;
use atende_core::domain::tenant::TenantId;
use atende_core::errors::{ApplicationError, InterfaceError};
use atende_core::flows::{ConversationEngine, ConversationState};
use atende_core::memory::RecordingReplySender;
use atende_gateway::{deliver_all, InboundEnvelope, LaneDispatcher, OutboundSender};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Shared by the webhook and admin routes. Every route requires the gateway api token as a
/// bearer token.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<LaneDispatcher<ConversationEngine>>,
    pub outbound: Arc<dyn OutboundSender>,
    pub api_token: SecretString,
}

impl AppState {
    fn engine(&self) -> &ConversationEngine {
        self.dispatcher.handler()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { correlation_id: String },
    Interface(InterfaceError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::Interface(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_owned(),
        })
    }

    fn from_application(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self::Interface(error.into().into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, correlation_id) = match self {
            Self::Unauthorized { correlation_id } => {
                (StatusCode::UNAUTHORIZED, "Missing or invalid bearer token.", correlation_id)
            }
            Self::Interface(interface) => {
                let status = match &interface {
                    InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                    InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
                    InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                warn!(
                    event_name = "http.request_failed",
                    correlation_id = interface.correlation_id(),
                    status = status.as_u16(),
                    error = %interface,
                    "request failed"
                );
                (status, interface.user_message(), interface.correlation_id().to_owned())
            }
        };
        (status, Json(ErrorBody { error: error.to_owned(), correlation_id })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/messages", post(receive_message))
        .route("/admin/tenants/{tenant}/invalidate", post(invalidate_tenant))
        .route("/admin/tenants/{tenant}/slots", get(available_slots))
        .route("/admin/tenants/{tenant}/appointments", get(list_appointments))
        .route("/admin/tenants/{tenant}/appointments/{id}/cancel", post(cancel_appointment))
        .route("/admin/tenants/{tenant}/payments/{order_id}/confirm", post(confirm_payment))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("req-{}", Utc::now().timestamp_micros()))
}

fn authorize(state: &AppState, headers: &HeaderMap, correlation_id: &str) -> Result<(), ApiError> {
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == state.api_token.expose_secret() => Ok(()),
        _ => Err(ApiError::Unauthorized { correlation_id: correlation_id.to_owned() }),
    }
}

fn parse_date(
    raw: Option<&str>,
    field: &str,
    correlation_id: &str,
) -> Result<NaiveDate, ApiError> {
    let raw =
        raw.ok_or_else(|| ApiError::bad_request(format!("missing `{field}`"), correlation_id))?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::bad_request(format!("`{field}` must be YYYY-MM-DD, got `{raw}`"), correlation_id)
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub correlation_id: String,
    /// Out-of-band replies first, then the engine's final replies, in delivery order.
    pub messages: Vec<String>,
    pub state: ConversationState,
}

/// Runs one inbound message through the user's lane and answers with its replies. The
/// caller (the channel adapter) is responsible for delivering them.
async fn receive_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<InboundEnvelope>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let correlation_id = envelope.envelope_id.clone();
    authorize(&state, &headers, &correlation_id)?;
    info!(
        event_name = "http.webhook_received",
        correlation_id = %correlation_id,
        tenant_id = %envelope.message.tenant_id,
        user_id = %envelope.message.sender_id,
        "webhook message received"
    );

    let replies = RecordingReplySender::default();
    let response = state
        .dispatcher
        .dispatch(envelope, Arc::new(replies.clone()))
        .await
        .map_err(|error| {
            let error = ApplicationError::Integration(error.to_string());
            ApiError::from_application(error, &correlation_id)
        })?;

    let mut messages = replies.texts();
    messages.extend(response.messages);
    Ok(Json(WebhookResponse { correlation_id, messages, state: response.state }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub tenant_id: String,
    pub evicted: bool,
}

async fn invalidate_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<String>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;
    let evicted = state.engine().tenants().invalidate(&TenantId(tenant.clone())).await;
    info!(
        event_name = "http.tenant_invalidated",
        correlation_id = %correlation_id,
        tenant_id = %tenant,
        evicted,
        "tenant config cache invalidated"
    );
    Ok(Json(InvalidateResponse { tenant_id: tenant, evicted }))
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotsResponse {
    pub tenant_id: String,
    pub date: NaiveDate,
    pub slots: Vec<String>,
}

async fn available_slots(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;
    let date = parse_date(query.date.as_deref(), "date", &correlation_id)?;
    let slots = state
        .engine()
        .scheduling()
        .get_available_slots(&TenantId(tenant.clone()), date)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(SlotsResponse { tenant_id: tenant, date, slots }))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

async fn list_appointments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;
    let start = parse_date(query.start.as_deref(), "start", &correlation_id)?;
    let end = parse_date(query.end.as_deref(), "end", &correlation_id)?;
    let appointments = state
        .engine()
        .scheduling()
        .list_appointments(&TenantId(tenant), start, end)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(appointments))
}

async fn cancel_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((tenant, id)): Path<(String, String)>,
) -> Result<Json<Appointment>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;
    let appointment = state
        .engine()
        .scheduling()
        .cancel_appointment(&TenantId(tenant), &AppointmentId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(appointment))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmPaymentResponse {
    pub confirmed: bool,
    pub messages: Vec<String>,
    pub state: Option<ConversationState>,
}

/// Payment provider callback. A confirmation for a session that is not waiting on the order
/// is acknowledged with `confirmed: false` so the provider stops retrying. The session write
/// and the delivery run on the user's lane, ordered with their inbound messages.
async fn confirm_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((tenant, order_id)): Path<(String, String)>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    authorize(&state, &headers, &correlation_id)?;
    let tenant_id = TenantId(tenant);
    let user_id = UserId(request.user_id);

    let outbound = Arc::clone(&state.outbound);
    let (lane_tenant, lane_user) = (tenant_id.clone(), user_id.clone());
    let confirmed = state
        .dispatcher
        .run_exclusive(tenant_id, user_id, correlation_id.clone(), move |engine| async move {
            let confirmed =
                engine.confirm_payment(&lane_tenant, &lane_user, &order_id).await?;
            if let Some(response) = &confirmed {
                // Failures are logged by the gateway; the confirmation itself already stuck.
                let _ = deliver_all(outbound.as_ref(), &lane_tenant, &lane_user, &response.messages)
                    .await;
            }
            Ok::<_, ApplicationError>(confirmed)
        })
        .await
        .map_err(|error| {
            let error = ApplicationError::Integration(error.to_string());
            ApiError::from_application(error, &correlation_id)
        })?
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(match confirmed {
        Some(response) => ConfirmPaymentResponse {
            confirmed: true,
            messages: response.messages,
            state: Some(response.state),
        },
        None => ConfirmPaymentResponse { confirmed: false, messages: Vec::new(), state: None },
    }))
}
