//! Mail relay sidecar.
//!
//! `POST /send-otp {email}`, `POST /verify-otp {email, otp}` and
//! `POST /send-status-update {email, customerName, orderId, totalAmount}`,
//! each answering `{ "success": bool }`.

pub mod mailer;
pub mod otp;

use axum::{extract::State, http::{header, HeaderValue, Method, StatusCode}, response::{IntoResponse, Response}, routing::{get, post}, Json, Router};
use html_escape::encode_text;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::{AllowOrigin, CorsLayer}, trace::TraceLayer};
use tracing::{error, info, warn};
use validator::Validate;
use crate::domain::value_objects::Money;

pub use mailer::{Email, HttpMailer, LogMailer, MailError, Mailer};
pub use otp::OtpStore;

#[derive(Clone)]
pub struct RelayState {
    pub otps: Arc<OtpStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl RelayState {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self { Self { otps: Arc::new(OtpStore::new()), mailer } }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Invalid or expired code")]
    InvalidCode,
    #[error("Failed to send email")]
    Mail(#[from] MailError),
}

impl From<validator::ValidationErrors> for RelayError {
    fn from(e: validator::ValidationErrors) -> Self { RelayError::Validation(e.to_string()) }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::Validation(_) | RelayError::InvalidCode => StatusCode::BAD_REQUEST,
            RelayError::Mail(ref e) => {
                error!(error = %e, "mail delivery failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack { pub success: bool }

const OK: Ack = Ack { success: true };

#[derive(Debug, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 12))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub customer_name: String,
    #[validate(length(min = 1))]
    pub order_id: String,
    pub total_amount: Money,
}

pub fn router(state: RelayState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "maison-mail-relay"})) }))
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/send-status-update", post(send_status_update))
        .layer(TraceLayer::new_for_http())
        .layer(cors(allowed_origins))
        .with_state(state)
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() { return CorsLayer::permissive(); }
    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| match HeaderValue::from_str(o) {
        Ok(v) => Some(v),
        Err(_) => { warn!(origin = %o, "ignoring malformed allowed origin"); None }
    }).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn send_otp(State(s): State<RelayState>, Json(r): Json<SendOtpRequest>) -> Result<Json<Ack>, RelayError> {
    r.validate()?;
    let code = s.otps.issue(&r.email);
    let email = Email {
        to: r.email.clone(),
        subject: "Your Maison sign-in code".into(),
        html: format!("<p>Your one-time code is <strong>{code}</strong>.</p><p>If you did not request it, you can ignore this email.</p>"),
    };
    if let Err(e) = s.mailer.send(email).await {
        s.otps.revoke(&r.email);
        return Err(e.into());
    }
    info!(email = %r.email, "one-time code sent");
    Ok(Json(OK))
}

async fn verify_otp(State(s): State<RelayState>, Json(r): Json<VerifyOtpRequest>) -> Result<Json<Ack>, RelayError> {
    r.validate()?;
    if !s.otps.verify(&r.email, &r.otp) {
        warn!(email = %r.email, "one-time code rejected");
        return Err(RelayError::InvalidCode);
    }
    Ok(Json(OK))
}

async fn send_status_update(State(s): State<RelayState>, Json(r): Json<StatusUpdateRequest>) -> Result<Json<Ack>, RelayError> {
    r.validate()?;
    let name = encode_text(&r.customer_name);
    let order_id = encode_text(&r.order_id);
    let email = Email {
        to: r.email.clone(),
        subject: format!("Your order {} has been delivered", r.order_id),
        html: format!(
            "<p>Dear {name},</p><p>Your order <strong>{order_id}</strong> totalling {} has been delivered. You may request a return from your order history within the return window.</p>",
            r.total_amount,
        ),
    };
    s.mailer.send(email).await?;
    info!(order_id = %r.order_id, "status update sent");
    Ok(Json(OK))
}
