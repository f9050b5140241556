//! HTTP endpoints of the facilitator.
//!
//! | Method | Path | |
//! |---|---|---|
//! | `GET` | `/verify` | shape of the `/verify` body |
//! | `POST` | `/verify` | check a payment against its requirements |
//! | `GET` | `/settle` | shape of the `/settle` body |
//! | `POST` | `/settle` | settle an accepted payment on-chain |
//! | `GET` | `/supported` | payment kinds and signer addresses |
//! | `GET` | `/health` | liveness |
//!
//! Payment rejections are `200 OK` with `isValid: false` or `success: false`.
//! Other statuses come from the facilitator's error type.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::instrument;
use x402_types::facilitator::Facilitator;
use x402_types::proto;

/// The facilitator routes, to be given their state with [`Router::with_state`].
pub fn routes<A>() -> Router<A>
where
    A: Facilitator + Clone + Send + Sync + 'static,
    A::Error: IntoResponse,
{
    Router::new()
        .route("/verify", get(get_verify_info).post(post_verify::<A>))
        .route("/settle", get(get_settle_info).post(post_settle::<A>))
        .route("/supported", get(get_supported::<A>))
        .route("/health", get(get_health))
}

/// `GET /verify`
#[instrument(skip_all)]
pub async fn get_verify_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "x402Version": "number",
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /settle`
#[instrument(skip_all)]
pub async fn get_settle_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "x402Version": "number",
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /health`
pub async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /supported`: what this facilitator can verify and settle.
#[instrument(skip_all)]
pub async fn get_supported<A>(State(facilitator): State<A>) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    match facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(supported)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to list supported payment kinds");
            error.into_response()
        }
    }
}

/// `POST /verify`: checks signature, recipient, timing, balance and amount.
#[instrument(skip_all)]
pub async fn post_verify<A>(
    State(facilitator): State<A>,
    Json(body): Json<proto::VerifyRequest>,
) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    match facilitator.verify(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                body = %body.as_str(),
                "Verification failed"
            );
            error.into_response()
        }
    }
}

/// `POST /settle`: verifies again, then submits `transferWithAuthorization`.
#[instrument(skip_all)]
pub async fn post_settle<A>(
    State(facilitator): State<A>,
    Json(body): Json<proto::SettleRequest>,
) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    match facilitator.settle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = %error,
                body = %body.as_str(),
                "Settlement failed"
            );
            error.into_response()
        }
    }
}
