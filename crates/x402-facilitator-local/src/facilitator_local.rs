//! A [`Facilitator`] that runs scheme handlers in-process.
//!
//! Requests are routed by their [`SchemeHandlerSlug`](x402_types::scheme::SchemeHandlerSlug),
//! built from the payload's network name, the protocol version and the scheme
//! name. Requests no handler can take are answered with a structured
//! rejection rather than an error:
//!
//! - a version other than 1 gets `invalid_x402_version`
//! - an unknown scheme gets `unsupported_scheme`
//! - a known scheme on a network without a configured chain gets `invalid_network`

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use x402_types::facilitator::Facilitator;
use x402_types::proto;
use x402_types::proto::v1::{self, X402Version1};
use x402_types::proto::{ErrorReason, ErrorResponse, RequestEnvelope};
use x402_types::scheme::{SchemeRegistry, X402SchemeFacilitator, X402SchemeFacilitatorError};

/// Routes verify and settle requests to scheme handlers.
///
/// ```ignore
/// let scheme_registry = SchemeRegistry::build(&chain_registry, scheme_blueprints);
/// let facilitator = FacilitatorLocal::new(scheme_registry);
/// let response = facilitator.verify(&verify_request).await?;
/// ```
pub struct FacilitatorLocal<A> {
    handlers: A,
}

impl<A> FacilitatorLocal<A> {
    pub fn new(handlers: A) -> Self {
        FacilitatorLocal { handlers }
    }
}

/// Where a request goes.
enum Route<'a> {
    Handler(&'a dyn X402SchemeFacilitator),
    Reject(ErrorReason),
}

impl FacilitatorLocal<SchemeRegistry> {
    fn route(&self, envelope: &RequestEnvelope) -> Route<'_> {
        if envelope.x402_version != u64::from(X402Version1::VALUE) {
            return Route::Reject(ErrorReason::InvalidX402Version);
        }
        let handler = envelope
            .scheme_handler_slug()
            .and_then(|slug| self.handlers.by_slug(&slug));
        match handler {
            Some(handler) => Route::Handler(handler),
            None if self.handlers.has_scheme(&envelope.scheme) => {
                Route::Reject(ErrorReason::InvalidNetwork)
            }
            None => Route::Reject(ErrorReason::UnsupportedScheme),
        }
    }
}

impl Facilitator for FacilitatorLocal<SchemeRegistry> {
    type Error = FacilitatorLocalError;

    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v1::VerifyResponse, Self::Error> {
        let envelope = request
            .envelope()
            .map_err(|e| FacilitatorLocalError::Verification(e.into()))?;
        match self.route(&envelope) {
            Route::Handler(handler) => handler
                .verify(request)
                .await
                .map_err(FacilitatorLocalError::Verification),
            Route::Reject(reason) => {
                tracing::debug!(scheme = %envelope.scheme, network = %envelope.network, ?reason, "No handler for request");
                Ok(v1::VerifyResponse::invalid(envelope.payer, reason))
            }
        }
    }

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v1::SettleResponse, Self::Error> {
        let envelope = request
            .envelope()
            .map_err(|e| FacilitatorLocalError::Settlement(e.into()))?;
        match self.route(&envelope) {
            Route::Handler(handler) => handler
                .settle(request)
                .await
                .map_err(FacilitatorLocalError::Settlement),
            Route::Reject(reason) => {
                tracing::debug!(scheme = %envelope.scheme, network = %envelope.network, ?reason, "No handler for request");
                Ok(v1::SettleResponse::rejected(
                    reason,
                    envelope.payer,
                    envelope.network,
                ))
            }
        }
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, Self::Error> {
        let mut kinds = vec![];
        let mut signers = HashMap::new();
        for handler in self.handlers.values() {
            match handler.supported().await {
                Ok(mut supported) => {
                    kinds.append(&mut supported.kinds);
                    for (chain_id, signer_addresses) in supported.signers {
                        signers.entry(chain_id).or_insert(signer_addresses);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Scheme handler could not list its payment kinds"),
            }
        }
        Ok(proto::SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        })
    }
}

/// Failures of the `/verify` and `/settle` steps that are not payment rejections.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    #[error(transparent)]
    Verification(X402SchemeFacilitatorError),
    #[error(transparent)]
    Settlement(X402SchemeFacilitatorError),
}

impl FacilitatorLocalError {
    fn inner(&self) -> &X402SchemeFacilitatorError {
        match self {
            FacilitatorLocalError::Verification(e) | FacilitatorLocalError::Settlement(e) => e,
        }
    }
}

/// Malformed requests are a 400. Chain failures are a 502, since the client
/// may retry them.
impl IntoResponse for FacilitatorLocalError {
    fn into_response(self) -> Response {
        let status = match self.inner() {
            X402SchemeFacilitatorError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            X402SchemeFacilitatorError::OnchainFailure(_) => StatusCode::BAD_GATEWAY,
        };
        let error = match self.inner() {
            X402SchemeFacilitatorError::InvalidFormat(_) => "Invalid request".to_string(),
            X402SchemeFacilitatorError::OnchainFailure(_) => "Onchain failure".to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
