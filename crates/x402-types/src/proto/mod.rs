//! Wire types for facilitator requests and responses.
//!
//! Requests arrive as opaque JSON ([`VerifyRequest`]); the facilitator reads a
//! small [`RequestEnvelope`] out of them to pick a scheme handler, and the
//! handler then deserializes the full, typed [`v1::VerifyRequest`].
//!
//! Rejections are reported through the closed [`ErrorReason`] enumeration. Its
//! snake_case names are part of the protocol and must stay stable.

use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;

use crate::chain::ChainId;
use crate::scheme::SchemeHandlerSlug;

pub mod v1;

/// A payment method the facilitator accepts.
///
/// ```json
/// { "x402Version": 1, "scheme": "exact", "network": "base-sepolia" }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: u8,
    pub scheme: String,
    /// v1 network name.
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Body of `GET /supported`.
#[serde_as]
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Settlement signer addresses per chain.
    #[serde(default)]
    pub signers: HashMap<ChainId, Vec<String>>,
}

/// Body of `POST /verify`, kept as raw JSON until a scheme handler is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest(Box<serde_json::value::RawValue>);

/// Body of `POST /settle`. Same shape as [`VerifyRequest`].
pub type SettleRequest = VerifyRequest;

impl From<Box<serde_json::value::RawValue>> for VerifyRequest {
    fn from(value: Box<serde_json::value::RawValue>) -> Self {
        Self(value)
    }
}

impl TryFrom<serde_json::Value> for VerifyRequest {
    type Error = serde_json::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let raw = serde_json::value::to_raw_value(&value)?;
        Ok(Self(raw))
    }
}

impl VerifyRequest {
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Reads the routing fields out of the request.
    ///
    /// Only the version, the payload `scheme` and `network`, and the payer are
    /// looked at, so an unknown version or scheme still yields an envelope the
    /// caller can answer with a structured rejection.
    pub fn envelope(&self) -> Result<RequestEnvelope, PaymentVerificationError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestWire {
            x402_version: u64,
            payment_payload: PaymentPayloadWire,
        }

        #[derive(Deserialize)]
        struct PaymentPayloadWire {
            scheme: String,
            network: String,
            #[serde(default)]
            payload: Option<serde_json::Value>,
        }

        let wire: RequestWire = serde_json::from_str(self.as_str())?;
        let payer = wire
            .payment_payload
            .payload
            .as_ref()
            .and_then(|payload| payload.pointer("/authorization/from"))
            .and_then(|from| from.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(RequestEnvelope {
            x402_version: wire.x402_version,
            scheme: wire.payment_payload.scheme,
            network: wire.payment_payload.network,
            payer,
        })
    }
}

/// Routing fields of a verify or settle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub x402_version: u64,
    pub scheme: String,
    /// v1 network name as sent by the client.
    pub network: String,
    /// `authorization.from`, or empty when absent.
    pub payer: String,
}

impl RequestEnvelope {
    /// Handler slug for this request, if the version and network are known.
    pub fn scheme_handler_slug(&self) -> Option<SchemeHandlerSlug> {
        let x402_version = u8::try_from(self.x402_version).ok()?;
        let chain_id = ChainId::from_network_name(&self.network)?;
        Some(SchemeHandlerSlug::new(
            chain_id,
            x402_version,
            self.scheme.clone(),
        ))
    }
}

/// Body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Why a payment was rejected during verification.
#[derive(Debug, thiserror::Error)]
pub enum PaymentVerificationError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Unsupported x402 version {0}")]
    UnsupportedVersion(u64),
    #[error("Unsupported scheme")]
    UnsupportedScheme,
    #[error("{0}")]
    InvalidNetwork(String),
    #[error("{0}")]
    InvalidSignature(String),
    #[error("Payment recipient does not match payTo")]
    RecipientMismatch,
    #[error("Payment authorization is expired")]
    Expired,
    #[error("Payment authorization is not yet valid")]
    Early,
    #[error("Onchain balance is not enough to cover the payment amount")]
    InsufficientFunds,
    #[error("Authorized value is below the required amount")]
    InvalidPaymentAmount,
    #[error("Smart wallet is not deployed and carries no deployment data")]
    UndeployedSmartWallet,
}

impl From<serde_json::Error> for PaymentVerificationError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidFormat(value.to_string())
    }
}

/// Machine-readable reason attached to a rejected verify or settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    InsufficientFunds,
    InvalidExactEvmPayloadAuthorizationValidAfter,
    InvalidExactEvmPayloadAuthorizationValidBefore,
    InvalidExactEvmPayloadAuthorizationValue,
    InvalidExactEvmPayloadSignature,
    InvalidExactEvmPayloadRecipientMismatch,
    InvalidExactEvmPayloadUndeployedSmartWallet,
    InvalidNetwork,
    InvalidPayload,
    InvalidPaymentRequirements,
    InvalidScheme,
    #[serde(rename = "invalid_x402_version")]
    InvalidX402Version,
    InvalidTransactionState,
    UnsupportedScheme,
    UnexpectedVerifyError,
    UnexpectedSettleError,
}

/// Maps an error onto the wire [`ErrorReason`].
pub trait AsErrorReason {
    fn as_error_reason(&self) -> ErrorReason;
}

impl AsErrorReason for PaymentVerificationError {
    fn as_error_reason(&self) -> ErrorReason {
        match self {
            PaymentVerificationError::InvalidFormat(_) => ErrorReason::InvalidPayload,
            PaymentVerificationError::UnsupportedVersion(_) => ErrorReason::InvalidX402Version,
            PaymentVerificationError::UnsupportedScheme => ErrorReason::UnsupportedScheme,
            PaymentVerificationError::InvalidNetwork(_) => ErrorReason::InvalidNetwork,
            PaymentVerificationError::InvalidSignature(_) => {
                ErrorReason::InvalidExactEvmPayloadSignature
            }
            PaymentVerificationError::RecipientMismatch => {
                ErrorReason::InvalidExactEvmPayloadRecipientMismatch
            }
            PaymentVerificationError::Expired => {
                ErrorReason::InvalidExactEvmPayloadAuthorizationValidBefore
            }
            PaymentVerificationError::Early => {
                ErrorReason::InvalidExactEvmPayloadAuthorizationValidAfter
            }
            PaymentVerificationError::InsufficientFunds => ErrorReason::InsufficientFunds,
            PaymentVerificationError::InvalidPaymentAmount => {
                ErrorReason::InvalidExactEvmPayloadAuthorizationValue
            }
            PaymentVerificationError::UndeployedSmartWallet => {
                ErrorReason::InvalidExactEvmPayloadUndeployedSmartWallet
            }
        }
    }
}
