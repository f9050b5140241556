//! x402 protocol version 1 messages.
//!
//! Version 1 names networks by their human-readable name (`"base-sepolia"`).
//! Payload and requirement types are generic so that each scheme can plug in its
//! own typed fields while sharing the envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

use crate::proto;
use crate::proto::ErrorReason;

/// Version marker that serializes as the integer `1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl From<X402Version1> for u8 {
    fn from(_: X402Version1) -> Self {
        X402Version1::VALUE
    }
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Outcome of `verify`.
///
/// Exactly one of "valid" and "has a reason" holds, so the two cases are
/// separate variants. On the wire:
///
/// ```json
/// { "isValid": false, "invalidReason": "insufficient_funds", "payer": "0x..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    Valid { payer: String },
    Invalid { reason: ErrorReason, payer: String },
}

impl VerifyResponse {
    pub fn valid(payer: String) -> Self {
        VerifyResponse::Valid { payer }
    }

    pub fn invalid(payer: String, reason: ErrorReason) -> Self {
        VerifyResponse::Invalid { reason, payer }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid { .. })
    }

    pub fn invalid_reason(&self) -> Option<ErrorReason> {
        match self {
            VerifyResponse::Valid { .. } => None,
            VerifyResponse::Invalid { reason, .. } => Some(*reason),
        }
    }

    pub fn payer(&self) -> &str {
        match self {
            VerifyResponse::Valid { payer } | VerifyResponse::Invalid { payer, .. } => payer,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<ErrorReason>,
    #[serde(default)]
    payer: String,
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                invalid_reason: None,
                payer: payer.clone(),
            },
            VerifyResponse::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                invalid_reason: Some(*reason),
                payer: payer.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        match (wire.is_valid, wire.invalid_reason) {
            (true, None) => Ok(VerifyResponse::Valid { payer: wire.payer }),
            (false, Some(reason)) => Ok(VerifyResponse::Invalid {
                reason,
                payer: wire.payer,
            }),
            (true, Some(_)) => Err(serde::de::Error::custom(
                "a valid response must not carry invalidReason",
            )),
            (false, None) => Err(serde::de::Error::missing_field("invalidReason")),
        }
    }
}

/// Outcome of `settle`.
///
/// `transaction` is the transaction hash when one was submitted, including a
/// reverted one, and the empty string otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    pub payer: String,
    #[serde(default)]
    pub transaction: String,
    pub network: String,
}

impl SettleResponse {
    pub fn success(payer: String, transaction: String, network: String) -> Self {
        Self {
            success: true,
            error_reason: None,
            payer,
            transaction,
            network,
        }
    }

    /// A rejection before anything was submitted.
    pub fn rejected(reason: ErrorReason, payer: String, network: String) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction: String::new(),
            network,
        }
    }

    /// A submitted transaction that did not succeed.
    pub fn failed(
        reason: ErrorReason,
        payer: String,
        transaction: String,
        network: String,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction,
            network,
        }
    }
}

/// Typed `{ x402Version, paymentPayload, paymentRequirements }` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<TPayload, TRequirements> {
    pub x402_version: X402Version1,
    pub payment_payload: TPayload,
    pub payment_requirements: TRequirements,
}

/// Settling uses the verify body unchanged.
pub type SettleRequest<TPayload, TRequirements> = VerifyRequest<TPayload, TRequirements>;

impl<TPayload, TRequirements> VerifyRequest<TPayload, TRequirements>
where
    Self: DeserializeOwned,
{
    pub fn from_proto(
        request: &proto::VerifyRequest,
    ) -> Result<Self, proto::PaymentVerificationError> {
        let deserialized: Self = serde_json::from_str(request.as_str())?;
        Ok(deserialized)
    }
}

/// Signed payment sent by the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TScheme = String, TPayload = serde_json::Value> {
    pub x402_version: X402Version1,
    pub scheme: TScheme,
    /// Network name, e.g. `base-sepolia`.
    pub network: String,
    pub payload: TPayload,
}

/// Terms under which the resource server accepts a payment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = serde_json::Value,
> {
    pub scheme: TScheme,
    pub network: String,
    /// Amount in the token's smallest unit.
    pub max_amount_required: TAmount,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub pay_to: TAddress,
    pub max_timeout_seconds: u64,
    /// Token contract.
    pub asset: TAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<TExtra>,
}
