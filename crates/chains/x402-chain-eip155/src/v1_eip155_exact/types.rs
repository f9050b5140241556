//! Wire types of the v1 EIP-155 "exact" scheme.
//!
//! The `scheme` fields stay plain strings so that a request naming another
//! scheme still deserializes and is answered with `unsupported_scheme`.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};
use x402_types::lit_str;
use x402_types::proto::v1;

use crate::chain::{TokenAmount, decimal_u256};

lit_str!(ExactScheme, "exact");

pub type VerifyRequest = v1::VerifyRequest<PaymentPayload, PaymentRequirements>;
pub type SettleRequest = VerifyRequest;
pub type PaymentPayload = v1::PaymentPayload<String, ExactEvmPayload>;
pub type PaymentRequirements =
    v1::PaymentRequirements<String, TokenAmount, Address, PaymentRequirementsExtra>;

/// Signature plus the ERC-3009 authorization it signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: Bytes,
    pub authorization: ExactEvmPayloadAuthorization,
}

/// Who may move how much, and when.
///
/// Amounts and timestamps are decimal strings on the wire and 256-bit here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal_u256")]
    pub value: U256,
    #[serde(with = "decimal_u256")]
    pub valid_after: U256,
    #[serde(with = "decimal_u256")]
    pub valid_before: U256,
    pub nonce: B256,
}

/// EIP-712 domain hints of the token. Missing parts are read from the token.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

sol!(
    /// The EIP-712 message an ERC-3009 authorization signs.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

impl From<&ExactEvmPayloadAuthorization> for TransferWithAuthorization {
    fn from(authorization: &ExactEvmPayloadAuthorization) -> Self {
        Self {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value,
            validAfter: authorization.valid_after,
            validBefore: authorization.valid_before,
            nonce: authorization.nonce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    fn request_json() -> serde_json::Value {
        json!({
            "x402Version": 1,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "base-sepolia",
                "payload": {
                    "signature": "0x2d6a7588d6acca505cbf0d9a4a227e0c52c6c34008c8e8986a1283259764173608a2ce6496642e377d6da8dbbf5836e9bd15092f9ecab05ded3d6293af148b571c",
                    "authorization": {
                        "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
                        "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                        "value": "10000",
                        "validAfter": "1740672089",
                        "validBefore": "1740672154",
                        "nonce": "0xf3746613c2d920b5fdabc0856f2aeb2d4f88ee6037b8cc5d04a71a4462f13480"
                    }
                }
            },
            "paymentRequirements": {
                "scheme": "exact",
                "network": "base-sepolia",
                "maxAmountRequired": "10000",
                "resource": "https://api.example.com/premium",
                "description": "Premium content",
                "mimeType": "application/json",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 60,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                "extra": { "name": "USDC", "version": "2" }
            }
        })
    }

    #[test]
    fn test_deserialize_verify_request() {
        let request: VerifyRequest = serde_json::from_value(request_json()).unwrap();
        let authorization = &request.payment_payload.payload.authorization;
        assert_eq!(
            authorization.from,
            address!("0x857b06519E91e3A54538791bDbb0E22373e36b66")
        );
        assert_eq!(authorization.value, U256::from(10_000u64));
        assert_eq!(authorization.valid_before, U256::from(1_740_672_154u64));
        assert_eq!(request.payment_payload.payload.signature.len(), 65);
        let requirements = &request.payment_requirements;
        assert_eq!(requirements.max_amount_required, TokenAmount::from(10_000u64));
        assert_eq!(
            requirements.extra,
            Some(PaymentRequirementsExtra {
                name: Some("USDC".into()),
                version: Some("2".into()),
            })
        );
    }

    #[test]
    fn test_foreign_scheme_still_deserializes() {
        let mut value = request_json();
        value["paymentRequirements"]["scheme"] = json!("upto");
        let request: VerifyRequest = serde_json::from_value(value).unwrap();
        assert_eq!(request.payment_requirements.scheme, "upto");
    }

    #[test]
    fn test_timestamps_wider_than_u64() {
        let mut value = request_json();
        let huge = (U256::from(u64::MAX) + U256::from(1u8)).to_string();
        value["paymentPayload"]["payload"]["authorization"]["validBefore"] = json!(huge);
        let request: VerifyRequest = serde_json::from_value(value).unwrap();
        assert!(request.payment_payload.payload.authorization.valid_before > U256::from(u64::MAX));
    }

    #[test]
    fn test_empty_required_amount_is_malformed() {
        let mut value = request_json();
        value["paymentRequirements"]["maxAmountRequired"] = json!("");
        assert!(serde_json::from_value::<VerifyRequest>(value).is_err());
    }

    #[test]
    fn test_decimal_fields_reject_separators() {
        let mut value = request_json();
        value["paymentPayload"]["payload"]["authorization"]["validBefore"] = json!("1_740_672_154");
        assert!(serde_json::from_value::<VerifyRequest>(value).is_err());

        let mut value = request_json();
        value["paymentPayload"]["payload"]["authorization"]["value"] = json!("");
        assert!(serde_json::from_value::<VerifyRequest>(value).is_err());
    }

    #[test]
    fn test_extra_may_be_partial() {
        let extra: PaymentRequirementsExtra = serde_json::from_value(json!({ "name": "USDC" })).unwrap();
        assert_eq!(extra.name.as_deref(), Some("USDC"));
        assert_eq!(extra.version, None);
    }
}
