//! The v1 "exact" scheme on EVM chains.
//!
//! A payment is an ERC-3009 `transferWithAuthorization` signed by the buyer.
//! Which overload settles it depends on who signed:
//!
//! - 65-byte signatures are treated as EOA signatures, split into `(v, r, s)`
//!   and sent to `transferWithAuthorization(..., uint8 v, bytes32 r, bytes32 s)`.
//! - Any other signature belongs to a contract wallet and is sent whole to
//!   `transferWithAuthorization(..., bytes signature)`, after unwrapping
//!   EIP-6492 if present.

use x402_types::scheme::X402SchemeId;

pub mod facilitator;
pub use facilitator::*;

pub mod signature;
pub use signature::WalletKind;

pub mod types;
pub use types::*;

use crate::chain::EIP155_NAMESPACE;

pub struct V1Eip155Exact;

impl X402SchemeId for V1Eip155Exact {
    fn x402_version(&self) -> u8 {
        1
    }
    fn namespace(&self) -> &str {
        EIP155_NAMESPACE
    }
    fn scheme(&self) -> &str {
        ExactScheme.as_ref()
    }
}
