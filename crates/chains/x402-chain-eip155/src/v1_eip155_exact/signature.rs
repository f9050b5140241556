//! Signature shapes the exact scheme accepts.
//!
//! The payload does not say what kind of wallet signed it. A 65-byte
//! signature is taken to come from an EOA; anything else from a contract
//! wallet, possibly counterfactual and wrapped per
//! [EIP-6492](https://eips.ethereum.org/EIPS/eip-6492).

use alloy_primitives::{Address, B256, Bytes, Signature, U256, hex};
use alloy_sol_types::SolType;

use crate::chain::contract::Sig6492;

/// Length of an `r || s || v` ECDSA signature.
pub const EOA_SIGNATURE_LENGTH: usize = 65;

/// Any signature ending with this is EIP-6492 wrapped. The preceding bytes
/// ABI-decode as `(address factory, bytes factoryCalldata, bytes innerSig)`.
pub const EIP6492_MAGIC_SUFFIX: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// Who produced a signature, inferred from its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletKind {
    Eoa,
    ContractWallet,
}

impl WalletKind {
    pub fn classify(signature: &[u8]) -> Self {
        if signature.len() == EOA_SIGNATURE_LENGTH {
            WalletKind::Eoa
        } else {
            WalletKind::ContractWallet
        }
    }

    /// Same as [`classify`](Self::classify) for a hex string, `0x` optional.
    pub fn classify_hex(signature: &str) -> Result<Self, SignatureFormatError> {
        let bytes = hex::decode(signature)?;
        Ok(Self::classify(&bytes))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureFormatError {
    #[error("Invalid signature hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Expected a {EOA_SIGNATURE_LENGTH}-byte signature, got {0} bytes")]
    InvalidLength(usize),
    #[error("Invalid recovery byte {0}")]
    InvalidRecoveryByte(u8),
    #[error("Malformed EIP-6492 signature: {0}")]
    InvalidEip6492(alloy_sol_types::Error),
    #[error(transparent)]
    Recovery(#[from] alloy_primitives::SignatureError),
}

/// An unwrapped EIP-6492 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip6492Signature {
    /// Factory that deploys the wallet.
    pub factory: Address,
    /// Call to make on the factory.
    pub factory_calldata: Bytes,
    /// What the wallet itself validates once deployed.
    pub inner: Bytes,
}

impl Eip6492Signature {
    /// Whether the wrapper says how to deploy the wallet.
    pub fn has_deployment(&self) -> bool {
        !self.factory.is_zero() && !self.factory_calldata.is_empty()
    }
}

/// Unwraps an EIP-6492 signature. `Ok(None)` when the magic suffix is absent.
pub fn parse_eip6492(signature: &[u8]) -> Result<Option<Eip6492Signature>, SignatureFormatError> {
    let Some(body) = signature.strip_suffix(&EIP6492_MAGIC_SUFFIX) else {
        return Ok(None);
    };
    let decoded =
        Sig6492::abi_decode_params(body).map_err(SignatureFormatError::InvalidEip6492)?;
    Ok(Some(Eip6492Signature {
        factory: decoded.factory,
        factory_calldata: decoded.factoryCalldata,
        inner: decoded.innerSig,
    }))
}

/// The bytes a contract wallet validates: the inner signature of an EIP-6492
/// wrapper, or the signature itself.
pub fn unwrap_contract_signature(signature: &Bytes) -> Result<Bytes, SignatureFormatError> {
    Ok(parse_eip6492(signature)?
        .map(|wrapped| wrapped.inner)
        .unwrap_or_else(|| signature.clone()))
}

/// Scalar components for the `(v, r, s)` overload of `transferWithAuthorization`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EoaSignatureParts {
    pub r: B256,
    pub s: B256,
    /// Recovery id, always 27 or 28.
    pub v: u8,
}

impl EoaSignatureParts {
    fn y_parity(&self) -> bool {
        self.v == 28
    }
}

/// Splits `r || s || v`.
///
/// A trailing 27 or 28 is the recovery id. A trailing 0 or 1 is a parity
/// bit and becomes `27 + parity`. Anything else is rejected.
pub fn decompose_eoa_signature(signature: &[u8]) -> Result<EoaSignatureParts, SignatureFormatError> {
    if signature.len() != EOA_SIGNATURE_LENGTH {
        return Err(SignatureFormatError::InvalidLength(signature.len()));
    }
    let r = B256::from_slice(&signature[..32]);
    let s = B256::from_slice(&signature[32..64]);
    let v = match signature[64] {
        v @ (27 | 28) => v,
        parity @ (0 | 1) => 27 + parity,
        other => return Err(SignatureFormatError::InvalidRecoveryByte(other)),
    };
    Ok(EoaSignatureParts { r, s, v })
}

/// Recovers the address that produced an EOA signature over `hash`.
pub fn recover_eoa_signer(signature: &[u8], hash: &B256) -> Result<Address, SignatureFormatError> {
    let parts = decompose_eoa_signature(signature)?;
    let signature = Signature::new(
        U256::from_be_bytes(parts.r.0),
        U256::from_be_bytes(parts.s.0),
        parts.y_parity(),
    );
    let signer = signature.recover_address_from_prehash(hash)?;
    Ok(signer)
}
