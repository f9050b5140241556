//! Solidity interfaces the exact scheme talks to.

use alloy_primitives::{Address, address};
use alloy_sol_types::sol;

sol! {
    /// ERC-3009 token surface used for verification and settlement.
    ///
    /// Overload order matters: the `bytes signature` variant is `_0`, the
    /// `(v, r, s)` variant is `_1`.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEIP3009 {
        function name() external view returns (string);
        function version() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}

sol! {
    /// EIP-6492 universal signature validator.
    ///
    /// `isValidSig` covers deployed EIP-1271 wallets, counterfactual wallets
    /// wrapped per EIP-6492, and plain ECDSA signatures.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface Validator6492 {
        function isValidSig(address signer, bytes32 hash, bytes calldata signature) external returns (bool);
        error ERC1271Revert(bytes error);
        error ERC6492DeployFailed(bytes error);
    }
}

sol! {
    /// ABI layout of an EIP-6492 signature body, before the magic suffix.
    #[derive(Debug, PartialEq, Eq)]
    struct Sig6492 {
        address factory;
        bytes   factoryCalldata;
        bytes   innerSig;
    }
}

/// Where the universal validator is deployed. Same address on every chain.
pub const VALIDATOR_ADDRESS: Address = address!("0xdAcD51A54883eb67D95FAEb2BBfdC4a9a6BD2a3B");
