//! Verification and settlement of exact EVM payments.
//!
//! Both entry points share [`V1Eip155ExactFacilitator::assert_valid_payment`],
//! so a settlement always re-runs every verification check first.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::{Eip712Domain, SolCall, SolStruct, eip712_domain};
use std::collections::HashMap;
use tracing::{Level, instrument};
use x402_types::chain::ChainProviderOps;
use x402_types::networks::chain_id_by_network_name;
use x402_types::proto;
use x402_types::proto::{AsErrorReason, ErrorReason, PaymentVerificationError, v1};
use x402_types::scheme::{
    X402SchemeFacilitator, X402SchemeFacilitatorBuilder, X402SchemeFacilitatorError,
};
use x402_types::timestamp::{Clock, SystemClock};

use crate::chain::contract::IEIP3009;
use crate::chain::{
    Eip155ChainError, Eip155ChainReader, Eip155ChainWriter, Eip155SignatureVerifier,
    MetaTransaction, TransactionStatus,
};
use crate::v1_eip155_exact::signature::{
    SignatureFormatError, WalletKind, decompose_eoa_signature, parse_eip6492, recover_eoa_signer,
    unwrap_contract_signature,
};
use crate::v1_eip155_exact::types::{
    ExactEvmPayloadAuthorization, ExactScheme, PaymentPayload, PaymentRequirements,
    PaymentRequirementsExtra, SettleRequest, TransferWithAuthorization, VerifyRequest,
};
use crate::v1_eip155_exact::V1Eip155Exact;

/// An authorization deadline has to be at least this far in the future.
const VALID_BEFORE_GRACE_SECS: u64 = 6;

/// Blocks to wait for on settlement.
const SETTLEMENT_CONFIRMATIONS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum Eip155ExactError {
    #[error(transparent)]
    PaymentVerification(#[from] PaymentVerificationError),
    #[error(transparent)]
    Chain(#[from] Eip155ChainError),
}

impl From<SignatureFormatError> for Eip155ExactError {
    fn from(e: SignatureFormatError) -> Self {
        Self::PaymentVerification(PaymentVerificationError::InvalidSignature(e.to_string()))
    }
}

impl From<Eip155ChainError> for X402SchemeFacilitatorError {
    fn from(e: Eip155ChainError) -> Self {
        Self::OnchainFailure(e.to_string())
    }
}

/// A payment that passed every check.
#[derive(Debug, Clone)]
pub struct ExactEvmPayment {
    pub authorization: ExactEvmPayloadAuthorization,
    /// As received, possibly EIP-6492 wrapped.
    pub signature: Bytes,
    pub wallet_kind: WalletKind,
    /// The signer is a contract wallet that is not deployed yet, but its
    /// signature says how to deploy it.
    pub counterfactual: bool,
}

/// The exact scheme on one EVM chain.
///
/// Generic over the chain seams so it runs against an in-memory chain in
/// tests, and over the [`Clock`] so time can be pinned.
pub struct V1Eip155ExactFacilitator<P, C = SystemClock> {
    provider: P,
    clock: C,
}

pub type ExactEvmFacilitator<P, C = SystemClock> = V1Eip155ExactFacilitator<P, C>;

impl<P> V1Eip155ExactFacilitator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            clock: SystemClock,
        }
    }
}

impl<P, C> V1Eip155ExactFacilitator<P, C> {
    pub fn with_clock(provider: P, clock: C) -> Self {
        Self { provider, clock }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P, C> V1Eip155ExactFacilitator<P, C>
where
    P: Eip155ChainReader + Eip155SignatureVerifier + Eip155ChainWriter + Send + Sync,
    C: Clock,
{
    /// Checks a payment without touching chain state.
    ///
    /// Rejections come back as [`v1::VerifyResponse::Invalid`]. Only failures
    /// to talk to the chain are errors.
    pub async fn verify(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<v1::VerifyResponse, Eip155ChainError> {
        let payer = payload.payload.authorization.from.to_string();
        match self.assert_valid_payment(requirements, payload).await {
            Ok(_) => Ok(v1::VerifyResponse::valid(payer)),
            Err(Eip155ExactError::PaymentVerification(e)) => {
                tracing::debug!(payer = %payer, error = %e, "Payment rejected");
                Ok(v1::VerifyResponse::invalid(payer, e.as_error_reason()))
            }
            Err(Eip155ExactError::Chain(e)) => Err(e),
        }
    }

    /// Re-verifies the payment, then submits it and waits for the receipt.
    ///
    /// Counterfactual wallets pass verification but are not deployed here.
    /// Whoever wants to settle for one has to deploy it first.
    pub async fn settle(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<v1::SettleResponse, Eip155ChainError> {
        let payer = payload.payload.authorization.from.to_string();
        let network = payload.network.clone();
        let payment = match self.assert_valid_payment(requirements, payload).await {
            Ok(payment) => payment,
            Err(Eip155ExactError::PaymentVerification(e)) => {
                tracing::debug!(payer = %payer, error = %e, "Settlement rejected");
                return Ok(v1::SettleResponse::rejected(
                    e.as_error_reason(),
                    payer,
                    network,
                ));
            }
            Err(Eip155ExactError::Chain(e)) => return Err(e),
        };

        if payment.counterfactual {
            return Ok(v1::SettleResponse::rejected(
                ErrorReason::InvalidExactEvmPayloadUndeployedSmartWallet,
                payer,
                network,
            ));
        }

        let calldata = match transfer_calldata(&payment) {
            Ok(calldata) => calldata,
            Err(e) => {
                tracing::debug!(payer = %payer, error = %e, "Settlement rejected");
                return Ok(v1::SettleResponse::rejected(
                    ErrorReason::InvalidExactEvmPayloadSignature,
                    payer,
                    network,
                ));
            }
        };

        let tx_hash = self
            .provider
            .submit_transaction(MetaTransaction {
                to: requirements.asset,
                calldata,
                confirmations: SETTLEMENT_CONFIRMATIONS,
            })
            .await?;

        match self.provider.wait_for_receipt(tx_hash).await? {
            TransactionStatus::Success => {
                tracing::event!(Level::INFO,
                    status = "ok",
                    tx = %tx_hash,
                    payer = %payer,
                    network = %network,
                    "transferWithAuthorization succeeded"
                );
                Ok(v1::SettleResponse::success(
                    payer,
                    tx_hash.to_string(),
                    network,
                ))
            }
            TransactionStatus::Reverted => {
                tracing::event!(Level::WARN,
                    status = "failed",
                    tx = %tx_hash,
                    payer = %payer,
                    network = %network,
                    "transferWithAuthorization reverted"
                );
                Ok(v1::SettleResponse::failed(
                    ErrorReason::InvalidTransactionState,
                    payer,
                    tx_hash.to_string(),
                    network,
                ))
            }
        }
    }

    /// The ordered checks shared by verify and settle. The first failing one wins.
    #[instrument(skip_all, err, fields(payer = %payload.payload.authorization.from))]
    pub async fn assert_valid_payment(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<ExactEvmPayment, Eip155ExactError> {
        let authorization = &payload.payload.authorization;
        let signature = &payload.payload.signature;
        let wallet_kind = WalletKind::classify(signature);

        if requirements.scheme != ExactScheme::VALUE || payload.scheme != ExactScheme::VALUE {
            return Err(PaymentVerificationError::UnsupportedScheme.into());
        }

        self.assert_network(&payload.network)?;
        self.assert_network(&requirements.network)?;
        let domain = self.assert_domain(requirements).await?;

        self.assert_signature(authorization, signature, wallet_kind, &domain)
            .await?;

        if authorization.to != requirements.pay_to {
            return Err(PaymentVerificationError::RecipientMismatch.into());
        }

        assert_time(self.clock.now().as_secs(), authorization)?;

        let max_amount_required = requirements.max_amount_required.inner();
        let balance = self
            .provider
            .token_balance(requirements.asset, authorization.from)
            .await?;
        if balance < max_amount_required {
            return Err(PaymentVerificationError::InsufficientFunds.into());
        }

        if authorization.value < max_amount_required {
            return Err(PaymentVerificationError::InvalidPaymentAmount.into());
        }

        let counterfactual = match wallet_kind {
            WalletKind::Eoa => false,
            WalletKind::ContractWallet => self.assert_deployable(authorization, signature).await?,
        };

        Ok(ExactEvmPayment {
            authorization: *authorization,
            signature: signature.clone(),
            wallet_kind,
            counterfactual,
        })
    }

    fn assert_network(&self, network: &str) -> Result<(), PaymentVerificationError> {
        let chain_id = self.provider.chain().as_chain_id();
        match chain_id_by_network_name(network) {
            Some(requested) if requested == &chain_id => Ok(()),
            Some(requested) => Err(PaymentVerificationError::InvalidNetwork(format!(
                "Network {network} ({requested}) is not served by chain {chain_id}"
            ))),
            None => Err(PaymentVerificationError::InvalidNetwork(format!(
                "Unknown network {network}"
            ))),
        }
    }

    /// EIP-712 domain of the token. `extra` wins; whatever it lacks is read
    /// from the token.
    async fn assert_domain(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<Eip712Domain, Eip155ExactError> {
        let asset = requirements.asset;
        let PaymentRequirementsExtra { name, version } =
            requirements.extra.clone().unwrap_or_default();
        let (name, version) = match (name, version) {
            (Some(name), Some(version)) => (name, version),
            (name, version) => {
                let Some(onchain) = self.provider.token_eip712_domain(asset).await? else {
                    return Err(PaymentVerificationError::InvalidNetwork(format!(
                        "Token {asset} does not expose an EIP-712 domain"
                    ))
                    .into());
                };
                (
                    name.unwrap_or(onchain.name),
                    version.unwrap_or(onchain.version),
                )
            }
        };
        let domain = eip712_domain! {
            name: name,
            version: version,
            chain_id: self.provider.chain().inner(),
            verifying_contract: asset,
        };
        Ok(domain)
    }

    async fn assert_signature(
        &self,
        authorization: &ExactEvmPayloadAuthorization,
        signature: &Bytes,
        wallet_kind: WalletKind,
        domain: &Eip712Domain,
    ) -> Result<(), Eip155ExactError> {
        let hash = TransferWithAuthorization::from(authorization).eip712_signing_hash(domain);
        let is_valid = match wallet_kind {
            WalletKind::Eoa => recover_eoa_signer(signature, &hash)? == authorization.from,
            WalletKind::ContractWallet => {
                self.provider
                    .is_valid_signature(authorization.from, hash, signature.clone())
                    .await?
            }
        };
        if is_valid {
            Ok(())
        } else {
            Err(PaymentVerificationError::InvalidSignature(format!(
                "Signature does not match signer {}",
                authorization.from
            ))
            .into())
        }
    }

    /// Returns whether the wallet is counterfactual.
    async fn assert_deployable(
        &self,
        authorization: &ExactEvmPayloadAuthorization,
        signature: &Bytes,
    ) -> Result<bool, Eip155ExactError> {
        let code = self.provider.code_at(authorization.from).await?;
        if !code.is_empty() {
            return Ok(false);
        }
        match parse_eip6492(signature)? {
            Some(wrapped) if wrapped.has_deployment() => Ok(true),
            _ => Err(PaymentVerificationError::UndeployedSmartWallet.into()),
        }
    }
}

fn assert_time(
    now: u64,
    authorization: &ExactEvmPayloadAuthorization,
) -> Result<(), PaymentVerificationError> {
    let now = U256::from(now);
    if authorization.valid_before < now + U256::from(VALID_BEFORE_GRACE_SECS) {
        return Err(PaymentVerificationError::Expired);
    }
    if authorization.valid_after > now {
        return Err(PaymentVerificationError::Early);
    }
    Ok(())
}

/// Encodes the `transferWithAuthorization` overload matching the wallet kind.
fn transfer_calldata(payment: &ExactEvmPayment) -> Result<Bytes, SignatureFormatError> {
    let authorization = &payment.authorization;
    let calldata = match payment.wallet_kind {
        WalletKind::ContractWallet => {
            let signature = unwrap_contract_signature(&payment.signature)?;
            IEIP3009::transferWithAuthorization_0Call {
                from: authorization.from,
                to: authorization.to,
                value: authorization.value,
                validAfter: authorization.valid_after,
                validBefore: authorization.valid_before,
                nonce: authorization.nonce,
                signature,
            }
            .abi_encode()
        }
        WalletKind::Eoa => {
            let parts = decompose_eoa_signature(&payment.signature)?;
            IEIP3009::transferWithAuthorization_1Call {
                from: authorization.from,
                to: authorization.to,
                value: authorization.value,
                validAfter: authorization.valid_after,
                validBefore: authorization.valid_before,
                nonce: authorization.nonce,
                v: parts.v,
                r: parts.r,
                s: parts.s,
            }
            .abi_encode()
        }
    };
    Ok(calldata.into())
}

#[async_trait::async_trait]
impl<P, C> X402SchemeFacilitator for V1Eip155ExactFacilitator<P, C>
where
    P: Eip155ChainReader
        + Eip155SignatureVerifier
        + Eip155ChainWriter
        + ChainProviderOps
        + Send
        + Sync,
    C: Clock,
{
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v1::VerifyResponse, X402SchemeFacilitatorError> {
        let request = VerifyRequest::from_proto(request)?;
        let response = V1Eip155ExactFacilitator::verify(
            self,
            &request.payment_requirements,
            &request.payment_payload,
        )
        .await?;
        Ok(response)
    }

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v1::SettleResponse, X402SchemeFacilitatorError> {
        let request = SettleRequest::from_proto(request)?;
        let response = V1Eip155ExactFacilitator::settle(
            self,
            &request.payment_requirements,
            &request.payment_payload,
        )
        .await?;
        Ok(response)
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError> {
        let chain_id = self.provider.chain_id();
        let kinds = chain_id
            .as_network_name()
            .map(|network| proto::SupportedPaymentKind {
                x402_version: v1::X402Version1.into(),
                scheme: ExactScheme.to_string(),
                network: network.to_string(),
                extra: None,
            })
            .into_iter()
            .collect();
        let mut signers = HashMap::with_capacity(1);
        signers.insert(chain_id, self.provider.signer_addresses());
        Ok(proto::SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        })
    }
}

impl<P> X402SchemeFacilitatorBuilder<P> for V1Eip155Exact
where
    P: Eip155ChainReader
        + Eip155SignatureVerifier
        + Eip155ChainWriter
        + ChainProviderOps
        + Send
        + Sync
        + 'static,
{
    fn build(
        &self,
        provider: P,
        _config: Option<serde_json::Value>,
    ) -> Result<Box<dyn X402SchemeFacilitator>, Box<dyn std::error::Error>> {
        Ok(Box::new(V1Eip155ExactFacilitator::new(provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, TxHash, address};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use alloy_sol_types::SolValue;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use x402_types::chain::ChainId;
    use x402_types::timestamp::{FixedClock, UnixTimestamp};

    use crate::chain::contract::Sig6492;
    use crate::chain::{Eip155ChainReference, TokenAmount, TokenDomain};
    use crate::v1_eip155_exact::signature::EIP6492_MAGIC_SUFFIX;
    use crate::v1_eip155_exact::types::ExactEvmPayload;

    const NOW: u64 = 1_700_000_000;
    const ASSET: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
    const PAY_TO: Address = address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C");
    const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const OTHER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const SMART_WALLET: Address = address!("0x1111111111111111111111111111111111111111");
    const TX_HASH: TxHash = TxHash::repeat_byte(0xaa);

    struct MockChain {
        domain: Option<TokenDomain>,
        balance: U256,
        code: Mutex<Bytes>,
        contract_signature_valid: bool,
        receipt: TransactionStatus,
        submitted: Mutex<Vec<MetaTransaction>>,
        domain_reads: AtomicUsize,
    }

    impl Default for MockChain {
        fn default() -> Self {
            Self {
                domain: None,
                balance: U256::from(1_000_000u64),
                code: Mutex::new(Bytes::new()),
                contract_signature_valid: true,
                receipt: TransactionStatus::Success,
                submitted: Mutex::new(Vec::new()),
                domain_reads: AtomicUsize::new(0),
            }
        }
    }

    impl MockChain {
        fn submitted(&self) -> Vec<MetaTransaction> {
            self.submitted.lock().unwrap().clone()
        }

        fn deploy(&self) {
            *self.code.lock().unwrap() = Bytes::from_static(&[0x60, 0x80]);
        }
    }

    impl Eip155ChainReader for MockChain {
        fn chain(&self) -> Eip155ChainReference {
            Eip155ChainReference::new(84532)
        }

        async fn token_eip712_domain(
            &self,
            _asset: Address,
        ) -> Result<Option<TokenDomain>, Eip155ChainError> {
            self.domain_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.domain.clone())
        }

        async fn token_balance(
            &self,
            _asset: Address,
            _owner: Address,
        ) -> Result<U256, Eip155ChainError> {
            Ok(self.balance)
        }

        async fn code_at(&self, _address: Address) -> Result<Bytes, Eip155ChainError> {
            Ok(self.code.lock().unwrap().clone())
        }
    }

    impl Eip155SignatureVerifier for MockChain {
        async fn is_valid_signature(
            &self,
            _signer: Address,
            _hash: B256,
            _signature: Bytes,
        ) -> Result<bool, Eip155ChainError> {
            Ok(self.contract_signature_valid)
        }
    }

    impl Eip155ChainWriter for MockChain {
        async fn submit_transaction(
            &self,
            tx: MetaTransaction,
        ) -> Result<TxHash, Eip155ChainError> {
            self.submitted.lock().unwrap().push(tx);
            Ok(TX_HASH)
        }

        async fn wait_for_receipt(
            &self,
            _tx_hash: TxHash,
        ) -> Result<TransactionStatus, Eip155ChainError> {
            Ok(self.receipt)
        }
    }

    impl ChainProviderOps for MockChain {
        fn signer_addresses(&self) -> Vec<String> {
            vec!["0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string()]
        }

        fn chain_id(&self) -> ChainId {
            self.chain().as_chain_id()
        }
    }

    fn facilitator(chain: MockChain) -> V1Eip155ExactFacilitator<MockChain, FixedClock> {
        V1Eip155ExactFacilitator::with_clock(chain, FixedClock(UnixTimestamp::from_secs(NOW)))
    }

    fn signer(key: &str) -> PrivateKeySigner {
        key.parse().unwrap()
    }

    fn usdc_domain() -> Eip712Domain {
        eip712_domain! {
            name: "USDC",
            version: "2",
            chain_id: 84532,
            verifying_contract: ASSET,
        }
    }

    fn authorization(from: Address) -> ExactEvmPayloadAuthorization {
        ExactEvmPayloadAuthorization {
            from,
            to: PAY_TO,
            value: U256::from(10_000u64),
            valid_after: U256::from(NOW - 60),
            valid_before: U256::from(NOW + 300),
            nonce: B256::repeat_byte(0x42),
        }
    }

    fn sign(key: &str, authorization: &ExactEvmPayloadAuthorization) -> Bytes {
        let hash = TransferWithAuthorization::from(authorization).eip712_signing_hash(&usdc_domain());
        let signature = signer(key).sign_hash_sync(&hash).unwrap();
        Bytes::copy_from_slice(&signature.as_bytes())
    }

    fn payload(authorization: ExactEvmPayloadAuthorization, signature: Bytes) -> PaymentPayload {
        PaymentPayload {
            x402_version: v1::X402Version1,
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            payload: ExactEvmPayload {
                signature,
                authorization,
            },
        }
    }

    fn eoa_payload() -> PaymentPayload {
        let authorization = authorization(signer(PAYER_KEY).address());
        let signature = sign(PAYER_KEY, &authorization);
        payload(authorization, signature)
    }

    fn eoa_payload_with(edit: impl FnOnce(&mut ExactEvmPayloadAuthorization)) -> PaymentPayload {
        let mut authorization = authorization(signer(PAYER_KEY).address());
        edit(&mut authorization);
        let signature = sign(PAYER_KEY, &authorization);
        payload(authorization, signature)
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            max_amount_required: TokenAmount::from(10_000u64),
            resource: "https://api.example.com/premium".to_string(),
            description: "Premium content".to_string(),
            mime_type: "application/json".to_string(),
            output_schema: None,
            pay_to: PAY_TO,
            max_timeout_seconds: 60,
            asset: ASSET,
            extra: Some(PaymentRequirementsExtra {
                name: Some("USDC".to_string()),
                version: Some("2".to_string()),
            }),
        }
    }

    fn wrap_6492(factory: Address, calldata: &[u8], inner: &[u8]) -> Bytes {
        let mut wrapped = Sig6492 {
            factory,
            factoryCalldata: Bytes::copy_from_slice(calldata),
            innerSig: Bytes::copy_from_slice(inner),
        }
        .abi_encode_params();
        wrapped.extend_from_slice(&EIP6492_MAGIC_SUFFIX);
        wrapped.into()
    }

    fn counterfactual_payload() -> PaymentPayload {
        let factory = address!("0x4e59b44847b379578588920cA78FbF26c0B4956C");
        let signature = wrap_6492(factory, &[0xca, 0xfe], &[9u8; 130]);
        payload(authorization(SMART_WALLET), signature)
    }

    fn reason(response: &v1::VerifyResponse) -> Option<ErrorReason> {
        response.invalid_reason()
    }

    fn chain_deployed(facilitator: &V1Eip155ExactFacilitator<MockChain, FixedClock>) {
        facilitator.provider().deploy();
    }

    #[tokio::test]
    async fn test_verify_valid_eoa_payment() {
        let facilitator = facilitator(MockChain::default());
        let payload = eoa_payload();
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert!(response.is_valid());
        assert_eq!(response.payer(), signer(PAYER_KEY).address().to_string());
        assert_eq!(facilitator.provider().domain_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_verify_scheme_mismatch() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = requirements();
        requirements.scheme = "upto".to_string();
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert_eq!(reason(&response), Some(ErrorReason::UnsupportedScheme));

        let mut payload = eoa_payload();
        payload.scheme = "upto".to_string();
        // Scheme is checked before anything else, even an expired deadline.
        payload.payload.authorization.valid_before = U256::ZERO;
        let response = facilitator.verify(&self::requirements(), &payload).await.unwrap();
        assert_eq!(reason(&response), Some(ErrorReason::UnsupportedScheme));
    }

    #[tokio::test]
    async fn test_verify_unknown_or_foreign_network() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = requirements();
        requirements.network = "atlantis".to_string();
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert_eq!(reason(&response), Some(ErrorReason::InvalidNetwork));

        let mut payload = eoa_payload();
        payload.network = "base".to_string();
        let response = facilitator.verify(&self::requirements(), &payload).await.unwrap();
        assert_eq!(reason(&response), Some(ErrorReason::InvalidNetwork));
    }

    #[tokio::test]
    async fn test_verify_reads_domain_when_extra_is_missing() {
        let chain = MockChain {
            domain: Some(TokenDomain {
                name: "USDC".to_string(),
                version: "2".to_string(),
            }),
            ..MockChain::default()
        };
        let facilitator = facilitator(chain);
        let mut requirements = requirements();
        requirements.extra = None;
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert!(response.is_valid());
        assert_eq!(facilitator.provider().domain_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verify_unreadable_domain_is_invalid_network() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = requirements();
        requirements.extra = Some(PaymentRequirementsExtra {
            name: Some("USDC".to_string()),
            version: None,
        });
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert_eq!(reason(&response), Some(ErrorReason::InvalidNetwork));
    }

    #[tokio::test]
    async fn test_verify_signature_from_someone_else() {
        let facilitator = facilitator(MockChain::default());
        let authorization = authorization(signer(PAYER_KEY).address());
        let signature = sign(OTHER_KEY, &authorization);
        let response = facilitator
            .verify(&requirements(), &payload(authorization, signature))
            .await
            .unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadSignature)
        );
    }

    #[tokio::test]
    async fn test_verify_signature_over_other_domain() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = requirements();
        requirements.extra = Some(PaymentRequirementsExtra {
            name: Some("USD Coin".to_string()),
            version: Some("2".to_string()),
        });
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadSignature)
        );
    }

    #[tokio::test]
    async fn test_verify_rejected_contract_signature() {
        let chain = MockChain {
            contract_signature_valid: false,
            ..MockChain::default()
        };
        let facilitator = facilitator(chain);
        chain_deployed(&facilitator);
        let payload = payload(authorization(SMART_WALLET), Bytes::from(vec![5u8; 100]));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadSignature)
        );
    }

    #[tokio::test]
    async fn test_verify_recipient_mismatch() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = requirements();
        requirements.pay_to = address!("0x3333333333333333333333333333333333333333");
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadRecipientMismatch)
        );
        assert_eq!(response.payer(), signer(PAYER_KEY).address().to_string());
    }

    #[tokio::test]
    async fn test_verify_recipient_ignores_casing() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = requirements();
        requirements.pay_to = serde_json::from_value(json!(
            "0x209693bc6afc0c5328ba36faf03c514ef312287c"
        ))
        .unwrap();
        let response = facilitator.verify(&requirements, &eoa_payload()).await.unwrap();
        assert!(response.is_valid());
    }

    #[tokio::test]
    async fn test_verify_valid_before_boundary() {
        let facilitator = facilitator(MockChain::default());
        let payload = eoa_payload_with(|a| a.valid_before = U256::from(NOW + 6));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert!(response.is_valid());

        let payload = eoa_payload_with(|a| a.valid_before = U256::from(NOW + 5));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadAuthorizationValidBefore)
        );
    }

    #[tokio::test]
    async fn test_verify_expired_wins_over_other_failures() {
        let chain = MockChain {
            balance: U256::ZERO,
            ..MockChain::default()
        };
        let facilitator = facilitator(chain);
        let payload = eoa_payload_with(|a| {
            a.valid_before = U256::from(NOW - 1);
            a.value = U256::from(1u8);
        });
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadAuthorizationValidBefore)
        );
    }

    #[tokio::test]
    async fn test_verify_valid_after_boundary() {
        let facilitator = facilitator(MockChain::default());
        let payload = eoa_payload_with(|a| a.valid_after = U256::from(NOW));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert!(response.is_valid());

        let payload = eoa_payload_with(|a| a.valid_after = U256::from(NOW + 1));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadAuthorizationValidAfter)
        );
    }

    #[tokio::test]
    async fn test_verify_insufficient_funds() {
        let chain = MockChain {
            balance: U256::from(9_999u64),
            ..MockChain::default()
        };
        let facilitator = facilitator(chain);
        let payload = eoa_payload_with(|a| a.value = U256::from(50_000u64));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(reason(&response), Some(ErrorReason::InsufficientFunds));
    }

    #[tokio::test]
    async fn test_verify_value_below_required() {
        let facilitator = facilitator(MockChain::default());
        let payload = eoa_payload_with(|a| a.value = U256::from(9_999u64));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadAuthorizationValue)
        );
    }

    #[tokio::test]
    async fn test_verify_amounts_beyond_u64() {
        let huge = U256::from(u64::MAX) * U256::from(1_000u64);
        let chain = MockChain {
            balance: huge,
            ..MockChain::default()
        };
        let facilitator = facilitator(chain);
        let mut requirements = requirements();
        requirements.max_amount_required = TokenAmount(huge);
        let payload = eoa_payload_with(|a| a.value = huge);
        let response = facilitator.verify(&requirements, &payload).await.unwrap();
        assert!(response.is_valid());

        let payload = eoa_payload_with(|a| a.value = huge - U256::from(1u8));
        let response = facilitator.verify(&requirements, &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadAuthorizationValue)
        );
    }

    #[tokio::test]
    async fn test_verify_deployed_contract_wallet() {
        let facilitator = facilitator(MockChain::default());
        chain_deployed(&facilitator);
        let payload = payload(authorization(SMART_WALLET), Bytes::from(vec![5u8; 100]));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert!(response.is_valid());
        assert_eq!(response.payer(), SMART_WALLET.to_string());
    }

    #[tokio::test]
    async fn test_undeployed_wallet_without_deployment_data() {
        let facilitator = facilitator(MockChain::default());
        let payload = payload(authorization(SMART_WALLET), Bytes::from(vec![5u8; 100]));
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadUndeployedSmartWallet)
        );

        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(!settled.success);
        assert_eq!(
            settled.error_reason,
            Some(ErrorReason::InvalidExactEvmPayloadUndeployedSmartWallet)
        );
        assert!(facilitator.provider().submitted().is_empty());
    }

    #[tokio::test]
    async fn test_undeployed_wallet_with_zero_factory() {
        let facilitator = facilitator(MockChain::default());
        let signature = wrap_6492(Address::ZERO, &[0xca, 0xfe], &[9u8; 130]);
        let payload = payload(authorization(SMART_WALLET), signature);
        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert_eq!(
            reason(&response),
            Some(ErrorReason::InvalidExactEvmPayloadUndeployedSmartWallet)
        );
    }

    #[tokio::test]
    async fn test_counterfactual_wallet_verifies_but_settles_only_once_deployed() {
        let facilitator = facilitator(MockChain::default());
        let payload = counterfactual_payload();

        let response = facilitator.verify(&requirements(), &payload).await.unwrap();
        assert!(response.is_valid());

        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(!settled.success);
        assert_eq!(
            settled.error_reason,
            Some(ErrorReason::InvalidExactEvmPayloadUndeployedSmartWallet)
        );
        assert_eq!(settled.transaction, "");
        assert!(facilitator.provider().submitted().is_empty());

        chain_deployed(&facilitator);
        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(settled.success);
        let submitted = facilitator.provider().submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].to, ASSET);
        let call =
            IEIP3009::transferWithAuthorization_0Call::abi_decode(&submitted[0].calldata).unwrap();
        assert_eq!(call.from, SMART_WALLET);
        assert_eq!(call.signature.as_ref(), &[9u8; 130]);
    }

    #[tokio::test]
    async fn test_settle_contract_wallet_passes_raw_signature() {
        let facilitator = facilitator(MockChain::default());
        chain_deployed(&facilitator);
        let signature = Bytes::from(vec![5u8; 100]);
        let payload = payload(authorization(SMART_WALLET), signature.clone());
        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(settled.success);
        let submitted = facilitator.provider().submitted();
        let call =
            IEIP3009::transferWithAuthorization_0Call::abi_decode(&submitted[0].calldata).unwrap();
        assert_eq!(call.signature, signature);
        assert_eq!(call.value, U256::from(10_000u64));
        assert_eq!(call.validBefore, U256::from(NOW + 300));
    }

    #[tokio::test]
    async fn test_settle_eoa_with_recovery_id() {
        let facilitator = facilitator(MockChain::default());
        let payload = eoa_payload();
        let signature = payload.payload.signature.clone();
        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(settled.success);
        assert_eq!(settled.transaction, TX_HASH.to_string());
        assert_eq!(settled.network, "base-sepolia");
        assert_eq!(settled.payer, signer(PAYER_KEY).address().to_string());

        let submitted = facilitator.provider().submitted();
        assert_eq!(submitted.len(), 1);
        let call =
            IEIP3009::transferWithAuthorization_1Call::abi_decode(&submitted[0].calldata).unwrap();
        assert_eq!(call.v, signature[64]);
        assert_eq!(call.r.as_slice(), &signature[..32]);
        assert_eq!(call.s.as_slice(), &signature[32..64]);
        assert_eq!(call.to, PAY_TO);
        assert_eq!(call.nonce, B256::repeat_byte(0x42));
    }

    #[tokio::test]
    async fn test_settle_eoa_with_parity_bit() {
        let facilitator = facilitator(MockChain::default());
        let mut payload = eoa_payload();
        let mut raw = payload.payload.signature.to_vec();
        let recovery_id = raw[64];
        raw[64] -= 27;
        payload.payload.signature = raw.into();

        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(settled.success);
        let submitted = facilitator.provider().submitted();
        let call =
            IEIP3009::transferWithAuthorization_1Call::abi_decode(&submitted[0].calldata).unwrap();
        assert_eq!(call.v, recovery_id);
    }

    #[tokio::test]
    async fn test_settle_never_submits_after_failed_verification() {
        let facilitator = facilitator(MockChain::default());
        let payload = eoa_payload_with(|a| a.valid_after = U256::from(NOW + 100));
        let settled = facilitator.settle(&requirements(), &payload).await.unwrap();
        assert!(!settled.success);
        assert_eq!(
            settled.error_reason,
            Some(ErrorReason::InvalidExactEvmPayloadAuthorizationValidAfter)
        );
        assert_eq!(settled.transaction, "");
        assert_eq!(settled.payer, signer(PAYER_KEY).address().to_string());
        assert!(facilitator.provider().submitted().is_empty());
    }

    #[tokio::test]
    async fn test_settle_reverted_transaction() {
        let chain = MockChain {
            receipt: TransactionStatus::Reverted,
            ..MockChain::default()
        };
        let facilitator = facilitator(chain);
        let settled = facilitator.settle(&requirements(), &eoa_payload()).await.unwrap();
        assert!(!settled.success);
        assert_eq!(
            settled.error_reason,
            Some(ErrorReason::InvalidTransactionState)
        );
        assert_eq!(settled.transaction, TX_HASH.to_string());
    }

    #[tokio::test]
    async fn test_wire_verify_and_supported() {
        let facilitator = facilitator(MockChain::default());
        let body = json!({
            "x402Version": 1,
            "paymentPayload": eoa_payload(),
            "paymentRequirements": requirements(),
        });
        let request = proto::VerifyRequest::try_from(body).unwrap();
        let response = X402SchemeFacilitator::verify(&facilitator, &request)
            .await
            .unwrap();
        assert!(response.is_valid());

        let supported = X402SchemeFacilitator::supported(&facilitator).await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.kinds[0].network, "base-sepolia");
        assert_eq!(supported.kinds[0].scheme, "exact");
        assert_eq!(
            supported.signers.get(&ChainId::new("eip155", "84532")).map(Vec::len),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_wire_malformed_request() {
        let facilitator = facilitator(MockChain::default());
        let request = proto::VerifyRequest::try_from(json!({ "x402Version": 1 })).unwrap();
        let result = X402SchemeFacilitator::verify(&facilitator, &request).await;
        assert!(matches!(
            result,
            Err(X402SchemeFacilitatorError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_wire_empty_amount_is_malformed() {
        let facilitator = facilitator(MockChain::default());
        let mut body = json!({
            "x402Version": 1,
            "paymentPayload": eoa_payload(),
            "paymentRequirements": requirements(),
        });
        body["paymentRequirements"]["maxAmountRequired"] = json!("");
        let request = proto::VerifyRequest::try_from(body).unwrap();
        let result = X402SchemeFacilitator::verify(&facilitator, &request).await;
        assert!(matches!(
            result,
            Err(X402SchemeFacilitatorError::InvalidFormat(_))
        ));
    }
}
