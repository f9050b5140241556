use alloy_network::{Ethereum as AlloyEthereum, EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy_primitives::{Address, B256, Bytes, TxHash, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{
    Identity, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
    RootProvider, WalletProvider,
};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use dashmap::DashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceBuilder;
use tracing::Instrument;
use x402_types::chain::{ChainId, ChainProviderOps, FromConfig};
use x402_types::config::RpcConfig;

use crate::chain::config::Eip155ChainConfig;
use crate::chain::contract::{IEIP3009, VALIDATOR_ADDRESS, Validator6492};
use crate::chain::pending_nonce_manager::PendingNonceManager;
use crate::chain::types::Eip155ChainReference;

/// Gas, blob gas, nonce and chain id fillers.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// The composed alloy provider: fillers and a wallet over a [`RootProvider`].
pub type InnerProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// EIP-712 domain fields a token declares on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDomain {
    pub name: String,
    pub version: String,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Success,
    Reverted,
}

/// A call the facilitator pays gas for.
#[derive(Debug, Clone)]
pub struct MetaTransaction {
    pub to: Address,
    pub calldata: Bytes,
    /// Blocks to wait for before the receipt counts.
    pub confirmations: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum Eip155ChainError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    #[error("Contract call failed: {0}")]
    Contract(String),
}

impl From<alloy_contract::Error> for Eip155ChainError {
    fn from(e: alloy_contract::Error) -> Self {
        match e {
            alloy_contract::Error::TransportError(e) => Self::Transport(e),
            alloy_contract::Error::PendingTransactionError(e) => Self::PendingTransaction(e),
            other => Self::Contract(other.to_string()),
        }
    }
}

/// JSON-RPC error code of a reverted `eth_call`.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Whether the node answered that the call reverted. Rate limits, missing
/// blocks and other error responses are not reverts.
fn is_revert(error: &TransportError) -> bool {
    error.as_error_resp().is_some_and(|payload| {
        payload.code == EXECUTION_REVERTED_CODE
            || payload.as_revert_data().is_some()
            || payload.message.contains("execution reverted")
    })
}

/// Treats a reverted call, or one that returned no decodable data, as
/// "no value". Anything else is a real failure.
fn optional_call<T>(result: Result<T, alloy_contract::Error>) -> Result<Option<T>, Eip155ChainError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(alloy_contract::Error::TransportError(e)) if is_revert(&e) => Ok(None),
        Err(
            alloy_contract::Error::ZeroData(..)
            | alloy_contract::Error::AbiError(_)
            | alloy_contract::Error::ContractNotDeployed,
        ) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Chain reads needed to verify a payment.
pub trait Eip155ChainReader {
    fn chain(&self) -> Eip155ChainReference;

    /// The token's `name()` and `version()`. `None` if it does not expose them.
    fn token_eip712_domain(
        &self,
        asset: Address,
    ) -> impl Future<Output = Result<Option<TokenDomain>, Eip155ChainError>> + Send;

    fn token_balance(
        &self,
        asset: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, Eip155ChainError>> + Send;

    /// Deployed bytecode, empty for accounts without code.
    fn code_at(&self, address: Address)
    -> impl Future<Output = Result<Bytes, Eip155ChainError>> + Send;
}

/// Validates signatures that are not plain ECDSA.
pub trait Eip155SignatureVerifier {
    /// Whether `signer` signed `hash`. Handles EIP-1271 and EIP-6492 wrapped
    /// signatures. A reverting validation is reported as `false`.
    fn is_valid_signature(
        &self,
        signer: Address,
        hash: B256,
        signature: Bytes,
    ) -> impl Future<Output = Result<bool, Eip155ChainError>> + Send;
}

/// Submits settlement transactions.
pub trait Eip155ChainWriter {
    fn submit_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl Future<Output = Result<TxHash, Eip155ChainError>> + Send;

    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<TransactionStatus, Eip155ChainError>> + Send;
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    signer: Address,
    confirmations: u64,
}

/// Alloy-backed access to one EVM chain.
///
/// Signers are rotated round-robin. Nonces are tracked by a
/// [`PendingNonceManager`] and reset whenever a submission or its receipt
/// wait fails, since the on-chain nonce is then unknown.
#[derive(Debug)]
pub struct Eip155ChainProvider {
    chain: Eip155ChainReference,
    eip1559: bool,
    receipt_timeout_secs: u64,
    inner: InnerProvider,
    signer_addresses: Vec<Address>,
    signer_cursor: AtomicUsize,
    nonce_manager: PendingNonceManager,
    in_flight: DashMap<TxHash, InFlight>,
}

impl Eip155ChainProvider {
    /// HTTP(S) transports behind throttling and fallback. `None` without any.
    pub fn rpc_client(chain_id: &ChainId, rpc: &[RpcConfig]) -> Option<RpcClient> {
        let transports = rpc
            .iter()
            .filter_map(|provider_config| {
                let scheme = provider_config.http.scheme();
                if scheme != "http" && scheme != "https" {
                    tracing::warn!(chain=%chain_id, rpc_url=%provider_config.http, "Skipping non-HTTP transport");
                    return None;
                }
                let rpc_url = provider_config.http.clone();
                tracing::info!(chain=%chain_id, rpc_url=%rpc_url, rate_limit=?provider_config.rate_limit, "Using HTTP transport");
                let rate_limit = provider_config.rate_limit.unwrap_or(u32::MAX);
                let service = ServiceBuilder::new()
                    .layer(ThrottleLayer::new(rate_limit))
                    .service(Http::new(rpc_url));
                Some(service)
            })
            .collect::<Vec<_>>();
        let active_transports = NonZeroUsize::new(transports.len())?;
        let fallback = ServiceBuilder::new()
            .layer(FallbackLayer::default().with_active_transport_count(active_transports))
            .service(transports);
        Some(RpcClient::new(fallback, false))
    }

    fn next_signer_address(&self) -> Address {
        let next = self.signer_cursor.fetch_add(1, Ordering::Relaxed) % self.signer_addresses.len();
        self.signer_addresses[next]
    }
}

#[async_trait::async_trait]
impl FromConfig<Eip155ChainConfig> for Eip155ChainProvider {
    async fn from_config(config: &Eip155ChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let chain_id = config.chain_id();

        let signers = config
            .signers()
            .iter()
            .map(|key| {
                PrivateKeySigner::from_bytes(key.as_b256())
                    .map(|s| s.with_chain_id(Some(config.chain_reference().inner())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut signers = signers.into_iter();
        let Some(first_signer) = signers.next() else {
            return Err(format!("{chain_id}: at least one signer should be provided").into());
        };
        let mut wallet = EthereumWallet::from(first_signer);
        for signer in signers {
            wallet.register_signer(signer);
        }
        let signer_addresses =
            NetworkWallet::<AlloyEthereum>::signer_addresses(&wallet).collect::<Vec<_>>();

        let client = Self::rpc_client(&chain_id, config.rpc())
            .ok_or_else(|| format!("{chain_id}: at least one http(s) rpc endpoint should be provided"))?;

        let nonce_manager = PendingNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let inner: InnerProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        tracing::info!(chain=%chain_id, signers=?signer_addresses, "Using EVM provider");

        Ok(Self {
            chain: config.chain_reference(),
            eip1559: config.eip1559(),
            receipt_timeout_secs: config.receipt_timeout_secs(),
            inner,
            signer_addresses,
            signer_cursor: AtomicUsize::new(0),
            nonce_manager,
            in_flight: DashMap::new(),
        })
    }
}

impl Eip155ChainReader for Eip155ChainProvider {
    fn chain(&self) -> Eip155ChainReference {
        self.chain
    }

    async fn token_eip712_domain(
        &self,
        asset: Address,
    ) -> Result<Option<TokenDomain>, Eip155ChainError> {
        let token = IEIP3009::new(asset, &self.inner);
        let name = token
            .name()
            .call()
            .into_future()
            .instrument(tracing::info_span!("fetch_eip712_name", token = %asset, otel.kind = "client"))
            .await;
        let Some(name) = optional_call(name)? else {
            return Ok(None);
        };
        let version = token
            .version()
            .call()
            .into_future()
            .instrument(tracing::info_span!("fetch_eip712_version", token = %asset, otel.kind = "client"))
            .await;
        let Some(version) = optional_call(version)? else {
            return Ok(None);
        };
        Ok(Some(TokenDomain { name, version }))
    }

    async fn token_balance(&self, asset: Address, owner: Address) -> Result<U256, Eip155ChainError> {
        let token = IEIP3009::new(asset, &self.inner);
        let balance = token
            .balanceOf(owner)
            .call()
            .into_future()
            .instrument(tracing::info_span!(
                "fetch_token_balance",
                token = %asset,
                owner = %owner,
                otel.kind = "client"
            ))
            .await?;
        Ok(balance)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, Eip155ChainError> {
        let code = self
            .inner
            .get_code_at(address)
            .into_future()
            .instrument(tracing::info_span!("get_code_at", address = %address, otel.kind = "client"))
            .await?;
        Ok(code)
    }
}

impl Eip155SignatureVerifier for Eip155ChainProvider {
    async fn is_valid_signature(
        &self,
        signer: Address,
        hash: B256,
        signature: Bytes,
    ) -> Result<bool, Eip155ChainError> {
        let validator = Validator6492::new(VALIDATOR_ADDRESS, &self.inner);
        let result = validator
            .isValidSig(signer, hash, signature)
            .call()
            .into_future()
            .instrument(tracing::info_span!(
                "call_isValidSig",
                signer = %signer,
                hash = %hash,
                otel.kind = "client"
            ))
            .await;
        Ok(optional_call(result)?.unwrap_or(false))
    }
}

impl Eip155ChainWriter for Eip155ChainProvider {
    /// Sends `tx` from the next signer.
    ///
    /// Legacy chains get an explicit gas price. The nonce of the signer is
    /// reset if the node rejects the transaction.
    async fn submit_transaction(&self, tx: MetaTransaction) -> Result<TxHash, Eip155ChainError> {
        let from = self.next_signer_address();
        let mut txr = TransactionRequest::default()
            .with_to(tx.to)
            .with_from(from)
            .with_input(tx.calldata);

        if !self.eip1559 {
            let gas_price = self
                .inner
                .get_gas_price()
                .into_future()
                .instrument(tracing::info_span!("get_gas_price", otel.kind = "client"))
                .await?;
            txr.set_gas_price(gas_price);
        }

        let gas_limit = self
            .inner
            .estimate_gas(txr.clone())
            .block(BlockId::pending())
            .into_future()
            .instrument(tracing::info_span!("estimate_gas", from = %from, otel.kind = "client"))
            .await?;
        txr.set_gas_limit(gas_limit);

        let pending = match self.inner.send_transaction(txr).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce_manager.reset_nonce(from).await;
                return Err(Eip155ChainError::Transport(e));
            }
        };
        let tx_hash = *pending.tx_hash();
        self.in_flight.insert(
            tx_hash,
            InFlight {
                signer: from,
                confirmations: tx.confirmations,
            },
        );
        tracing::debug!(tx = %tx_hash, from = %from, "Transaction submitted");
        Ok(tx_hash)
    }

    /// Waits up to `receipt_timeout_secs` for the receipt of `tx_hash`.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionStatus, Eip155ChainError> {
        let in_flight = self.in_flight.remove(&tx_hash).map(|(_, in_flight)| in_flight);
        let confirmations = in_flight.map(|f| f.confirmations).unwrap_or(1);
        let timeout = Duration::from_secs(self.receipt_timeout_secs);
        let watcher = PendingTransactionBuilder::new(self.inner.root().clone(), tx_hash)
            .with_required_confirmations(confirmations)
            .with_timeout(Some(timeout));
        let receipt = watcher
            .get_receipt()
            .instrument(tracing::info_span!("get_receipt", tx = %tx_hash, otel.kind = "client"))
            .await;
        match receipt {
            Ok(receipt) if receipt.status() => Ok(TransactionStatus::Success),
            Ok(_) => Ok(TransactionStatus::Reverted),
            Err(e) => {
                if let Some(in_flight) = in_flight {
                    self.nonce_manager.reset_nonce(in_flight.signer).await;
                }
                Err(Eip155ChainError::PendingTransaction(e))
            }
        }
    }
}

impl ChainProviderOps for Eip155ChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        self.inner
            .signer_addresses()
            .map(|a| a.to_string())
            .collect()
    }

    fn chain_id(&self) -> ChainId {
        self.chain.into()
    }
}

impl<T: Eip155ChainReader + Send + Sync> Eip155ChainReader for Arc<T> {
    fn chain(&self) -> Eip155ChainReference {
        (**self).chain()
    }

    fn token_eip712_domain(
        &self,
        asset: Address,
    ) -> impl Future<Output = Result<Option<TokenDomain>, Eip155ChainError>> + Send {
        (**self).token_eip712_domain(asset)
    }

    fn token_balance(
        &self,
        asset: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, Eip155ChainError>> + Send {
        (**self).token_balance(asset, owner)
    }

    fn code_at(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Bytes, Eip155ChainError>> + Send {
        (**self).code_at(address)
    }
}

impl<T: Eip155SignatureVerifier + Send + Sync> Eip155SignatureVerifier for Arc<T> {
    fn is_valid_signature(
        &self,
        signer: Address,
        hash: B256,
        signature: Bytes,
    ) -> impl Future<Output = Result<bool, Eip155ChainError>> + Send {
        (**self).is_valid_signature(signer, hash, signature)
    }
}

impl<T: Eip155ChainWriter + Send + Sync> Eip155ChainWriter for Arc<T> {
    fn submit_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl Future<Output = Result<TxHash, Eip155ChainError>> + Send {
        (**self).submit_transaction(tx)
    }

    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<TransactionStatus, Eip155ChainError>> + Send {
        (**self).wait_for_receipt(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::{ErrorPayload, RpcError};

    fn error_response(code: i64, message: &'static str) -> alloy_contract::Error {
        alloy_contract::Error::TransportError(RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        }))
    }

    #[test]
    fn test_optional_call_reverted() {
        let result = optional_call::<bool>(Err(error_response(3, "execution reverted")));
        assert!(matches!(result, Ok(None)));

        let result = optional_call::<bool>(Err(error_response(-32000, "execution reverted")));
        assert!(matches!(result, Ok(None)));

        let result = optional_call::<bool>(Err(alloy_contract::Error::ContractNotDeployed));
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_optional_call_rpc_failures_propagate() {
        let result = optional_call::<bool>(Err(error_response(-32005, "limit exceeded")));
        assert!(matches!(result, Err(Eip155ChainError::Transport(_))));

        let result = optional_call::<bool>(Err(error_response(-32000, "header not found")));
        assert!(matches!(result, Err(Eip155ChainError::Transport(_))));
    }

    #[test]
    fn test_optional_call_value() {
        assert!(matches!(optional_call::<bool>(Ok(true)), Ok(Some(true))));
    }

    #[tokio::test]
    async fn test_signers_rotate_round_robin() {
        const KEYS: [&str; 2] = [
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        ];
        let json = format!(
            r#"{{ "signers": ["{}", "{}"], "rpc": [{{ "http": "http://localhost:8545" }}] }}"#,
            KEYS[0], KEYS[1]
        );
        let config = Eip155ChainConfig {
            chain_reference: Eip155ChainReference::new(84532),
            inner: serde_json::from_str(&json).unwrap(),
        };
        let provider = Eip155ChainProvider::from_config(&config).await.unwrap();
        let mut expected = KEYS
            .iter()
            .map(|key| key.parse::<PrivateKeySigner>().unwrap().address())
            .collect::<Vec<_>>();
        expected.sort();

        let first = provider.next_signer_address();
        let second = provider.next_signer_address();
        assert_eq!(provider.next_signer_address(), first);
        let mut used = vec![first, second];
        used.sort();
        assert_eq!(used, expected);
        assert_eq!(provider.chain_id(), ChainId::new("eip155", "84532"));
    }
}
