//! Payment scheme handlers and their registry.
//!
//! A *blueprint* ([`X402SchemeId`] + [`X402SchemeFacilitatorBuilder`]) knows how
//! to build a scheme handler for a chain provider. [`SchemeRegistry::build`]
//! instantiates every blueprint against every configured chain of a matching
//! namespace, and the facilitator then routes each request to a handler by its
//! [`SchemeHandlerSlug`].

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

use crate::chain::{ChainId, ChainProviderOps, ChainRegistry};
use crate::proto;
use crate::proto::v1;

/// Failure of a scheme handler that is not a payment rejection.
#[derive(Debug, thiserror::Error)]
pub enum X402SchemeFacilitatorError {
    /// The request body does not match the scheme's wire types.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// A chain read or write could not be completed. Retryable.
    #[error("Onchain failure: {0}")]
    OnchainFailure(String),
}

impl From<proto::PaymentVerificationError> for X402SchemeFacilitatorError {
    fn from(value: proto::PaymentVerificationError) -> Self {
        Self::InvalidFormat(value.to_string())
    }
}

/// A payment scheme bound to one chain.
#[async_trait::async_trait]
pub trait X402SchemeFacilitator: Send + Sync {
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v1::VerifyResponse, X402SchemeFacilitatorError>;

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v1::SettleResponse, X402SchemeFacilitatorError>;

    async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError>;
}

/// Identity of a payment scheme.
pub trait X402SchemeId {
    fn x402_version(&self) -> u8 {
        1
    }
    /// CAIP-2 namespace of the chains the scheme runs on.
    fn namespace(&self) -> &str;
    /// Scheme name as it appears on the wire, e.g. `exact`.
    fn scheme(&self) -> &str;
}

/// Builds a scheme handler for a chain provider.
pub trait X402SchemeFacilitatorBuilder<P> {
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn X402SchemeFacilitator>, Box<dyn std::error::Error>>;
}

pub trait X402SchemeBlueprint<P>: X402SchemeId + X402SchemeFacilitatorBuilder<P> {}

impl<T, P> X402SchemeBlueprint<P> for T where T: X402SchemeId + X402SchemeFacilitatorBuilder<P> {}

/// Blueprints to instantiate per chain.
pub struct SchemeBlueprints<P>(Vec<Box<dyn X402SchemeBlueprint<P>>>);

impl<P> Default for SchemeBlueprints<P> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<P> SchemeBlueprints<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_register<B: X402SchemeBlueprint<P> + 'static>(mut self, blueprint: B) -> Self {
        self.0.push(Box::new(blueprint));
        self
    }
}

/// Key a request is routed by.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SchemeHandlerSlug {
    pub chain_id: ChainId,
    pub x402_version: u8,
    pub name: String,
}

impl SchemeHandlerSlug {
    pub fn new(chain_id: ChainId, x402_version: u8, name: String) -> Self {
        Self {
            chain_id,
            x402_version,
            name,
        }
    }
}

impl Display for SchemeHandlerSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:v{}:{}",
            self.chain_id.namespace, self.chain_id.reference, self.x402_version, self.name
        )
    }
}

/// Scheme handlers by slug.
#[derive(Default)]
pub struct SchemeRegistry(HashMap<SchemeHandlerSlug, Box<dyn X402SchemeFacilitator>>);

impl Debug for SchemeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let slugs: Vec<String> = self.0.keys().map(|s| s.to_string()).collect();
        f.debug_tuple("SchemeRegistry").field(&slugs).finish()
    }
}

impl SchemeRegistry {
    /// Instantiates each blueprint for each chain in its namespace.
    ///
    /// A handler that fails to build is logged and skipped.
    pub fn build<P>(chains: &ChainRegistry<P>, blueprints: SchemeBlueprints<P>) -> Self
    where
        P: ChainProviderOps + Clone,
    {
        let mut registry = Self::default();
        for blueprint in blueprints.0.iter() {
            for (chain_id, provider) in chains.iter() {
                if chain_id.namespace != blueprint.namespace() {
                    continue;
                }
                let slug = SchemeHandlerSlug::new(
                    chain_id.clone(),
                    blueprint.x402_version(),
                    blueprint.scheme().to_string(),
                );
                match blueprint.build(provider.clone(), None) {
                    Ok(handler) => {
                        tracing::info!(%slug, "Registered scheme handler");
                        registry.insert(slug, handler);
                    }
                    Err(err) => {
                        tracing::error!(%slug, "Error building scheme handler: {err}");
                    }
                }
            }
        }
        registry
    }

    pub fn insert(&mut self, slug: SchemeHandlerSlug, handler: Box<dyn X402SchemeFacilitator>) {
        self.0.insert(slug, handler);
    }

    pub fn by_slug(&self, slug: &SchemeHandlerSlug) -> Option<&dyn X402SchemeFacilitator> {
        let handler = self.0.get(slug)?.deref();
        Some(handler)
    }

    /// Whether any chain has a handler for this scheme name.
    pub fn has_scheme(&self, name: &str) -> bool {
        self.0.keys().any(|slug| slug.name == name)
    }

    pub fn values(&self) -> impl Iterator<Item = &dyn X402SchemeFacilitator> {
        self.0.values().map(|v| v.deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
