//! The verification and settlement interface exposed over HTTP.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::proto;
use crate::proto::v1;

/// Verifies payment payloads against requirements and settles accepted ones.
pub trait Facilitator {
    type Error: Debug + Display;

    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<v1::VerifyResponse, Self::Error>> + Send;

    fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> impl Future<Output = Result<v1::SettleResponse, Self::Error>> + Send;

    fn supported(
        &self,
    ) -> impl Future<Output = Result<proto::SupportedResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Sync> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<v1::VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> impl Future<Output = Result<v1::SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn supported(
        &self,
    ) -> impl Future<Output = Result<proto::SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }
}
