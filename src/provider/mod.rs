//! HTTP bridging provider.
//!
//! [`HttpProvider`] turns inbound RPC calls into outbound HTTP requests.
//! Two call modes share one entry point, selected by the `HTTP_PROXY`
//! attachment: transparent proxying of raw request bytes, or rewriting call
//! arguments into a fresh form-encoded request.

mod http;
mod location;
mod resolver;

pub use http::*;
pub use location::*;

use async_trait::async_trait;

use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;
use crate::rpc::Url;

/// Provider contract consumed by the inbound dispatcher. `call` never raises
/// out: every failure comes back as a response exception.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn url(&self) -> Url;

    fn set_url(
        &self,
        url: Url,
    );

    /// Service path this provider serves, from its URL.
    fn path(&self) -> String;

    fn is_available(&self) -> bool;

    async fn call(
        &self,
        request: &mut RpcRequest,
    ) -> RpcResponse;

    fn destroy(&self);
}
