use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::errors::RequestError;
use crate::domain::models::{ResponsePayload, TargetDescriptor};

/// Request/response channel provided by the host environment.
///
/// Implementations classify failures into the `RequestError` taxonomy:
/// transport-level problems are `TransientNetwork`, 5xx responses are
/// `ServerUnavailable`, and permanent rejections are `ClientRejected`.
/// Timeouts are enforced by the scheduler, not the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        target: &TargetDescriptor,
        headers: &BTreeMap<String, String>,
    ) -> Result<ResponsePayload, RequestError>;
}
