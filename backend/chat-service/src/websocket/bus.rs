use super::DeliveryEvent;
use crate::error::AppResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Push channel from the chat core to connected clients.
///
/// Delivery is best effort. A target with no live connection is skipped
/// silently; clients reconcile by pulling message history.
#[async_trait]
pub trait DeliveryBus: Send + Sync {
    /// Returns the number of connections reached, where the implementation can tell.
    async fn publish(&self, targets: &[Uuid], event: &DeliveryEvent) -> AppResult<usize>;
}
