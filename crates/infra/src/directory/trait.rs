use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_core::UserId;
use storefront_orders::ShippingSnapshot;

/// What placement reads from a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerProfile {
    pub user_id: UserId,
    /// Saved addresses, most preferred first.
    #[serde(default)]
    pub shipping_addresses: Vec<ShippingSnapshot>,
}

impl BuyerProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            shipping_addresses: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: ShippingSnapshot) -> Self {
        self.shipping_addresses.push(address);
        self
    }

    /// The address used when an order request carries none.
    pub fn default_address(&self) -> Option<&ShippingSnapshot> {
        self.shipping_addresses.first()
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory backend error: {0}")]
    Backend(String),

    #[error("user record could not be decoded: {0}")]
    Serialization(String),
}

/// Read-only view of the user records owned elsewhere.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_buyer(&self, user_id: UserId) -> Result<Option<BuyerProfile>, DirectoryError>;
}

#[async_trait]
impl<D> UserDirectory for Arc<D>
where
    D: UserDirectory + ?Sized,
{
    async fn find_buyer(&self, user_id: UserId) -> Result<Option<BuyerProfile>, DirectoryError> {
        (**self).find_buyer(user_id).await
    }
}
