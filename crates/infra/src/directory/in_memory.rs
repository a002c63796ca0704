use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use storefront_core::UserId;

use super::r#trait::{BuyerProfile, DirectoryError, UserDirectory};

/// In-memory user directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    buyers: RwLock<HashMap<UserId, BuyerProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, profile: BuyerProfile) -> Result<(), DirectoryError> {
        let mut buyers = self
            .buyers
            .write()
            .map_err(|_| DirectoryError::Backend("lock poisoned".to_string()))?;
        buyers.insert(profile.user_id, profile);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_buyer(&self, user_id: UserId) -> Result<Option<BuyerProfile>, DirectoryError> {
        let buyers = self
            .buyers
            .read()
            .map_err(|_| DirectoryError::Backend("lock poisoned".to_string()))?;
        Ok(buyers.get(&user_id).cloned())
    }
}
