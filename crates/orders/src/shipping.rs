use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    Work,
    Home,
    Custom,
}

/// Shipping data copied onto the order at placement time.
///
/// Never re-read from the live user record afterwards: later edits to the
/// buyer's address book do not touch placed orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSnapshot {
    pub name: String,
    pub phone_no: String,
    /// Full street address.
    pub address_line: String,
    pub state: String,
    pub city: String,
    pub pincode: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub landmark: Option<String>,
    pub address_type: AddressType,
}

impl ValueObject for ShippingSnapshot {}

impl ShippingSnapshot {
    /// Every required text field must be non-blank.
    pub fn validate(&self) -> DomainResult<()> {
        let required = [
            ("name", &self.name),
            ("phoneNo", &self.phone_no),
            ("addressLine", &self.address_line),
            ("state", &self.state),
            ("city", &self.city),
            ("pincode", &self.pincode),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "shipping address is missing: {}",
                missing.join(", ")
            )))
        }
    }
}
