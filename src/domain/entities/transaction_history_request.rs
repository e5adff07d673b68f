use chrono::{DateTime, Utc};

/// Query options for the Get Transaction History endpoint:
/// https://developer.apple.com/documentation/appstoreserverapi/get_transaction_history
///
/// Empty lists and `None` values are left out of the request, in which case
/// Apple applies no filter.
#[derive(Debug, Clone, Default)]
pub struct TransactionHistoryRequest {
    pub sort: Option<Order>,
    /// `Some(false)` excludes refunded and revoked transactions.
    pub revoked: Option<bool>,
    pub product_types: Vec<ProductType>,
    pub product_ids: Vec<String>,
    pub subscription_group_identifiers: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub in_app_ownership_type: Option<InAppOwnershipType>,
}

impl TransactionHistoryRequest {
    /// Oldest first, revoked transactions excluded, consumables only.
    pub fn consumables() -> Self {
        Self {
            sort: Some(Order::Ascending),
            revoked: Some(false),
            product_types: vec![ProductType::Consumable],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    AutoRenewable,
    NonRenewable,
    Consumable,
    NonConsumable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InAppOwnershipType {
    FamilyShared,
    Purchased,
}
