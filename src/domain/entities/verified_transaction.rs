use chrono::{DateTime, Utc};

use super::transaction_history_request::ProductType;

/// A purchase event whose signed payload has been verified against the
/// configured Apple root certificates.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedTransaction {
    /// The unique identifier of the transaction.
    pub transaction_id: String,
    /// The transaction identifier of the original purchase.
    pub original_transaction_id: String,
    /// The bundle identifier of the app the transaction belongs to.
    pub bundle_id: String,
    pub product_id: String,
    /// `None` if Apple reported a product type this crate does not know.
    pub product_type: Option<ProductType>,
    pub purchase_time: DateTime<Utc>,
    pub quantity: i64,
    /// Refunded, or revoked from Family Sharing.
    pub is_revoked: bool,
    pub is_sandbox: bool,
}
