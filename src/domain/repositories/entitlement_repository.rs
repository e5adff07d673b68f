use async_trait::async_trait;

use crate::{
    domain::entities::{
        transaction_history_request::TransactionHistoryRequest,
        verified_transaction::VerifiedTransaction,
    },
    errors::IapError,
};

#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Walks every page of the customer's transaction history and verifies
    /// each signed transaction, in page order.
    ///
    /// The walk is all-or-nothing: the first failed fetch or failed
    /// verification aborts it with `IapError::HistoryWalkAborted`.
    async fn transaction_history(
        &self,
        transaction_id: &str,
        request: &TransactionHistoryRequest,
    ) -> Result<Vec<VerifiedTransaction>, IapError>;

    /// Fetches and verifies a single transaction.
    ///
    /// Returns `Ok(None)` if Apple returned no signed transaction, or if the
    /// signed transaction failed verification. Fetch errors are returned.
    async fn transaction_info(
        &self,
        transaction_id: &str,
    ) -> Result<Option<VerifiedTransaction>, IapError>;
}
