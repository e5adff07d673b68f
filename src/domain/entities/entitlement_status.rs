use std::fmt;

use super::verified_transaction::VerifiedTransaction;

/// Outcome of checking whether a transaction entitles the customer to content
/// in the configured app.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitlementStatus {
    /// The transaction was found, and belongs to the expected app.
    Valid(VerifiedTransaction),
    /// The transaction was found, but belongs to a different app.
    BundleMismatch {
        transaction: VerifiedTransaction,
        expected_bundle_id: String,
    },
    NotFound,
}

impl EntitlementStatus {
    /// Finds the first transaction with the given id and checks that its own
    /// bundle identifier is the expected one.
    pub fn evaluate<'a, I>(transactions: I, transaction_id: &str, expected_bundle_id: &str) -> Self
    where
        I: IntoIterator<Item = &'a VerifiedTransaction>,
    {
        match transactions
            .into_iter()
            .find(|t| t.transaction_id == transaction_id)
        {
            Some(t) if t.bundle_id == expected_bundle_id => EntitlementStatus::Valid(t.clone()),
            Some(t) => EntitlementStatus::BundleMismatch {
                transaction: t.clone(),
                expected_bundle_id: expected_bundle_id.to_owned(),
            },
            None => EntitlementStatus::NotFound,
        }
    }

    pub fn is_entitled(&self) -> bool {
        matches!(self, EntitlementStatus::Valid(_))
    }
}

impl fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitlementStatus::Valid(t) => write!(
                f,
                "Transaction {} validated; app bundle is valid.",
                t.transaction_id
            ),
            EntitlementStatus::BundleMismatch {
                transaction,
                expected_bundle_id,
            } => write!(
                f,
                "Transaction {} validated; app bundle is invalid (expected '{}', found '{}').",
                transaction.transaction_id, expected_bundle_id, transaction.bundle_id
            ),
            EntitlementStatus::NotFound => f.write_str("No matching transaction found."),
        }
    }
}
