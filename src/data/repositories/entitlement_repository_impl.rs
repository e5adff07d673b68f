use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    data::{
        datasources::{
            app_store_server_api_datasource::{
                AppStoreServerApiDatasource, AppStoreServerApiDatasourceImpl,
            },
            signed_data_verifier_datasource::{
                SignedDataVerifierDatasource, SignedDataVerifierDatasourceImpl,
            },
        },
        models::app_store_server_api::{
            common::Environment, jws_transaction_decoded_payload_model as at,
        },
    },
    domain::{
        entities::{
            transaction_history_request::{ProductType, TransactionHistoryRequest},
            verified_transaction::VerifiedTransaction,
        },
        repositories::entitlement_repository::EntitlementRepository,
    },
    errors::IapError,
};

pub struct EntitlementRepositoryImpl<
    A: AppStoreServerApiDatasource,
    V: SignedDataVerifierDatasource,
> {
    app_store_server_api_datasource: A,
    signed_data_verifier_datasource: V,
}

#[async_trait]
impl<A: AppStoreServerApiDatasource, V: SignedDataVerifierDatasource> EntitlementRepository
    for EntitlementRepositoryImpl<A, V>
{
    async fn transaction_history(
        &self,
        transaction_id: &str,
        request: &TransactionHistoryRequest,
    ) -> Result<Vec<VerifiedTransaction>, IapError> {
        let mut transactions = Vec::new();
        let mut revision: Option<String> = None;
        let mut pages_fetched = 0;

        loop {
            let page = match self
                .app_store_server_api_datasource
                .get_transaction_history(transaction_id, revision.as_deref(), request)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!(transaction_id, error = %e, "Error fetching transaction history.");
                    return Err(abort(transactions, pages_fetched, e));
                }
            };
            pages_fetched += 1;
            debug!(
                page = pages_fetched,
                transactions = page.signed_transactions.len(),
                has_more = page.has_more,
                "Fetched transaction history page."
            );

            for signed_transaction in &page.signed_transactions {
                match self
                    .signed_data_verifier_datasource
                    .verify_and_decode_transaction(signed_transaction)
                    .await
                {
                    Ok(m) => transactions.push(VerifiedTransaction::from_apple_transaction(m)),
                    Err(e) => {
                        warn!(transaction_id, error = %e, "Error verifying transaction.");
                        return Err(abort(transactions, pages_fetched, e));
                    }
                }
            }

            if !page.has_more {
                break;
            }
            match page.revision {
                Some(next) => revision = Some(next),
                None => {
                    let e = IapError::invalid_response(
                        "GetTransactionHistory",
                        "Page reported more data but carried no revision.",
                    );
                    return Err(abort(transactions, pages_fetched, e));
                }
            }
        }

        info!(
            transaction_id,
            pages = pages_fetched,
            transactions = transactions.len(),
            "Walked transaction history."
        );
        Ok(transactions)
    }

    async fn transaction_info(
        &self,
        transaction_id: &str,
    ) -> Result<Option<VerifiedTransaction>, IapError> {
        let response = self
            .app_store_server_api_datasource
            .get_transaction_info(transaction_id)
            .await
            .map_err(|e| {
                error!(transaction_id, error = %e, "Error fetching transaction info.");
                e
            })?;
        let Some(signed_transaction) = response.signed_transaction_info else {
            info!(transaction_id, "No transaction info found.");
            return Ok(None);
        };
        match self
            .signed_data_verifier_datasource
            .verify_and_decode_transaction(&signed_transaction)
            .await
        {
            Ok(m) => Ok(Some(VerifiedTransaction::from_apple_transaction(m))),
            Err(e) => {
                warn!(transaction_id, error = %e, "Error verifying transaction.");
                Ok(None)
            }
        }
    }
}

impl EntitlementRepositoryImpl<AppStoreServerApiDatasourceImpl, SignedDataVerifierDatasourceImpl> {
    pub(crate) fn new(
        app_store_server_api_datasource: AppStoreServerApiDatasourceImpl,
        signed_data_verifier_datasource: SignedDataVerifierDatasourceImpl,
    ) -> Self {
        Self {
            app_store_server_api_datasource,
            signed_data_verifier_datasource,
        }
    }
}

fn abort(partial: Vec<VerifiedTransaction>, pages_fetched: usize, source: IapError) -> IapError {
    IapError::HistoryWalkAborted {
        partial,
        pages_fetched,
        source: Box::new(source),
    }
}

impl VerifiedTransaction {
    fn from_apple_transaction(m: at::JwsTransactionDecodedPayloadModel) -> Self {
        VerifiedTransaction {
            is_revoked: m.revocation_date.is_some() || m.revocation_reason.is_some(),
            is_sandbox: m.environment != Environment::Production,
            product_type: match m.transaction_type {
                Some(at::TransactionType::AutoRenewableSubscription) => {
                    Some(ProductType::AutoRenewable)
                }
                Some(at::TransactionType::NonRenewableSubscription) => {
                    Some(ProductType::NonRenewable)
                }
                Some(at::TransactionType::Consumable) => Some(ProductType::Consumable),
                Some(at::TransactionType::NonConsumable) => Some(ProductType::NonConsumable),
                Some(at::TransactionType::Unknown(_)) | None => None,
            },
            quantity: m.quantity.map(|q| q as i64).unwrap_or(1),
            purchase_time: m.purchase_date,
            transaction_id: m.transaction_id,
            original_transaction_id: m.original_transaction_id,
            bundle_id: m.bundle_id,
            product_id: m.product_id,
        }
    }
}
