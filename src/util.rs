use tracing::info;

use crate::{
    config::IapConfig,
    data::{
        datasources::{
            app_store_server_api_datasource::AppStoreServerApiDatasourceImpl,
            root_certificate_datasource::{load_root_certificates, load_signing_key},
            signed_data_verifier_datasource::SignedDataVerifierDatasourceImpl,
        },
        repositories::entitlement_repository_impl::EntitlementRepositoryImpl,
    },
    domain::{
        entities::{
            entitlement_status::EntitlementStatus,
            transaction_history_request::TransactionHistoryRequest,
            verified_transaction::VerifiedTransaction,
        },
        repositories::entitlement_repository::EntitlementRepository,
    },
    errors::IapError,
};

pub struct IapUtil<R: EntitlementRepository> {
    entitlement_repository: R,
    bundle_id: String,
}

impl<R: EntitlementRepository> IapUtil<R> {
    /// Walks the customer's consumable purchase history and checks that
    /// `transaction_id` is in it and belongs to the configured app.
    ///
    /// Errors if the history could not be fetched or any transaction in it
    /// failed verification; callers should deny access in that case.
    pub async fn validate_purchase(
        &self,
        transaction_id: &str,
    ) -> Result<EntitlementStatus, IapError> {
        self.validate_purchase_with(transaction_id, &TransactionHistoryRequest::consumables())
            .await
    }

    /// As `validate_purchase`, with a custom history query.
    pub async fn validate_purchase_with(
        &self,
        transaction_id: &str,
        request: &TransactionHistoryRequest,
    ) -> Result<EntitlementStatus, IapError> {
        let transactions = self
            .entitlement_repository
            .transaction_history(transaction_id, request)
            .await?;
        let status = EntitlementStatus::evaluate(&transactions, transaction_id, &self.bundle_id);
        info!(transaction_id, entitled = status.is_entitled(), "{status}");
        Ok(status)
    }

    /// Fetches the single transaction `transaction_id` and checks that it
    /// belongs to the configured app. A transaction that is missing or fails
    /// verification is reported as `NotFound`.
    pub async fn lookup_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<EntitlementStatus, IapError> {
        let transaction = self
            .entitlement_repository
            .transaction_info(transaction_id)
            .await?;
        let status = EntitlementStatus::evaluate(&transaction, transaction_id, &self.bundle_id);
        info!(transaction_id, entitled = status.is_entitled(), "{status}");
        Ok(status)
    }

    /// Every verified transaction in the customer's history, in page order.
    pub async fn transaction_history(
        &self,
        transaction_id: &str,
        request: &TransactionHistoryRequest,
    ) -> Result<Vec<VerifiedTransaction>, IapError> {
        self.entitlement_repository
            .transaction_history(transaction_id, request)
            .await
    }
}

impl
    IapUtil<
        EntitlementRepositoryImpl<
            AppStoreServerApiDatasourceImpl,
            SignedDataVerifierDatasourceImpl,
        >,
    >
{
    /// Loads the root certificates and API key named in `config`, and wires
    /// up the verifier and the API client.
    pub fn new(config: &IapConfig) -> Result<Self, IapError> {
        let root_certificates = load_root_certificates(&config.root_certificate_paths)?;
        let verifier = SignedDataVerifierDatasourceImpl::new(
            &root_certificates,
            config.environment,
            &config.bundle_id,
            config.app_apple_id,
            config.enable_online_checks,
            config.timeout,
        )?;

        let signing_key = load_signing_key(&config.private_key_path)?;
        let api = AppStoreServerApiDatasourceImpl::new(
            &signing_key,
            &config.key_id,
            &config.issuer_id,
            &config.bundle_id,
            config.environment,
            config.base_url.as_deref(),
            config.timeout,
        )?;

        Ok(Self {
            entitlement_repository: EntitlementRepositoryImpl::new(api, verifier),
            bundle_id: config.bundle_id.clone(),
        })
    }
}
