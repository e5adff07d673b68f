use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::EncodingKey;
use reqwest::header::AUTHORIZATION;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{
    data::models::app_store_server_api::{
        error_payload_model::ErrorPayloadModel, history_response_model::HistoryResponseModel,
        transaction_info_response_model::TransactionInfoResponseModel,
    },
    domain::entities::{
        app_store_environment::AppStoreEnvironment,
        transaction_history_request::{
            InAppOwnershipType, Order, ProductType, TransactionHistoryRequest,
        },
    },
    errors::IapError,
};

const PRODUCTION_URL: &str = "https://api.storekit.itunes.apple.com";
const SANDBOX_URL: &str = "https://api.storekit-sandbox.itunes.apple.com";
const LOCAL_TESTING_URL: &str = "https://local-testing-base-url";

/// Lifetime of the bearer token minted for each callout. Apple rejects tokens
/// valid for more than an hour.
const TOKEN_LIFETIME_MINUTES: i64 = 5;

#[async_trait]
pub(crate) trait AppStoreServerApiDatasource: Send + Sync {
    /// Get Transaction Info:
    /// https://developer.apple.com/documentation/appstoreserverapi/get_transaction_info
    ///
    /// transactionId:
    ///   The identifier of a transaction that belongs to the customer, and
    ///   which may be an original transaction identifier.
    async fn get_transaction_info(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionInfoResponseModel, IapError>;

    /// Get Transaction History:
    /// https://developer.apple.com/documentation/appstoreserverapi/get_transaction_history
    ///
    /// transactionId:
    ///   The identifier of a transaction that belongs to the customer, and
    ///   which may be an original transaction identifier.
    /// revision:
    ///   The token from the previous page's response. Omit for the first
    ///   page.
    async fn get_transaction_history(
        &self,
        transaction_id: &str,
        revision: Option<&str>,
        request: &TransactionHistoryRequest,
    ) -> Result<HistoryResponseModel, IapError>;
}

pub struct AppStoreServerApiDatasourceImpl {
    client: reqwest::Client,
    base_url: String,
    encoding_key: EncodingKey,
    key_id: String,
    issuer_id: String,
    bundle_id: String,
}

#[async_trait]
impl AppStoreServerApiDatasource for AppStoreServerApiDatasourceImpl {
    async fn get_transaction_info(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionInfoResponseModel, IapError> {
        self.callout(
            &format!("/inApps/v1/transactions/{transaction_id}"),
            &[],
            "GetTransactionInfo",
        )
        .await
    }

    async fn get_transaction_history(
        &self,
        transaction_id: &str,
        revision: Option<&str>,
        request: &TransactionHistoryRequest,
    ) -> Result<HistoryResponseModel, IapError> {
        self.callout(
            &format!("/inApps/v2/history/{transaction_id}"),
            &history_query(revision, request),
            "GetTransactionHistory",
        )
        .await
    }
}

impl AppStoreServerApiDatasourceImpl {
    /// `base_url` overrides the endpoint implied by `environment`.
    pub(crate) fn new(
        signing_key: &str,
        key_id: &str,
        issuer_id: &str,
        bundle_id: &str,
        environment: AppStoreEnvironment,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, IapError> {
        let base_url = match (base_url, environment) {
            (Some(url), _) => url.trim_end_matches('/').to_owned(),
            (None, AppStoreEnvironment::Production) => PRODUCTION_URL.to_owned(),
            (None, AppStoreEnvironment::Sandbox) => SANDBOX_URL.to_owned(),
            (None, AppStoreEnvironment::LocalTesting) => LOCAL_TESTING_URL.to_owned(),
            (None, AppStoreEnvironment::Xcode) => {
                return Err(IapError::Config(
                    "the App Store Server API is not available for the Xcode environment"
                        .to_owned(),
                ))
            }
        };
        let encoding_key = EncodingKey::from_ec_pem(signing_key.as_bytes()).map_err(|e| {
            IapError::ApiKeyInvalid(format!("signing key is not an EC PKCS#8 PEM; {e:?}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IapError::Config(format!("failed to build HTTP client; {e:?}")))?;
        Ok(Self {
            client,
            base_url,
            encoding_key,
            key_id: key_id.to_owned(),
            issuer_id: issuer_id.to_owned(),
            bundle_id: bundle_id.to_owned(),
        })
    }

    fn build_jwt_token(&self) -> Result<String, IapError> {
        // Build header.
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        // Build claims.
        #[derive(Debug, Serialize, Deserialize)]
        struct Claims {
            iss: String,
            iat: i64,
            exp: i64,
            aud: String,
            bid: String,
        }
        let now = chrono::Utc::now();
        let claims = Claims {
            iss: self.issuer_id.clone(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(TOKEN_LIFETIME_MINUTES)).timestamp(),
            aud: "appstoreconnect-v1".to_owned(),
            bid: self.bundle_id.clone(),
        };

        // Build token.
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| IapError::ApiKeyInvalid(format!("failed to build JWT token; {e:?}")))
    }

    async fn callout<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
        function_name: &'static str,
    ) -> Result<T, IapError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(function_name, url = %url, "Calling App Store Server API.");
        let response = self
            .client
            .get(&url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", self.build_jwt_token()?))
            .send()
            .await
            .map_err(|e| IapError::AppStoreServerApi {
                function_name,
                status: None,
                error_code: None,
                message: format!("Callout failed to send; {e:?}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let payload = serde_json::from_str::<ErrorPayloadModel>(&body).ok();
            return Err(IapError::AppStoreServerApi {
                function_name,
                status: Some(status.as_u16()),
                error_code: payload.as_ref().and_then(|p| p.error_code),
                message: format!(
                    "Callout returned with non-200 status code; {}; {}",
                    status,
                    payload.and_then(|p| p.error_message).unwrap_or(body)
                ),
            });
        }

        response.json().await.map_err(|e| {
            IapError::invalid_response(
                function_name,
                format!("Failed to parse callout response; {e:?}"),
            )
        })
    }
}

fn history_query(
    revision: Option<&str>,
    request: &TransactionHistoryRequest,
) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(revision) = revision {
        query.push(("revision", revision.to_owned()));
    }
    if let Some(start_date) = request.start_date {
        query.push(("startDate", start_date.timestamp_millis().to_string()));
    }
    if let Some(end_date) = request.end_date {
        query.push(("endDate", end_date.timestamp_millis().to_string()));
    }
    for product_id in &request.product_ids {
        query.push(("productId", product_id.clone()));
    }
    for product_type in &request.product_types {
        let value = match product_type {
            ProductType::AutoRenewable => "AUTO_RENEWABLE",
            ProductType::NonRenewable => "NON_RENEWABLE",
            ProductType::Consumable => "CONSUMABLE",
            ProductType::NonConsumable => "NON_CONSUMABLE",
        };
        query.push(("productType", value.to_owned()));
    }
    if let Some(sort) = request.sort {
        let value = match sort {
            Order::Ascending => "ASCENDING",
            Order::Descending => "DESCENDING",
        };
        query.push(("sort", value.to_owned()));
    }
    for group in &request.subscription_group_identifiers {
        query.push(("subscriptionGroupIdentifier", group.clone()));
    }
    if let Some(ownership) = request.in_app_ownership_type {
        let value = match ownership {
            InAppOwnershipType::FamilyShared => "FAMILY_SHARED",
            InAppOwnershipType::Purchased => "PURCHASED",
        };
        query.push(("inAppOwnershipType", value.to_owned()));
    }
    if let Some(revoked) = request.revoked {
        query.push(("revoked", revoked.to_string()));
    }
    query
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::test_support::signing_key_pem;

    #[test]
    fn first_page_query_has_no_revision() {
        let query = history_query(None, &TransactionHistoryRequest::consumables());
        assert_eq!(
            query,
            vec![
                ("productType", "CONSUMABLE".to_owned()),
                ("sort", "ASCENDING".to_owned()),
                ("revoked", "false".to_owned()),
            ]
        );
    }

    #[test]
    fn query_carries_every_filter() {
        let request = TransactionHistoryRequest {
            sort: Some(Order::Descending),
            revoked: Some(true),
            product_types: vec![ProductType::AutoRenewable, ProductType::NonConsumable],
            product_ids: vec!["com.example.monthly".to_owned()],
            subscription_group_identifiers: vec!["21000000".to_owned()],
            start_date: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
            end_date: Some(Utc.timestamp_millis_opt(1_800_000_000_000).unwrap()),
            in_app_ownership_type: Some(InAppOwnershipType::FamilyShared),
        };

        let query = history_query(Some("rev-1"), &request);

        assert_eq!(query[0], ("revision", "rev-1".to_owned()));
        assert!(query.contains(&("startDate", "1700000000000".to_owned())));
        assert!(query.contains(&("endDate", "1800000000000".to_owned())));
        assert!(query.contains(&("productType", "AUTO_RENEWABLE".to_owned())));
        assert!(query.contains(&("productType", "NON_CONSUMABLE".to_owned())));
        assert!(query.contains(&("productId", "com.example.monthly".to_owned())));
        assert!(query.contains(&("subscriptionGroupIdentifier", "21000000".to_owned())));
        assert!(query.contains(&("inAppOwnershipType", "FAMILY_SHARED".to_owned())));
        assert!(query.contains(&("sort", "DESCENDING".to_owned())));
        assert!(query.contains(&("revoked", "true".to_owned())));
    }

    #[test]
    fn base_url_follows_environment() {
        let key = signing_key_pem();
        let timeout = Duration::from_secs(5);
        let new = |environment: AppStoreEnvironment, base_url: Option<&'static str>| {
            AppStoreServerApiDatasourceImpl::new(
                &key,
                "KEY",
                "ISSUER",
                "com.example.app",
                environment,
                base_url,
                timeout,
            )
        };

        assert_eq!(
            new(AppStoreEnvironment::Production, None).unwrap().base_url,
            PRODUCTION_URL
        );
        assert_eq!(
            new(AppStoreEnvironment::Sandbox, None).unwrap().base_url,
            SANDBOX_URL
        );
        assert_eq!(
            new(AppStoreEnvironment::Sandbox, Some("http://127.0.0.1:8080/"))
                .unwrap()
                .base_url,
            "http://127.0.0.1:8080"
        );
        assert!(matches!(
            new(AppStoreEnvironment::Xcode, None),
            Err(IapError::Config(_))
        ));
    }

    #[test]
    fn rejects_signing_key_that_is_not_ec_pem() {
        let result = AppStoreServerApiDatasourceImpl::new(
            "not a key",
            "KEY",
            "ISSUER",
            "com.example.app",
            AppStoreEnvironment::Sandbox,
            None,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(IapError::ApiKeyInvalid(_))));
    }

    #[test]
    fn bearer_token_carries_app_store_connect_claims() {
        let datasource = AppStoreServerApiDatasourceImpl::new(
            &signing_key_pem(),
            "KEY123",
            "ISSUER-456",
            "com.example.app",
            AppStoreEnvironment::Sandbox,
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let token = datasource.build_jwt_token().unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, jsonwebtoken::Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("KEY123"));
        let claims: serde_json::Value =
            crate::data::datasources::utils::decode_jws_payload(&token).unwrap();
        assert_eq!(claims["iss"], "ISSUER-456");
        assert_eq!(claims["aud"], "appstoreconnect-v1");
        assert_eq!(claims["bid"], "com.example.app");
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            TOKEN_LIFETIME_MINUTES * 60
        );
    }
}
