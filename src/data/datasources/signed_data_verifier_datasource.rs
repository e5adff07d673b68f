use std::time::Duration;

use async_trait::async_trait;
use chrono::{serde::ts_milliseconds_option, DateTime, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use openssl::{
    error::ErrorStack,
    hash::MessageDigest,
    ocsp::{OcspCertId, OcspCertStatus, OcspFlag, OcspRequest, OcspResponse, OcspResponseStatus},
    stack::Stack,
    x509::{
        store::{X509Store, X509StoreBuilder},
        verify::X509VerifyParam,
        X509StoreContext, X509,
    },
};
use reqwest::header::CONTENT_TYPE;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use crate::{
    data::{
        datasources::utils::{
            decode_jws_payload, decode_x5c_certificate, has_marker_oid,
            INTERMEDIATE_MARKER_OID_DER, LEAF_MARKER_OID_DER,
        },
        models::app_store_server_api::jws_transaction_decoded_payload_model::JwsTransactionDecodedPayloadModel,
    },
    domain::entities::app_store_environment::AppStoreEnvironment,
    errors::IapError,
};

/// Seconds of clock skew tolerated when checking OCSP response freshness.
const OCSP_VALIDITY_LEEWAY_SECS: u32 = 300;

#[async_trait]
pub(crate) trait SignedDataVerifierDatasource: Send + Sync {
    /// Verifies and decodes a JWSTransaction:
    /// https://developer.apple.com/documentation/appstoreserverapi/jwstransaction
    ///
    /// signed_transaction:
    ///   The compact JWS string, as returned by the App Store Server API or
    ///   sent by the device.
    async fn verify_and_decode_transaction(
        &self,
        signed_transaction: &str,
    ) -> Result<JwsTransactionDecodedPayloadModel, IapError>;
}

pub struct SignedDataVerifierDatasourceImpl {
    root_certificates: Vec<X509>,
    environment: AppStoreEnvironment,
    bundle_id: String,
    /// Required in production for parity with Apple's own verifier, but only
    /// checked at construction. Payloads are not matched against it.
    app_apple_id: Option<i64>,
    enable_online_checks: bool,
    /// Used for OCSP callouts.
    http_client: reqwest::Client,
}

#[async_trait]
impl SignedDataVerifierDatasource for SignedDataVerifierDatasourceImpl {
    async fn verify_and_decode_transaction(
        &self,
        signed_transaction: &str,
    ) -> Result<JwsTransactionDecodedPayloadModel, IapError> {
        let transaction: JwsTransactionDecodedPayloadModel =
            if self.environment.is_signed_by_apple() {
                self.verify_signature(signed_transaction).await?
            } else {
                // Xcode and local testing payloads are signed with a local key,
                // so there is no chain to check.
                decode_jws_payload(signed_transaction)?
            };
        let found = transaction.environment.as_str();
        if found != self.environment.as_str() {
            return Err(IapError::InvalidEnvironment {
                expected: self.environment.as_str().to_owned(),
                found: found.to_owned(),
            });
        }
        if transaction.bundle_id != self.bundle_id {
            warn!(
                transaction_id = %transaction.transaction_id,
                bundle_id = %transaction.bundle_id,
                expected_bundle_id = %self.bundle_id,
                "Verified transaction belongs to another app."
            );
        }
        Ok(transaction)
    }
}

impl SignedDataVerifierDatasourceImpl {
    pub(crate) fn new(
        root_certificates: &[Vec<u8>],
        environment: AppStoreEnvironment,
        bundle_id: &str,
        app_apple_id: Option<i64>,
        enable_online_checks: bool,
        timeout: Duration,
    ) -> Result<Self, IapError> {
        if environment == AppStoreEnvironment::Production && app_apple_id.is_none() {
            return Err(IapError::Config(
                "an app Apple ID is required when the environment is Production".to_owned(),
            ));
        }
        let root_certificates = root_certificates
            .iter()
            .map(|der| {
                X509::from_der(der).map_err(|e| {
                    IapError::Config(format!("root certificate is not valid DER; {e:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IapError::Config(format!("failed to build HTTP client; {e:?}")))?;
        Ok(Self {
            root_certificates,
            environment,
            bundle_id: bundle_id.to_owned(),
            app_apple_id,
            enable_online_checks,
            http_client,
        })
    }

    async fn verify_signature<T: DeserializeOwned>(&self, signed: &str) -> Result<T, IapError> {
        let header = jsonwebtoken::decode_header(signed)
            .map_err(|e| IapError::InvalidJws(format!("failed to parse JWS header; {e:?}")))?;
        if header.alg != Algorithm::ES256 {
            return Err(IapError::invalid_signature("algorithm", header.alg));
        }
        let x5c = header.x5c.unwrap_or_default();
        let [leaf, intermediate, _root] = x5c.as_slice() else {
            return Err(IapError::InvalidAppleSignature(format!(
                "expected an x5c chain of 3 certificates, got {}",
                x5c.len()
            )));
        };
        let leaf = decode_x5c_certificate(leaf)?;
        let intermediate = decode_x5c_certificate(intermediate)?;

        let effective_time = if self.enable_online_checks {
            Utc::now()
        } else {
            decode_jws_payload::<SignedDateClaim>(signed)?
                .signed_date
                .unwrap_or_else(Utc::now)
        };
        let chain = self.verify_certificate_chain(&leaf, &intermediate, effective_time)?;

        if self.enable_online_checks {
            let root = chain.get(2).ok_or_else(|| {
                IapError::InvalidAppleSignature("verified chain has no root".to_owned())
            })?;
            self.check_ocsp_status(&leaf, &intermediate).await?;
            self.check_ocsp_status(&intermediate, root).await?;
        }

        let public_key = leaf
            .public_key()
            .and_then(|key| key.public_key_to_pem())
            .map_err(|e| IapError::invalid_signature("leaf public key", e))?;
        let key = DecodingKey::from_ec_pem(&public_key)
            .map_err(|e| IapError::invalid_signature("leaf public key", e))?;
        let mut validation = Validation::new(Algorithm::ES256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        let data = jsonwebtoken::decode::<T>(signed, &key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::Json(_) | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                    IapError::InvalidJws(format!("failed to parse JWS payload; {e:?}"))
                }
                _ => IapError::invalid_signature("signature", &e),
            }
        })?;
        debug!(
            app_apple_id = ?self.app_apple_id,
            effective_time = %effective_time,
            "Verified signed payload."
        );
        Ok(data.claims)
    }

    /// Checks `leaf <- intermediate <- configured root` as of
    /// `effective_time`, and returns the verified chain, leaf first.
    fn verify_certificate_chain(
        &self,
        leaf: &X509,
        intermediate: &X509,
        effective_time: DateTime<Utc>,
    ) -> Result<Vec<X509>, IapError> {
        if !has_marker_oid(leaf, LEAF_MARKER_OID_DER)? {
            return Err(IapError::InvalidAppleSignature(
                "leaf certificate is missing the App Store marker OID".to_owned(),
            ));
        }
        if !has_marker_oid(intermediate, INTERMEDIATE_MARKER_OID_DER)? {
            return Err(IapError::InvalidAppleSignature(
                "intermediate certificate is missing the WWDR marker OID".to_owned(),
            ));
        }

        let chain_error = |e: ErrorStack| IapError::invalid_signature("certificate chain", e);
        let store = self.trust_store(effective_time).map_err(chain_error)?;
        let mut untrusted = Stack::new().map_err(chain_error)?;
        untrusted.push(intermediate.clone()).map_err(chain_error)?;
        let mut context = X509StoreContext::new().map_err(chain_error)?;
        let outcome = context
            .init(&store, leaf, &untrusted, |c| {
                if c.verify_cert()? {
                    let chain: Vec<X509> = c
                        .chain()
                        .map(|chain| chain.iter().map(|cert| cert.to_owned()).collect())
                        .unwrap_or_default();
                    Ok(Ok(chain))
                } else {
                    Ok(Err(c.error()))
                }
            })
            .map_err(chain_error)?;
        outcome.map_err(|e| {
            IapError::InvalidAppleSignature(format!("certificate chain rejected; {e}"))
        })
    }

    fn trust_store(&self, effective_time: DateTime<Utc>) -> Result<X509Store, ErrorStack> {
        let mut builder = X509StoreBuilder::new()?;
        for root in &self.root_certificates {
            builder.add_cert(root.clone())?;
        }
        let mut param = X509VerifyParam::new()?;
        param.set_time(effective_time.timestamp() as _);
        builder.set_param(&param)?;
        Ok(builder.build())
    }

    /// Asks the certificate's OCSP responder whether it has been revoked.
    async fn check_ocsp_status(&self, subject: &X509, issuer: &X509) -> Result<(), IapError> {
        let ocsp_error = |e: ErrorStack| IapError::invalid_signature("OCSP request", e);
        let (responder, request) = {
            // No authorityInfoAccess extension reads as an error stack.
            let responder = subject
                .ocsp_responders()
                .ok()
                .and_then(|responders| responders.iter().next().map(|url| url.to_string()))
                .ok_or_else(|| {
                    IapError::InvalidAppleSignature(
                        "certificate names no OCSP responder".to_owned(),
                    )
                })?;
            let mut request = OcspRequest::new().map_err(ocsp_error)?;
            request
                .add_id(
                    OcspCertId::from_cert(MessageDigest::sha1(), subject, issuer)
                        .map_err(ocsp_error)?,
                )
                .map_err(ocsp_error)?;
            (responder, request.to_der().map_err(ocsp_error)?)
        };

        debug!(responder = %responder, "Checking certificate revocation status.");
        let response = self
            .http_client
            .post(&responder)
            .header(CONTENT_TYPE, "application/ocsp-request")
            .body(request)
            .send()
            .await
            .map_err(|e| IapError::invalid_signature("OCSP callout failed to send", e))?;
        if !response.status().is_success() {
            return Err(IapError::invalid_signature(
                "OCSP callout returned with non-200 status code",
                response.status(),
            ));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| IapError::invalid_signature("OCSP response could not be read", e))?;
        self.evaluate_ocsp_response(&body, subject, issuer)
    }

    fn evaluate_ocsp_response(
        &self,
        body: &[u8],
        subject: &X509,
        issuer: &X509,
    ) -> Result<(), IapError> {
        let ocsp_error = |e: ErrorStack| IapError::invalid_signature("OCSP response", e);
        let response = OcspResponse::from_der(body).map_err(ocsp_error)?;
        if response.status() != OcspResponseStatus::SUCCESSFUL {
            return Err(IapError::invalid_signature(
                "OCSP responder status",
                response.status().as_raw(),
            ));
        }
        let basic = response.basic().map_err(ocsp_error)?;
        let mut certs = Stack::new().map_err(ocsp_error)?;
        certs.push(issuer.clone()).map_err(ocsp_error)?;
        let store = self.trust_store(Utc::now()).map_err(ocsp_error)?;
        basic
            .verify(&certs, &store, OcspFlag::empty())
            .map_err(ocsp_error)?;

        let id = OcspCertId::from_cert(MessageDigest::sha1(), subject, issuer).map_err(ocsp_error)?;
        let status = basic.find_status(&id).ok_or_else(|| {
            IapError::InvalidAppleSignature(
                "OCSP response does not cover the certificate".to_owned(),
            )
        })?;
        status
            .check_validity(OCSP_VALIDITY_LEEWAY_SECS, None)
            .map_err(ocsp_error)?;
        if status.status != OcspCertStatus::GOOD {
            return Err(IapError::invalid_signature(
                "certificate is not in good standing",
                status.status.as_raw(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedDateClaim {
    #[serde(default, with = "ts_milliseconds_option")]
    signed_date: Option<DateTime<Utc>>,
}
