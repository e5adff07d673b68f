//! Throwaway certificate chains and signed payloads shaped like the ones the
//! App Store produces. Shared by the integration tests and the crate's unit
//! tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openssl::{
    asn1::{Asn1Object, Asn1OctetString, Asn1Time},
    bn::BigNum,
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    x509::{
        extension::{BasicConstraints, KeyUsage},
        X509Builder, X509Extension, X509NameBuilder, X509,
    },
};
use serde_json::{json, Value};

pub const LEAF_MARKER_OID: &str = "1.2.840.113635.100.6.11.1";
pub const INTERMEDIATE_MARKER_OID: &str = "1.2.840.113635.100.6.2.1";

const AUTHORITY_INFO_ACCESS_OID: &str = "1.3.6.1.5.5.7.1.1";
/// DER of id-ad-ocsp (1.3.6.1.5.5.7.48.1).
const OCSP_ACCESS_METHOD_DER: &[u8] = &[0x06, 0x08, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01];
/// ASN.1 NULL, used as the value of the marker extensions.
const NULL_DER: &[u8] = &[0x05, 0x00];

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);

pub struct TestCertificateChain {
    pub root: X509,
    pub intermediate: X509,
    pub leaf: X509,
    leaf_key: PKey<Private>,
}

impl TestCertificateChain {
    pub fn generate() -> Self {
        Self::build(true, None)
    }

    pub fn generate_without_leaf_marker() -> Self {
        Self::build(false, None)
    }

    /// The leaf names `url` as its OCSP responder.
    pub fn generate_with_ocsp_responder(url: &str) -> Self {
        Self::build(true, Some(url))
    }

    fn build(leaf_marker: bool, ocsp_responder: Option<&str>) -> Self {
        let root_key = ec_key();
        let root = certificate("Test Root CA", &root_key, None, true, Vec::new());
        let intermediate_key = ec_key();
        let intermediate = certificate(
            "Test Worldwide Developer Relations",
            &intermediate_key,
            Some((&root, &root_key)),
            true,
            vec![extension(INTERMEDIATE_MARKER_OID, NULL_DER)],
        );

        let mut leaf_extensions = Vec::new();
        if leaf_marker {
            leaf_extensions.push(extension(LEAF_MARKER_OID, NULL_DER));
        }
        if let Some(url) = ocsp_responder {
            leaf_extensions.push(authority_info_access(url));
        }
        let leaf_key = ec_key();
        let leaf = certificate(
            "Test StoreKit Signing",
            &leaf_key,
            Some((&intermediate, &intermediate_key)),
            false,
            leaf_extensions,
        );
        Self {
            root,
            intermediate,
            leaf,
            leaf_key,
        }
    }

    pub fn root_der(&self) -> Vec<u8> {
        self.root.to_der().unwrap()
    }

    /// Signs `claims` with the leaf key, carrying the whole chain in `x5c`.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.x5c = Some(
            [&self.leaf, &self.intermediate, &self.root]
                .iter()
                .map(|certificate| STANDARD.encode(certificate.to_der().unwrap()))
                .collect(),
        );
        self.encode(&header, claims)
    }

    pub fn sign_without_chain(&self, claims: &Value) -> String {
        self.encode(&Header::new(Algorithm::ES256), claims)
    }

    fn encode(&self, header: &Header, claims: &Value) -> String {
        let key = EncodingKey::from_ec_pem(&self.leaf_key.private_key_to_pem_pkcs8().unwrap())
            .unwrap();
        jsonwebtoken::encode(header, claims, &key).unwrap()
    }
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// A fresh App Store Connect style `.p8` key.
pub fn signing_key_pem() -> String {
    String::from_utf8(ec_key().private_key_to_pem_pkcs8().unwrap()).unwrap()
}

pub fn transaction_claims(transaction_id: &str, bundle_id: &str, environment: &str) -> Value {
    let now = chrono::Utc::now().timestamp_millis();
    json!({
        "transactionId": transaction_id,
        "originalTransactionId": transaction_id,
        "bundleId": bundle_id,
        "productId": "com.example.coins_100",
        "purchaseDate": now - 60_000,
        "originalPurchaseDate": now - 60_000,
        "signedDate": now,
        "quantity": 1,
        "type": "Consumable",
        "inAppOwnershipType": "PURCHASED",
        "transactionReason": "PURCHASE",
        "environment": environment,
        "storefront": "USA",
        "storefrontId": "143441",
        "currency": "USD",
        "price": 990,
    })
}

/// A non-critical extension whose value is the DER in `contents`.
pub fn extension(oid: &str, contents: &[u8]) -> X509Extension {
    let oid = Asn1Object::from_str(oid).unwrap();
    let contents = Asn1OctetString::new_from_bytes(contents).unwrap();
    X509Extension::new_from_der(&oid, false, &contents).unwrap()
}

pub fn self_signed_certificate(extensions: Vec<X509Extension>) -> X509 {
    certificate("Test Certificate", &ec_key(), None, false, extensions)
}

/// authorityInfoAccess with a single OCSP access description.
fn authority_info_access(url: &str) -> X509Extension {
    let url = url.as_bytes();
    assert!(url.len() < 100, "responder URL too long for short-form DER");
    let mut access_description = OCSP_ACCESS_METHOD_DER.to_vec();
    access_description.extend_from_slice(&[0x86, url.len() as u8]);
    access_description.extend_from_slice(url);
    let description = der_sequence(&access_description);
    extension(AUTHORITY_INFO_ACCESS_OID, &der_sequence(&description))
}

fn der_sequence(contents: &[u8]) -> Vec<u8> {
    let mut sequence = vec![0x30, contents.len() as u8];
    sequence.extend_from_slice(contents);
    sequence
}

fn certificate(
    common_name: &str,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    is_ca: bool,
    extensions: Vec<X509Extension>,
) -> X509 {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(NEXT_SERIAL.fetch_add(1, Ordering::Relaxed))
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    let name = name.build();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((issuer_certificate, _)) => builder
            .set_issuer_name(issuer_certificate.subject_name())
            .unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();

    let yesterday = chrono::Utc::now().timestamp() - 24 * 60 * 60;
    builder
        .set_not_before(&Asn1Time::from_unix(yesterday as _).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();

    if is_ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
    } else {
        builder
            .append_extension(BasicConstraints::new().critical().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
            .unwrap();
    }
    for extension in extensions {
        builder.append_extension(extension).unwrap();
    }

    let signing_key = issuer.map(|(_, issuer_key)| issuer_key).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}
