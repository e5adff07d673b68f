use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use openssl::x509::X509;
use serde::de::DeserializeOwned;

use crate::errors::IapError;

/// DER encoding of OID 1.2.840.113635.100.6.11.1, carried by the leaf
/// certificate Apple signs App Store payloads with.
pub(crate) const LEAF_MARKER_OID_DER: &[u8] = &[
    0x06, 0x0A, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x63, 0x64, 0x06, 0x0B, 0x01,
];

/// DER encoding of OID 1.2.840.113635.100.6.2.1, carried by Apple's WWDR
/// intermediate certificate.
pub(crate) const INTERMEDIATE_MARKER_OID_DER: &[u8] = &[
    0x06, 0x0A, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x63, 0x64, 0x06, 0x02, 0x01,
];

/// Decodes the payload from a compact JWS, without performing any signature
/// verification.
pub(crate) fn decode_jws_payload<T: DeserializeOwned>(jws: &str) -> Result<T, IapError> {
    let mut parts = jws.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(IapError::InvalidJws(
            "expected three dot-separated parts".to_owned(),
        ));
    };
    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IapError::InvalidJws(format!("payload is not base64url; {e:?}")))?;
    serde_json::from_slice(&payload)
        .map_err(|e| IapError::InvalidJws(format!("failed to parse JWS payload; {e:?}")))
}

/// Decodes one entry of a JWS `x5c` header (standard base64 DER).
pub(crate) fn decode_x5c_certificate(encoded: &str) -> Result<X509, IapError> {
    let der = STANDARD
        .decode(encoded)
        .map_err(|e| IapError::invalid_signature("x5c entry is not base64", e))?;
    X509::from_der(&der).map_err(|e| IapError::invalid_signature("x5c entry is not DER", e))
}

/// Whether the certificate carries an extension identified by `oid_der` (the
/// DER-encoded OID, tag and length included).
pub(crate) fn has_marker_oid(certificate: &X509, oid_der: &[u8]) -> Result<bool, IapError> {
    let der = certificate
        .to_der()
        .map_err(|e| IapError::invalid_signature("certificate could not be encoded", e))?;
    let oids = extension_oids(&der).ok_or_else(|| {
        IapError::InvalidAppleSignature("certificate extensions are not valid DER".to_owned())
    })?;
    Ok(oids.iter().any(|oid| *oid == oid_der))
}

const SEQUENCE: u8 = 0x30;
const OBJECT_IDENTIFIER: u8 = 0x06;
/// `[3] EXPLICIT Extensions` in a TBSCertificate.
const EXTENSIONS: u8 = 0xA3;

/// OIDs of the certificate's extensions, in order. `None` if the DER is
/// malformed.
fn extension_oids(certificate: &[u8]) -> Option<Vec<&[u8]>> {
    let (_, certificate, _) = read_expected(certificate, SEQUENCE)?;
    let (_, mut fields, _) = read_expected(certificate, SEQUENCE)?;
    while !fields.is_empty() {
        let (tag, _, contents, rest) = read_element(fields)?;
        fields = rest;
        if tag != EXTENSIONS {
            continue;
        }
        let (_, mut extensions, _) = read_expected(contents, SEQUENCE)?;
        let mut oids = Vec::new();
        while !extensions.is_empty() {
            let (_, extension, rest) = read_expected(extensions, SEQUENCE)?;
            extensions = rest;
            let (oid, _, _) = read_expected(extension, OBJECT_IDENTIFIER)?;
            oids.push(oid);
        }
        return Some(oids);
    }
    Some(Vec::new())
}

/// Splits the first DER element off `input` as (tag, whole element,
/// contents, rest).
fn read_element(input: &[u8]) -> Option<(u8, &[u8], &[u8], &[u8])> {
    let (&tag, after_tag) = input.split_first()?;
    let (&first, after_length) = after_tag.split_first()?;
    let (length, header_length) = if first < 0x80 {
        (first as usize, 2)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return None;
        }
        let bytes = after_length.get(..count)?;
        let length = bytes
            .iter()
            .fold(0usize, |length, byte| (length << 8) | *byte as usize);
        (length, 2 + count)
    };
    let end = header_length.checked_add(length)?;
    let element = input.get(..end)?;
    Some((tag, element, &element[header_length..], &input[end..]))
}

fn read_expected(input: &[u8], tag: u8) -> Option<(&[u8], &[u8], &[u8])> {
    let (found, element, contents, rest) = read_element(input)?;
    (found == tag).then_some((element, contents, rest))
}
