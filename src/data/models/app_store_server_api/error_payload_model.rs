use serde::Deserialize;

/// Body returned by the App Store Server API alongside a non-success status.
///
/// https://developer.apple.com/documentation/appstoreserverapi/error_codes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorPayloadModel {
    pub(crate) error_code: Option<i64>,
    pub(crate) error_message: Option<String>,
}
