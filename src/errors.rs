use std::path::PathBuf;

use thiserror::Error;

use crate::domain::entities::verified_transaction::VerifiedTransaction;

#[derive(Debug, Error)]
pub enum IapError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read '{}'.", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid API key: {0}")]
    ApiKeyInvalid(String),

    /// The callout failed to send, or the App Store Server API answered with a
    /// non-success status. When the body carried Apple's error payload, its
    /// numeric code is kept in `error_code`.
    #[error("Error calling out to App Store Server API ({function_name}): {message}")]
    AppStoreServerApi {
        function_name: &'static str,
        status: Option<u16>,
        error_code: Option<i64>,
        message: String,
    },

    #[error("App Store Server API returned an invalid response ({function_name}): {message}")]
    AppStoreServerApiInvalidResponse {
        function_name: &'static str,
        message: String,
    },

    #[error("Invalid JWS: {0}")]
    InvalidJws(String),

    #[error("Invalid Apple signature: {0}")]
    InvalidAppleSignature(String),

    #[error("Signed payload is for environment '{found}', expected '{expected}'.")]
    InvalidEnvironment { expected: String, found: String },

    /// Transaction history could not be walked to the end. `partial` holds
    /// every transaction verified before the failure, in page order.
    #[error("Transaction history walk aborted after {pages_fetched} page(s): {source}")]
    HistoryWalkAborted {
        partial: Vec<VerifiedTransaction>,
        pages_fetched: usize,
        #[source]
        source: Box<IapError>,
    },
}

impl IapError {
    pub(crate) fn invalid_response(function_name: &'static str, message: impl Into<String>) -> Self {
        IapError::AppStoreServerApiInvalidResponse {
            function_name,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_signature(what: &str, debug: impl std::fmt::Debug) -> Self {
        IapError::InvalidAppleSignature(format!("{what}; {debug:?}"))
    }
}
