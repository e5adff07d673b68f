use std::{path::PathBuf, time::Duration};

use crate::{
    domain::entities::app_store_environment::AppStoreEnvironment, errors::IapError,
};

pub const APPLE_KEY_ID: &str = "APPLE_KEY_ID";
pub const APPLE_ISSUER_ID: &str = "APPLE_ISSUER_ID";
pub const APPLE_BUNDLE_ID: &str = "APPLE_BUNDLE_ID";
pub const APPLE_APP_APPLE_ID: &str = "APPLE_APP_APPLE_ID";
pub const APPLE_ENVIRONMENT: &str = "APPLE_ENVIRONMENT";
pub const APPLE_PRIVATE_KEY_PATH: &str = "APPLE_PRIVATE_KEY_PATH";
pub const APPLE_ROOT_CERTIFICATE_PATHS: &str = "APPLE_ROOT_CERTIFICATE_PATHS";
pub const APPLE_ENABLE_ONLINE_CHECKS: &str = "APPLE_ENABLE_ONLINE_CHECKS";
pub const APPLE_API_BASE_URL: &str = "APPLE_API_BASE_URL";
pub const APPLE_TIMEOUT_SECS: &str = "APPLE_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything needed to talk to the App Store Server API and to verify what it
/// returns. Passed explicitly to `IapUtil::new`.
#[derive(Debug, Clone)]
pub struct IapConfig {
    /// Private key ID from App Store Connect.
    pub key_id: String,
    /// Issuer ID from the Keys page in App Store Connect.
    pub issuer_id: String,
    pub bundle_id: String,
    /// The app's Apple ID. Required in production.
    pub app_apple_id: Option<i64>,
    pub environment: AppStoreEnvironment,
    /// Path to the `.p8` API key downloaded from App Store Connect.
    pub private_key_path: PathBuf,
    /// Paths to Apple's DER-encoded root certificates.
    pub root_certificate_paths: Vec<PathBuf>,
    /// Check certificate revocation over OCSP, and validate certificates
    /// against the current time instead of the payload's signing time.
    pub enable_online_checks: bool,
    /// Overrides the API endpoint implied by `environment`.
    pub base_url: Option<String>,
    /// Applies to API and OCSP callouts.
    pub timeout: Duration,
}

impl IapConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `APPLE_KEY_ID`, `APPLE_ISSUER_ID`, `APPLE_BUNDLE_ID`,
    /// `APPLE_PRIVATE_KEY_PATH`, `APPLE_ROOT_CERTIFICATE_PATHS`
    /// (comma-separated).
    ///
    /// Optional: `APPLE_APP_APPLE_ID`, `APPLE_ENVIRONMENT` (default
    /// `Production`), `APPLE_ENABLE_ONLINE_CHECKS` (default `true`),
    /// `APPLE_API_BASE_URL`, `APPLE_TIMEOUT_SECS` (default 30).
    pub fn from_env() -> Result<Self, IapError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, IapError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| IapError::Config(format!("{key} is not set")))
        };

        let root_certificate_paths: Vec<PathBuf> = required(APPLE_ROOT_CERTIFICATE_PATHS)?
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect();

        Ok(Self {
            key_id: required(APPLE_KEY_ID)?,
            issuer_id: required(APPLE_ISSUER_ID)?,
            bundle_id: required(APPLE_BUNDLE_ID)?,
            app_apple_id: optional(APPLE_APP_APPLE_ID)
                .map(|value| parse(APPLE_APP_APPLE_ID, &value))
                .transpose()?,
            environment: optional(APPLE_ENVIRONMENT)
                .map(|value| value.parse::<AppStoreEnvironment>())
                .transpose()?
                .unwrap_or(AppStoreEnvironment::Production),
            private_key_path: PathBuf::from(required(APPLE_PRIVATE_KEY_PATH)?),
            root_certificate_paths,
            enable_online_checks: optional(APPLE_ENABLE_ONLINE_CHECKS)
                .map(|value| parse(APPLE_ENABLE_ONLINE_CHECKS, &value))
                .transpose()?
                .unwrap_or(true),
            base_url: optional(APPLE_API_BASE_URL),
            timeout: Duration::from_secs(
                optional(APPLE_TIMEOUT_SECS)
                    .map(|value| parse(APPLE_TIMEOUT_SECS, &value))
                    .transpose()?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, IapError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| IapError::Config(format!("{key} is invalid ('{value}'): {e}")))
}
