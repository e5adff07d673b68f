use std::{fmt, str::FromStr};

use crate::errors::IapError;

/// The App Store environment the signing authority and the verifier must agree
/// on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStoreEnvironment {
    Production,
    Sandbox,
    /// Transactions signed locally by Xcode's StoreKit testing. These carry no
    /// Apple certificate chain, and there is no server API for them.
    Xcode,
    LocalTesting,
}

impl AppStoreEnvironment {
    /// The value Apple uses for the `environment` field of signed payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStoreEnvironment::Production => "Production",
            AppStoreEnvironment::Sandbox => "Sandbox",
            AppStoreEnvironment::Xcode => "Xcode",
            AppStoreEnvironment::LocalTesting => "LocalTesting",
        }
    }

    /// Whether signed payloads from this environment carry a certificate
    /// chain that can be checked.
    pub(crate) fn is_signed_by_apple(&self) -> bool {
        matches!(
            self,
            AppStoreEnvironment::Production | AppStoreEnvironment::Sandbox
        )
    }
}

impl fmt::Display for AppStoreEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppStoreEnvironment {
    type Err = IapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "production" => Ok(AppStoreEnvironment::Production),
            "sandbox" => Ok(AppStoreEnvironment::Sandbox),
            "xcode" => Ok(AppStoreEnvironment::Xcode),
            "localtesting" => Ok(AppStoreEnvironment::LocalTesting),
            _ => Err(IapError::Config(format!("unknown environment '{s}'"))),
        }
    }
}
