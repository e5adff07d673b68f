#![allow(dead_code)]

use serde::Deserialize;
use serde_repr::Deserialize_repr;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) enum Environment {
    /// Indicates that the data applies to testing in the sandbox environment.
    Sandbox,
    /// Indicates that the data applies to the production environment.
    Production,
    /// Indicates that the data applies to StoreKit testing in Xcode.
    Xcode,
    /// Indicates that the data applies to local testing against a mock server.
    LocalTesting,

    #[serde(untagged)]
    Unknown(String),
}

impl Environment {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Environment::Sandbox => "Sandbox",
            Environment::Production => "Production",
            Environment::Xcode => "Xcode",
            Environment::LocalTesting => "LocalTesting",
            Environment::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum OfferDiscountType {
    /// A payment mode of a product discount that indicates a free trial.
    FreeTrial,
    /// A payment mode of a product discount that customers pay over a single or
    /// multiple billing periods.
    PayAsYouGo,
    /// A payment mode of a product discount that customers pay up front.
    PayUpFront,

    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Deserialize_repr)]
#[repr(u8)]
pub(crate) enum OfferType {
    /// An introductory offer.
    Introductory = 1,
    /// A promotional offer.
    Promotional = 2,
    /// An offer with a subscription offer code.
    OfferCode = 3,
    /// A win-back offer.
    WinBack = 4,
}
