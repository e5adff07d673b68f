#![allow(dead_code)]

use serde::Deserialize;

use super::common::Environment;

type JwsTransaction = String;

/// One page of a customer's transaction history, returned by the App Store
/// Server API.
///
/// https://developer.apple.com/documentation/appstoreserverapi/historyresponse
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryResponseModel {
    /// A token you use in a query to request the next set of transactions for
    /// the customer.
    pub(crate) revision: Option<String>,
    /// A Boolean value indicating whether the App Store has more transaction
    /// data.
    #[serde(default)]
    pub(crate) has_more: bool,
    /// The bundle identifier of an app.
    pub(crate) bundle_id: Option<String>,
    /// The unique identifier of an app in the App Store.
    pub(crate) app_apple_id: Option<i64>,
    /// The server environment in which you’re making the request, whether
    /// sandbox or production.
    pub(crate) environment: Option<Environment>,
    /// An array of in-app purchase transactions for the customer, signed by
    /// Apple, in JSON Web Signature format.
    #[serde(default)]
    pub(crate) signed_transactions: Vec<JwsTransaction>,
}
