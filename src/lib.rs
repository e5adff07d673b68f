pub(crate) mod data {
    pub(crate) mod datasources {
        pub(crate) mod app_store_server_api_datasource;
        pub(crate) mod root_certificate_datasource;
        pub(crate) mod signed_data_verifier_datasource;
        mod utils;
    }
    pub(crate) mod models {
        pub(crate) mod app_store_server_api {
            pub(crate) mod common;
            pub(crate) mod error_payload_model;
            pub(crate) mod history_response_model;
            pub(crate) mod jws_transaction_decoded_payload_model;
            pub(crate) mod transaction_info_response_model;
        }
    }
    pub(crate) mod repositories {
        pub(crate) mod entitlement_repository_impl;
    }
}

pub mod domain {
    pub mod entities {
        pub mod app_store_environment;
        pub mod entitlement_status;
        pub mod transaction_history_request;
        pub mod verified_transaction;
    }
    pub mod repositories {
        pub mod entitlement_repository;
    }
}

pub mod config;
pub mod errors;
pub mod util;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod test_support;
