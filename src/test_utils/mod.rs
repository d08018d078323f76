#![allow(missing_docs)]

use std::sync::Arc;

use axum_test::TestServer;
use rusqlite::Connection;

use crate::{
    AppState, PaginationConfig, build_router,
    config::{Config, PlaidConfig, PlaidEnvironment, SyncConfig},
    plaid::test_client::FakePlaid,
};

/// Settings for tests: sandbox credentials, a local frontend and no webhook secret.
pub(crate) fn test_config() -> Config {
    Config {
        plaid: PlaidConfig {
            environment: PlaidEnvironment::Sandbox,
            client_id: "test-client-id".to_owned(),
            secret: "test-secret".to_owned(),
            client_name: "Fintrack".to_owned(),
            client_user_id: "fintrack-owner".to_owned(),
            webhook_url: None,
            country_codes: vec!["US".to_owned()],
        },
        sync: SyncConfig::default(),
        frontend_url: "http://localhost:3000".to_owned(),
        webhook_secret: None,
    }
}

/// A server backed by an in-memory database and a [FakePlaid] with no scripted responses.
pub(crate) fn test_server() -> (TestServer, AppState) {
    test_server_with(Arc::new(FakePlaid::default()))
}

pub(crate) fn test_server_with(plaid: Arc<FakePlaid>) -> (TestServer, AppState) {
    test_server_with_config(plaid, test_config())
}

pub(crate) fn test_server_with_config(
    plaid: Arc<FakePlaid>,
    config: Config,
) -> (TestServer, AppState) {
    let conn = Connection::open_in_memory().expect("Could not open database in memory.");
    let state = AppState::new(
        conn,
        config,
        plaid,
        "Etc/UTC",
        PaginationConfig::default(),
    )
    .expect("Could not create app state.");

    let server = TestServer::new(build_router(state.clone()));

    (server, state)
}
