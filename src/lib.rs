//! Fintrack is a personal finance backend.
//!
//! It links bank accounts through Plaid, keeps a local copy of institutions,
//! accounts, transactions and investment holdings in SQLite, and serves
//! spending and net worth analytics as a JSON API.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod account;
mod analytics;
mod app_state;
mod category;
mod config;
mod currency;
mod database_id;
mod db;
mod endpoints;
mod extract;
mod institution;
mod investment;
mod link;
mod logging;
mod pagination;
mod plaid;
mod recurring;
mod routing;
mod sync;
mod timezone;
mod transaction;
mod webhook;

#[cfg(test)]
mod test_utils;

pub use analytics::{record_net_worth_snapshot, transaction_counts};
pub use app_state::AppState;
pub use category::seed_default_categories;
pub use config::{Config, PlaidConfig, PlaidEnvironment, SyncConfig};
pub use db::initialize as initialize_db;
pub use institution::{InstitutionId, get_all_institutions};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use pagination::PaginationConfig;
pub use plaid::{PlaidApi, PlaidClient, PlaidError};
pub use routing::build_router;
pub use sync::{MAX_BACKFILL_DAYS, backfill_transactions, refresh_institution};
pub use timezone::local_today;
pub use webhook::get_recent_webhooks;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Could not listen for ctrl+c: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Could not listen for the terminate signal: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The request body or query string failed validation.
    #[error("{0}")]
    Validation(String),

    /// A spending category with the same name already exists.
    #[error("a spending category named \"{0}\" already exists")]
    DuplicateCategoryName(String),

    /// The institution was created by hand and has no Plaid item to sync.
    #[error("manual institutions cannot be synced with Plaid")]
    ManualInstitution,

    /// An investment operation was requested for an institution without
    /// investment accounts.
    #[error("institution has no investment accounts")]
    NoInvestmentAccounts,

    /// The shared secret on an incoming webhook did not match.
    #[error("invalid webhook secret")]
    InvalidWebhookSecret,

    /// A request to Plaid failed.
    #[error("Plaid request failed: {0}")]
    Plaid(#[from] plaid::PlaidError),

    /// Plaid kept changing the transaction set while the sync loop was
    /// paginating, even after restarting.
    #[error("transactions changed during pagination {0} times, giving up")]
    SyncRestartLimit(u32),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// A required setting was missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing a struct as JSON
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("spending_category.name") =>
            {
                Error::DuplicateCategoryName(String::new())
            }
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(_)) if sql_error.extended_code == 787 => {
                Error::NotFound
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Validation(_)
            | Error::DuplicateCategoryName(_)
            | Error::ManualInstitution
            | Error::NoInvestmentAccounts => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::InvalidWebhookSecret => (StatusCode::FORBIDDEN, self.to_string()),
            Error::Plaid(error) => {
                tracing::error!("Plaid request failed: {error}");
                (StatusCode::BAD_GATEWAY, error.user_message())
            }
            Error::InvalidTimezoneError(timezone) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "Could not get local timezone \"{timezone}\". Check your server settings and \
                    ensure the timezone has been set to valid, canonical timezone string"
                ),
            ),
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred, check the server logs for more details."
                        .to_owned(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
