//! Settings read from the environment.

use std::{env, str::FromStr};

use crate::Error;

/// The Plaid deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaidEnvironment {
    /// Test credentials and fake institutions.
    #[default]
    Sandbox,
    Development,
    Production,
}

impl PlaidEnvironment {
    /// The API host for this environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            PlaidEnvironment::Sandbox => "https://sandbox.plaid.com",
            PlaidEnvironment::Development => "https://development.plaid.com",
            PlaidEnvironment::Production => "https://production.plaid.com",
        }
    }
}

impl FromStr for PlaidEnvironment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Ok(PlaidEnvironment::Sandbox),
            "development" => Ok(PlaidEnvironment::Development),
            "production" => Ok(PlaidEnvironment::Production),
            other => Err(Error::Config(format!(
                "PLAID_ENV must be one of sandbox, development or production, got \"{other}\""
            ))),
        }
    }
}

/// Credentials and Link settings for the Plaid API.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaidConfig {
    pub environment: PlaidEnvironment,
    pub client_id: String,
    pub secret: String,
    /// The application name shown to the user inside Plaid Link.
    pub client_name: String,
    /// The stable identifier Plaid uses for the owner of this deployment.
    pub client_user_id: String,
    /// Where Plaid should deliver webhooks for linked items.
    pub webhook_url: Option<String>,
    pub country_codes: Vec<String>,
}

/// Tuning for the sync loops.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// How far back to fetch transactions the first time an item is synced.
    pub backfill_days: i64,
    /// How far back to fetch investment transactions.
    pub investment_history_days: i64,
    /// Page size for offset paginated Plaid endpoints.
    pub page_size: u32,
    /// How many times a sync may restart after Plaid reports a mutation
    /// during pagination.
    pub max_sync_restarts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backfill_days: 730,
            investment_history_days: 365,
            page_size: 500,
            max_sync_restarts: 3,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub plaid: PlaidConfig,
    pub sync: SyncConfig,
    /// The URL the frontend is served from.
    pub frontend_url: String,
    /// The shared secret incoming webhooks must present, if any.
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Read the settings from environment variables.
    ///
    /// # Errors
    /// Returns [Error::Config] if `PLAID_CLIENT_ID` or `PLAID_SECRET` is
    /// missing or `PLAID_ENV` is not a known environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the settings from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            non_empty(key).ok_or_else(|| Error::Config(format!("{key} must be set")))
        };

        let environment = match non_empty("PLAID_ENV") {
            Some(value) => value.parse()?,
            None => PlaidEnvironment::default(),
        };

        let plaid = PlaidConfig {
            environment,
            client_id: required("PLAID_CLIENT_ID")?,
            secret: required("PLAID_SECRET")?,
            client_name: non_empty("PLAID_CLIENT_NAME").unwrap_or_else(|| "Fintrack".to_owned()),
            client_user_id: non_empty("PLAID_CLIENT_USER_ID")
                .unwrap_or_else(|| "fintrack-owner".to_owned()),
            webhook_url: non_empty("PLAID_WEBHOOK_URL"),
            country_codes: vec!["US".to_owned()],
        };

        Ok(Self {
            plaid,
            sync: SyncConfig::default(),
            frontend_url: non_empty("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_owned())
                .trim_end_matches('/')
                .to_owned(),
            webhook_secret: non_empty("PLAID_WEBHOOK_SECRET"),
        })
    }

    /// The OAuth redirect URI for Plaid Link.
    ///
    /// Plaid only accepts HTTPS redirect URIs, so this is `None` for local
    /// development.
    pub fn redirect_uri(&self) -> Option<String> {
        self.frontend_url
            .starts_with("https://")
            .then(|| format!("{}/finance/oauth-callback", self.frontend_url))
    }
}
