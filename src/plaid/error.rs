use std::fmt;

use serde::Deserialize;

/// The error body Plaid returns with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidApiError {
    pub error_type: String,
    pub error_code: String,
    pub error_message: String,
    #[serde(default)]
    pub display_message: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl PlaidApiError {
    /// Plaid saw the item's transactions change while a sync was paging
    /// through them. The sync must restart from the cursor it started with.
    pub fn is_mutation_during_pagination(&self) -> bool {
        self.error_code == "TRANSACTIONS_SYNC_MUTATION_DURING_PAGINATION"
    }

    /// The stored sync cursor is no longer accepted.
    pub fn is_stale_cursor(&self) -> bool {
        self.error_code.contains("CURSOR")
            || (self.error_code == "INVALID_FIELD"
                && self.error_message.to_lowercase().contains("cursor"))
    }

    /// The user has to go through Link in update mode before the item works again.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self.error_code.as_str(),
            "ITEM_LOGIN_REQUIRED" | "PENDING_EXPIRATION" | "ITEM_LOCKED" | "INVALID_CREDENTIALS"
        )
    }
}

impl fmt::Display for PlaidApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.error_type, self.error_code, self.error_message
        )
    }
}

/// The ways a call to the Plaid API can fail.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaidError {
    /// Plaid answered with an error body.
    #[error("{0}")]
    Api(PlaidApiError),

    /// The request never got a response, e.g. a timeout or TLS failure.
    #[error("could not reach Plaid: {0}")]
    Transport(String),

    /// The response was not in the expected shape.
    #[error("unexpected response from Plaid: {0}")]
    Decode(String),
}

impl PlaidError {
    pub fn api_error(&self) -> Option<&PlaidApiError> {
        match self {
            PlaidError::Api(error) => Some(error),
            _ => None,
        }
    }

    /// A message that is safe to show to the client.
    pub fn user_message(&self) -> String {
        match self {
            PlaidError::Api(error) => error
                .display_message
                .clone()
                .unwrap_or_else(|| error.error_message.clone()),
            PlaidError::Transport(_) => "Could not reach Plaid, try again later.".to_owned(),
            PlaidError::Decode(_) => "Plaid returned an unexpected response.".to_owned(),
        }
    }
}

impl From<reqwest::Error> for PlaidError {
    fn from(value: reqwest::Error) -> Self {
        PlaidError::Transport(value.to_string())
    }
}
