//! Route handlers for accounts.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    account::{
        AccountId, AccountView, ManualAccountForm, create_manual_account, delete_account,
        get_account, get_all_accounts, set_account_custom_name, toggle_account_selected,
    },
    db::lock_connection,
    extract::{Json, Path},
};

/// The state needed by the account endpoints.
#[derive(Debug, Clone)]
pub struct AccountState {
    /// The database connection for managing accounts.
    db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

pub async fn list_accounts_endpoint(
    State(state): State<AccountState>,
) -> Result<Json<Vec<AccountView>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let accounts = get_all_accounts(&connection)?;

    Ok(Json(accounts.into_iter().map(AccountView::from).collect()))
}

pub async fn get_account_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_account(account_id, &connection).map(|account| Json(account.into()))
}

/// Include or exclude an account from totals and analytics.
pub async fn toggle_selected_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    toggle_account_selected(account_id, &connection).map(|account| Json(account.into()))
}

#[derive(Debug, Deserialize)]
pub struct CustomNameForm {
    #[serde(default)]
    pub custom_name: Option<String>,
}

pub async fn update_custom_name_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<AccountId>,
    Json(form): Json<CustomNameForm>,
) -> Result<Json<AccountView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    set_account_custom_name(account_id, form.custom_name.as_deref(), &connection)
        .map(|account| Json(account.into()))
}

pub async fn create_manual_account_endpoint(
    State(state): State<AccountState>,
    Json(form): Json<ManualAccountForm>,
) -> Result<(StatusCode, Json<AccountView>), Error> {
    let connection = lock_connection(&state.db_connection)?;

    let account = create_manual_account(&form, &connection).inspect_err(|error| {
        tracing::error!("Could not create manual account {}: {error}", form.account_name)
    })?;

    Ok((StatusCode::CREATED, Json(account.into())))
}

pub async fn delete_account_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<AccountId>,
) -> Result<StatusCode, Error> {
    let connection = lock_connection(&state.db_connection)?;

    delete_account(account_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{endpoints, test_utils::test_server};

    #[tokio::test]
    async fn creates_and_lists_manual_accounts() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::MANUAL_ACCOUNT)
            .json(&json!({
                "institution_name": "Cash App",
                "account_name": "Spending",
                "account_type": "depository",
                "current_balance": 25.5
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        assert_eq!(created["display_name"], "Spending");
        assert_eq!(created["is_manual"], true);
        assert_eq!(created["balance_display"], "$25.50");

        let accounts: Value = server.get(endpoints::ACCOUNTS).await.json();
        assert_eq!(accounts.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn manual_account_without_name_is_bad_request() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::MANUAL_ACCOUNT)
            .json(&json!({"institution_name": "Bank", "account_name": ""}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let (server, _) = test_server();

        let response = server
            .get(&endpoints::format_endpoint(endpoints::ACCOUNT, 404))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn renames_and_toggles_account() {
        let (server, _) = test_server();
        let created: Value = server
            .post(endpoints::MANUAL_ACCOUNT)
            .json(&json!({"institution_name": "Wallet", "account_name": "Cash"}))
            .await
            .json();
        let id = created["id"].as_i64().unwrap();

        let renamed: Value = server
            .patch(&endpoints::format_endpoint(endpoints::ACCOUNT_CUSTOM_NAME, id))
            .json(&json!({"custom_name": "Pocket money"}))
            .await
            .json();
        let toggled: Value = server
            .post(&endpoints::format_endpoint(endpoints::ACCOUNT_TOGGLE_SELECTED, id))
            .await
            .json();

        assert_eq!(renamed["display_name"], "Pocket money");
        assert_eq!(toggled["is_selected"], false);
    }

    #[tokio::test]
    async fn deletes_account() {
        let (server, _) = test_server();
        let created: Value = server
            .post(endpoints::MANUAL_ACCOUNT)
            .json(&json!({"institution_name": "Wallet", "account_name": "Cash"}))
            .await
            .json();
        let path = endpoints::format_endpoint(endpoints::ACCOUNT, created["id"].as_i64().unwrap());

        server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
        server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    }
}
