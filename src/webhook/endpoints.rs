//! The Plaid webhook receiver.

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{FromRef, State},
    http::HeaderMap,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::{
    AppState, Error,
    config::Config,
    db::lock_connection,
    extract::{Json, Query},
    plaid::PlaidApi,
    timezone::local_today,
    webhook::{
        WebhookPayload, mark_webhook_processed, process_webhook, record_webhook_error,
        save_webhook,
    },
};

/// The header Plaid can be configured to send the shared secret in.
pub const WEBHOOK_SECRET_HEADER: &str = "x-plaid-webhook-secret";

/// The state needed by the webhook endpoint.
#[derive(Clone)]
pub struct WebhookState {
    db_connection: Arc<Mutex<Connection>>,
    plaid: Arc<dyn PlaidApi>,
    config: Arc<Config>,
    local_timezone: String,
}

impl FromRef<AppState> for WebhookState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            plaid: state.plaid.clone(),
            config: state.config.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}

/// Check the shared secret in constant time.
///
/// Both values are hashed first so the comparison does not depend on where
/// they differ or on their lengths. Every request passes when no secret is
/// configured.
pub fn is_valid_secret(expected: Option<&str>, provided: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(provided) = provided else {
        return false;
    };

    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());

    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |difference, (a, b)| difference | (a ^ b))
        == 0
}

/// Receive a webhook from Plaid.
///
/// The secret is checked before the body is read. Once it is accepted the
/// webhook is stored and processed, and the response is always
/// `{"status": "received"}`. Processing failures are saved on the stored
/// webhook.
pub async fn plaid_webhook_endpoint(
    State(state): State<WebhookState>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, Error> {
    let provided = query.secret.or_else(|| {
        headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    });

    if !is_valid_secret(state.config.webhook_secret.as_deref(), provided.as_deref()) {
        tracing::warn!("Rejected Plaid webhook with an invalid secret");
        return Err(Error::InvalidWebhookSecret);
    }

    let body = parse_webhook_body(&body)?;
    let payload = WebhookPayload::from_json(&body);
    tracing::info!(
        "Received Plaid webhook {} {} for item {}",
        payload.webhook_type.as_deref().unwrap_or("?"),
        payload.webhook_code.as_deref().unwrap_or("?"),
        payload.item_id.as_deref().unwrap_or("?")
    );

    let webhook_id = {
        let connection = lock_connection(&state.db_connection)?;
        save_webhook(&payload, &body, &connection)?
    };

    let today = local_today(&state.local_timezone)?;
    let outcome = process_webhook(
        state.plaid.as_ref(),
        &state.db_connection,
        &state.config.sync,
        &payload,
        today,
    )
    .await;

    let connection = lock_connection(&state.db_connection)?;
    match outcome {
        Ok(()) => mark_webhook_processed(webhook_id, &connection)?,
        Err(error) => {
            tracing::error!("Error processing webhook {webhook_id}: {error}");
            record_webhook_error(webhook_id, &error.to_string(), &connection)?;
        }
    }

    Ok(Json(json!({"status": "received"})))
}

/// Parse a webhook body as JSON regardless of its content type. An empty body
/// is an empty object.
fn parse_webhook_body(body: &[u8]) -> Result<Value, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }

    serde_json::from_slice(body)
        .map_err(|error| Error::Validation(format!("webhook body is not valid JSON: {error}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use time::macros::date;

    use crate::{
        Error, endpoints,
        institution::get_institution,
        plaid::{
            PlaidError,
            test_client::{FakePlaid, api_error, plaid_transaction},
        },
        test_utils::{test_config, test_server_with, test_server_with_config},
        transaction::{
            get_transaction, test_utils::create_institution_with_account,
            upsert_plaid_transaction,
        },
        webhook::get_recent_webhooks,
    };

    use super::{WEBHOOK_SECRET_HEADER, is_valid_secret, parse_webhook_body};

    #[test]
    fn secret_checks() {
        assert!(is_valid_secret(None, None));
        assert!(is_valid_secret(None, Some("anything")));
        assert!(is_valid_secret(Some("s3cret"), Some("s3cret")));
        assert!(!is_valid_secret(Some("s3cret"), Some("s3cre")));
        assert!(!is_valid_secret(Some("s3cret"), None));
    }

    #[tokio::test]
    async fn rejects_bad_secret_without_storing() {
        let mut config = test_config();
        config.webhook_secret = Some("s3cret".to_owned());
        let (server, state) = test_server_with_config(Arc::new(FakePlaid::default()), config);

        server
            .post(endpoints::PLAID_WEBHOOK)
            .add_query_param("secret", "wrong")
            .json(&json!({"webhook_type": "ITEM", "webhook_code": "ERROR"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .post(endpoints::PLAID_WEBHOOK)
            .add_header(WEBHOOK_SECRET_HEADER, "s3cret")
            .json(&json!({"webhook_type": "ITEM", "webhook_code": "ERROR"}))
            .await;
        response.assert_status_ok();

        let connection = state.db_connection.lock().unwrap();
        assert_eq!(get_recent_webhooks(10, &connection).unwrap().len(), 1);
    }

    #[test]
    fn webhook_bodies() {
        assert_eq!(
            parse_webhook_body(br#"{"webhook_code": "DEFAULT_UPDATE"}"#),
            Ok(json!({"webhook_code": "DEFAULT_UPDATE"}))
        );
        assert_eq!(parse_webhook_body(b""), Ok(json!({})));
        assert!(matches!(
            parse_webhook_body(b"{not json"),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn checks_secret_before_reading_body() {
        let mut config = test_config();
        config.webhook_secret = Some("s3cret".to_owned());
        let (server, state) = test_server_with_config(Arc::new(FakePlaid::default()), config);

        server
            .post(endpoints::PLAID_WEBHOOK)
            .add_query_param("secret", "wrong")
            .text("{not json")
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .post(endpoints::PLAID_WEBHOOK)
            .add_query_param("secret", "s3cret")
            .text("{not json")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].is_string());

        let connection = state.db_connection.lock().unwrap();
        assert!(get_recent_webhooks(10, &connection).unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepts_json_without_content_type() {
        let (server, state) = test_server_with(Arc::new(FakePlaid::default()));

        let response = server
            .post(endpoints::PLAID_WEBHOOK)
            .text(r#"{"webhook_type": "ITEM", "webhook_code": "WEBHOOK_UPDATE_ACKNOWLEDGED"}"#)
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({"status": "received"}));
        let connection = state.db_connection.lock().unwrap();
        let webhooks = get_recent_webhooks(10, &connection).unwrap();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].webhook_type.as_deref(), Some("ITEM"));
    }

    #[tokio::test]
    async fn sync_webhook_syncs_institution() {
        let plaid = Arc::new(FakePlaid::default());
        let (server, state) = test_server_with(plaid.clone());
        {
            let connection = state.db_connection.lock().unwrap();
            create_institution_with_account("item-1", &connection);
        }

        let body: Value = server
            .post(endpoints::PLAID_WEBHOOK)
            .json(&json!({
                "webhook_type": "TRANSACTIONS",
                "webhook_code": "SYNC_UPDATES_AVAILABLE",
                "item_id": "item-1",
            }))
            .await
            .json();

        assert_eq!(body, json!({"status": "received"}));
        assert_eq!(plaid.sync_cursors().len(), 1);
        let connection = state.db_connection.lock().unwrap();
        let webhooks = get_recent_webhooks(10, &connection).unwrap();
        assert!(webhooks[0].processed);
        assert_eq!(webhooks[0].item_id.as_deref(), Some("item-1"));
    }

    #[tokio::test]
    async fn unknown_item_is_received() {
        let plaid = Arc::new(FakePlaid::default());
        let (server, state) = test_server_with(plaid.clone());

        server
            .post(endpoints::PLAID_WEBHOOK)
            .json(&json!({
                "webhook_type": "TRANSACTIONS",
                "webhook_code": "DEFAULT_UPDATE",
                "item_id": "nobody",
            }))
            .await
            .assert_status_ok();

        assert!(plaid.sync_cursors().is_empty());
        let connection = state.db_connection.lock().unwrap();
        assert!(get_recent_webhooks(10, &connection).unwrap()[0].processed);
    }

    #[tokio::test]
    async fn removed_webhook_only_touches_its_item() {
        let (server, state) = test_server_with(Arc::new(FakePlaid::default()));
        let (mine, theirs) = {
            let connection = state.db_connection.lock().unwrap();
            let (_, first_account) = create_institution_with_account("item-1", &connection);
            let (_, second_account) = create_institution_with_account("item-2", &connection);
            let day = date!(2024 - 03 - 01);
            let mine = upsert_plaid_transaction(
                first_account,
                &plaid_transaction("tx-1", "item-1-acc-1", 5.0, day),
                &connection,
            )
            .unwrap()
            .id();
            let theirs = upsert_plaid_transaction(
                second_account,
                &plaid_transaction("tx-2", "item-2-acc-1", 5.0, day),
                &connection,
            )
            .unwrap()
            .id();
            (mine, theirs)
        };

        server
            .post(endpoints::PLAID_WEBHOOK)
            .json(&json!({
                "webhook_type": "TRANSACTIONS",
                "webhook_code": "TRANSACTIONS_REMOVED",
                "item_id": "item-1",
                "removed_transactions": ["tx-1", "tx-2"],
            }))
            .await
            .assert_status_ok();

        let connection = state.db_connection.lock().unwrap();
        assert!(get_transaction(mine, &connection).is_err());
        assert!(get_transaction(theirs, &connection).is_ok());
    }

    #[tokio::test]
    async fn item_error_marks_needs_update() {
        let (server, state) = test_server_with(Arc::new(FakePlaid::default()));
        let institution_id = {
            let connection = state.db_connection.lock().unwrap();
            create_institution_with_account("item-1", &connection).0.id
        };

        server
            .post(endpoints::PLAID_WEBHOOK)
            .json(&json!({
                "webhook_type": "ITEM",
                "webhook_code": "ERROR",
                "item_id": "item-1",
                "error": {"error_code": "ITEM_LOGIN_REQUIRED", "error_message": "login required"},
            }))
            .await
            .assert_status_ok();

        let connection = state.db_connection.lock().unwrap();
        let institution = get_institution(institution_id, &connection).unwrap();
        assert!(institution.needs_update);
        assert_eq!(institution.error_message.as_deref(), Some("login required"));
    }

    #[tokio::test]
    async fn processing_failure_is_stored() {
        let plaid = Arc::new(FakePlaid::default());
        plaid.push_sync_response(Err(PlaidError::Api(api_error("INTERNAL_SERVER_ERROR"))));
        let (server, state) = test_server_with(plaid);
        {
            let connection = state.db_connection.lock().unwrap();
            create_institution_with_account("item-1", &connection);
        }

        let body: Value = server
            .post(endpoints::PLAID_WEBHOOK)
            .json(&json!({
                "webhook_type": "TRANSACTIONS",
                "webhook_code": "DEFAULT_UPDATE",
                "item_id": "item-1",
            }))
            .await
            .json();

        assert_eq!(body["status"], "received");
        let connection = state.db_connection.lock().unwrap();
        let webhook = &get_recent_webhooks(10, &connection).unwrap()[0];
        assert!(!webhook.processed);
        assert!(
            webhook
                .error
                .as_deref()
                .is_some_and(|error| error.contains("INTERNAL_SERVER_ERROR"))
        );
    }
}
