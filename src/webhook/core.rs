//! Storage for the webhooks Plaid delivers.

use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{Error, database_id::DatabaseId};

pub type WebhookId = DatabaseId;

// ============================================================================
// MODELS
// ============================================================================

/// The fields of a Plaid webhook body that processing looks at.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub webhook_type: Option<String>,
    #[serde(default)]
    pub webhook_code: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    /// Plaid transaction IDs, sent with `TRANSACTIONS_REMOVED`.
    #[serde(default)]
    pub removed_transactions: Vec<String>,
    /// The Plaid error object, sent with `ITEM` `ERROR`.
    #[serde(default)]
    pub error: Option<Value>,
}

impl WebhookPayload {
    /// Read the known fields from `body`, falling back to an empty payload
    /// when they have unexpected types.
    pub fn from_json(body: &Value) -> Self {
        serde_json::from_value(body.clone()).unwrap_or_else(|error| {
            tracing::warn!("Could not read Plaid webhook fields: {error}");
            Self::default()
        })
    }

    /// A readable description of the item error, if there is one.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref().filter(|error| !error.is_null())?;

        Some(
            error
                .get("error_message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string()),
        )
    }
}

/// A webhook as it was received, with its processing outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredWebhook {
    pub id: WebhookId,
    pub webhook_type: Option<String>,
    pub webhook_code: Option<String>,
    pub item_id: Option<String>,
    pub payload: Value,
    pub processed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_webhook_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS plaid_webhook (
            id INTEGER PRIMARY KEY,
            webhook_type TEXT,
            webhook_code TEXT,
            item_id TEXT,
            payload TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            processed_at TEXT,
            error TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_plaid_webhook_item ON plaid_webhook(item_id);",
    )?;

    Ok(())
}

/// Store a received webhook and return its ID.
pub fn save_webhook(
    payload: &WebhookPayload,
    body: &Value,
    connection: &Connection,
) -> Result<WebhookId, Error> {
    connection.execute(
        "INSERT INTO plaid_webhook (webhook_type, webhook_code, item_id, payload, created_at) \
        VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            payload.webhook_type,
            payload.webhook_code,
            payload.item_id,
            body.to_string(),
            OffsetDateTime::now_utc(),
        ],
    )?;

    Ok(connection.last_insert_rowid())
}

pub fn mark_webhook_processed(id: WebhookId, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "UPDATE plaid_webhook SET processed = 1, processed_at = ?1, error = NULL WHERE id = ?2",
        params![OffsetDateTime::now_utc(), id],
    )?;

    Ok(())
}

pub fn record_webhook_error(
    id: WebhookId,
    message: &str,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE plaid_webhook SET error = ?1 WHERE id = ?2",
        params![message, id],
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<StoredWebhook, rusqlite::Error> {
    let payload: String = row.get(4)?;

    Ok(StoredWebhook {
        id: row.get(0)?,
        webhook_type: row.get(1)?,
        webhook_code: row.get(2)?,
        item_id: row.get(3)?,
        payload: serde_json::from_str(&payload).unwrap_or(Value::String(payload)),
        processed: row.get(5)?,
        processed_at: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Get the most recently received webhooks, newest first.
pub fn get_recent_webhooks(
    limit: u32,
    connection: &Connection,
) -> Result<Vec<StoredWebhook>, Error> {
    connection
        .prepare(
            "SELECT id, webhook_type, webhook_code, item_id, payload, processed, processed_at, \
            error, created_at FROM plaid_webhook ORDER BY id DESC LIMIT ?1",
        )?
        .query_map([limit], map_row)?
        .map(|maybe_webhook| maybe_webhook.map_err(Error::from))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use serde_json::json;

    use crate::db::initialize;

    use super::{
        WebhookPayload, get_recent_webhooks, mark_webhook_processed, record_webhook_error,
        save_webhook,
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn reads_known_fields() {
        let body = json!({
            "webhook_type": "TRANSACTIONS",
            "webhook_code": "TRANSACTIONS_REMOVED",
            "item_id": "item-1",
            "removed_transactions": ["tx-1", "tx-2"],
            "environment": "sandbox",
        });

        let payload = WebhookPayload::from_json(&body);

        assert_eq!(payload.webhook_code.as_deref(), Some("TRANSACTIONS_REMOVED"));
        assert_eq!(payload.removed_transactions, vec!["tx-1", "tx-2"]);
    }

    #[test]
    fn malformed_fields_give_empty_payload() {
        let payload = WebhookPayload::from_json(&json!({"webhook_type": 42}));

        assert_eq!(payload, WebhookPayload::default());
    }

    #[test]
    fn error_message_prefers_plaid_message() {
        let payload = WebhookPayload::from_json(&json!({
            "error": {"error_code": "ITEM_LOGIN_REQUIRED", "error_message": "login required"}
        }));
        assert_eq!(payload.error_message().as_deref(), Some("login required"));

        let payload = WebhookPayload::from_json(&json!({"error": "boom"}));
        assert_eq!(payload.error_message().as_deref(), Some("\"boom\""));

        let payload = WebhookPayload::from_json(&json!({"error": null}));
        assert_eq!(payload.error_message(), None);
    }

    #[test]
    fn stores_and_updates_webhooks() {
        let connection = get_test_connection();
        let body = json!({"webhook_type": "ITEM", "webhook_code": "ERROR", "item_id": "item-1"});
        let payload = WebhookPayload::from_json(&body);

        let first = save_webhook(&payload, &body, &connection).unwrap();
        let second = save_webhook(&payload, &body, &connection).unwrap();
        mark_webhook_processed(first, &connection).unwrap();
        record_webhook_error(second, "boom", &connection).unwrap();

        let webhooks = get_recent_webhooks(10, &connection).unwrap();
        assert_eq!(webhooks.len(), 2);
        assert_eq!(webhooks[0].id, second);
        assert!(!webhooks[0].processed);
        assert_eq!(webhooks[0].error.as_deref(), Some("boom"));
        assert!(webhooks[1].processed);
        assert!(webhooks[1].processed_at.is_some());
        assert_eq!(webhooks[1].payload, body);
    }
}
