//! Acting on a received webhook.

use std::sync::Mutex;

use rusqlite::Connection;
use time::Date;

use crate::{
    Error,
    config::SyncConfig,
    db::lock_connection,
    institution::{Institution, get_institution_by_item_id, mark_needs_update},
    plaid::PlaidApi,
    sync::{sync_holdings, sync_institution_transactions},
    transaction::delete_institution_transactions,
    webhook::WebhookPayload,
};

const PENDING_EXPIRATION_MESSAGE: &str =
    "Access to this institution expires soon. Re-link it to keep it syncing.";

/// What a webhook asks us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookAction {
    SyncTransactions,
    RemoveTransactions,
    MarkNeedsUpdate,
    SyncHoldings,
    Ignore,
}

impl WebhookAction {
    fn for_payload(payload: &WebhookPayload) -> Self {
        match (payload.webhook_type.as_deref(), payload.webhook_code.as_deref()) {
            (
                Some("TRANSACTIONS"),
                Some(
                    "INITIAL_UPDATE"
                    | "HISTORICAL_UPDATE"
                    | "DEFAULT_UPDATE"
                    | "SYNC_UPDATES_AVAILABLE",
                ),
            ) => WebhookAction::SyncTransactions,
            (Some("TRANSACTIONS"), Some("TRANSACTIONS_REMOVED")) => {
                WebhookAction::RemoveTransactions
            }
            (Some("ITEM"), Some("ERROR" | "PENDING_EXPIRATION")) => WebhookAction::MarkNeedsUpdate,
            (Some("HOLDINGS"), Some("DEFAULT_UPDATE")) => WebhookAction::SyncHoldings,
            _ => WebhookAction::Ignore,
        }
    }
}

fn find_institution(
    payload: &WebhookPayload,
    db_connection: &Mutex<Connection>,
) -> Result<Option<Institution>, Error> {
    let Some(item_id) = payload.item_id.as_deref() else {
        tracing::warn!("Plaid webhook without an item_id");
        return Ok(None);
    };

    let connection = lock_connection(db_connection)?;
    let institution = get_institution_by_item_id(item_id, &connection)?;
    if institution.is_none() {
        tracing::warn!("Plaid webhook received for unknown item_id {item_id}");
    }

    Ok(institution)
}

/// Carry out the work a webhook asks for.
///
/// Webhooks for unknown items and unhandled types are logged and skipped.
pub async fn process_webhook(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    config: &SyncConfig,
    payload: &WebhookPayload,
    today: Date,
) -> Result<(), Error> {
    let action = WebhookAction::for_payload(payload);
    if action == WebhookAction::Ignore {
        tracing::debug!(
            "Ignoring Plaid webhook {:?} {:?}",
            payload.webhook_type,
            payload.webhook_code
        );
        return Ok(());
    }

    let Some(institution) = find_institution(payload, db_connection)? else {
        return Ok(());
    };

    match action {
        WebhookAction::SyncTransactions => {
            let summary =
                sync_institution_transactions(plaid, db_connection, institution.id, config, today)
                    .await?;
            tracing::info!(
                "Webhook sync for {}: {} added, {} modified, {} removed",
                institution.name,
                summary.added,
                summary.modified,
                summary.removed
            );
        }
        WebhookAction::RemoveTransactions => {
            let connection = lock_connection(db_connection)?;
            let deleted = delete_institution_transactions(
                institution.id,
                &payload.removed_transactions,
                &connection,
            )?;
            tracing::info!("Webhook removed {deleted} transactions from {}", institution.name);
        }
        WebhookAction::MarkNeedsUpdate => {
            let message = payload
                .error_message()
                .unwrap_or_else(|| PENDING_EXPIRATION_MESSAGE.to_owned());
            let connection = lock_connection(db_connection)?;
            mark_needs_update(institution.id, &message, &connection)?;
            tracing::warn!("{} needs to be re-linked: {message}", institution.name);
        }
        WebhookAction::SyncHoldings => {
            sync_holdings(plaid, db_connection, institution.id).await?;
        }
        WebhookAction::Ignore => {}
    }

    Ok(())
}
