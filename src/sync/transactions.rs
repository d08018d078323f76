//! Pulling transactions from Plaid into the local database.

use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;
use time::{Date, Duration};

use crate::{
    Error,
    account::get_plaid_account_ids,
    config::SyncConfig,
    db::lock_connection,
    institution::{
        Institution, InstitutionId, get_institution, mark_needs_update, mark_sync_success,
        record_sync_error, save_sync_cursor,
    },
    plaid::{PlaidApi, PlaidError, PlaidTransaction, TransactionsSyncPage},
    transaction::{delete_plaid_transactions, upsert_plaid_transaction},
};

/// What a transaction sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SyncSummary {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    /// Transactions saved by the historical backfill on an item's first sync.
    pub backfilled: usize,
    /// How many times pagination restarted because Plaid's data changed.
    pub restarts: u32,
}

/// Load a Plaid linked institution and its access token.
///
/// # Errors
/// Returns [Error::ManualInstitution] for institutions without a Plaid item.
pub(crate) fn load_linked_institution(
    institution_id: InstitutionId,
    db_connection: &Mutex<Connection>,
) -> Result<(Institution, String), Error> {
    let connection = lock_connection(db_connection)?;
    let institution = get_institution(institution_id, &connection)?;

    match (&institution.access_token, institution.is_manual) {
        (Some(access_token), false) => {
            let access_token = access_token.clone();
            Ok((institution, access_token))
        }
        _ => Err(Error::ManualInstitution),
    }
}

/// Save a failed sync on the institution: re-authentication errors flag the
/// institution for Link update mode, everything else is kept as the error
/// message.
pub(crate) fn record_failure(
    institution_id: InstitutionId,
    error: &Error,
    db_connection: &Mutex<Connection>,
) {
    let connection = match lock_connection(db_connection) {
        Ok(connection) => connection,
        Err(_) => return,
    };

    let result = match error {
        Error::Plaid(plaid_error) => match plaid_error.api_error() {
            Some(api_error) if api_error.requires_user_action() => {
                mark_needs_update(institution_id, &plaid_error.user_message(), &connection)
            }
            _ => record_sync_error(institution_id, &error.to_string(), &connection),
        },
        error => record_sync_error(institution_id, &error.to_string(), &connection),
    };

    if let Err(save_error) = result {
        tracing::error!("Could not save sync error for institution {institution_id}: {save_error}");
    }
}

async fn fetch_all_pages(
    plaid: &dyn PlaidApi,
    access_token: &str,
    start_cursor: Option<&str>,
) -> Result<Vec<TransactionsSyncPage>, PlaidError> {
    let mut pages = Vec::new();
    let mut cursor = start_cursor.map(str::to_owned);

    loop {
        let page = plaid.sync_transactions(access_token, cursor.as_deref()).await?;
        let has_more = page.has_more;
        cursor = Some(page.next_cursor.clone());
        pages.push(page);

        if !has_more {
            return Ok(pages);
        }
    }
}

/// Fetch every page after `initial_cursor`, restarting when Plaid reports
/// that the data changed mid-pagination or the cursor is no longer valid.
async fn collect_pages(
    plaid: &dyn PlaidApi,
    institution_id: InstitutionId,
    access_token: &str,
    initial_cursor: Option<String>,
    config: &SyncConfig,
    db_connection: &Mutex<Connection>,
) -> Result<(Vec<TransactionsSyncPage>, u32), Error> {
    let mut start_cursor = initial_cursor;
    let mut restarts = 0;
    let mut cursor_was_reset = false;

    loop {
        match fetch_all_pages(plaid, access_token, start_cursor.as_deref()).await {
            Ok(pages) => return Ok((pages, restarts)),
            Err(PlaidError::Api(api_error)) if api_error.is_mutation_during_pagination() => {
                if restarts >= config.max_sync_restarts {
                    return Err(Error::SyncRestartLimit(restarts));
                }
                restarts += 1;
                tracing::warn!(
                    "Transactions for institution {institution_id} changed during pagination, \
                    restarting sync ({restarts}/{})",
                    config.max_sync_restarts
                );
            }
            Err(PlaidError::Api(api_error))
                if api_error.is_stale_cursor() && start_cursor.is_some() && !cursor_was_reset =>
            {
                tracing::warn!(
                    "Sync cursor for institution {institution_id} is no longer valid, \
                    syncing from the beginning: {api_error}"
                );
                cursor_was_reset = true;
                start_cursor = None;
                let connection = lock_connection(db_connection)?;
                save_sync_cursor(institution_id, None, &connection)?;
            }
            Err(error) => return Err(error.into()),
        }
    }
}

/// Upsert Plaid transactions for accounts of `institution_id`, skipping
/// transactions for accounts that are not stored locally.
fn upsert_for_institution<'a>(
    institution_id: InstitutionId,
    transactions: impl IntoIterator<Item = &'a PlaidTransaction>,
    connection: &Connection,
) -> Result<usize, Error> {
    let account_ids = get_plaid_account_ids(institution_id, connection)?;
    let mut saved = 0;

    for plaid_transaction in transactions {
        match account_ids.get(&plaid_transaction.account_id) {
            Some(account_id) => {
                upsert_plaid_transaction(*account_id, plaid_transaction, connection)?;
                saved += 1;
            }
            None => tracing::warn!(
                "Skipping transaction {} for unknown account {}",
                plaid_transaction.transaction_id,
                plaid_transaction.account_id
            ),
        }
    }

    Ok(saved)
}

/// Apply the collected pages and the final cursor in a single SQL transaction.
fn apply_pages(
    institution_id: InstitutionId,
    pages: &[TransactionsSyncPage],
    connection: &Connection,
) -> Result<SyncSummary, Error> {
    let transaction = connection.unchecked_transaction()?;
    let account_ids = get_plaid_account_ids(institution_id, &transaction)?;
    let mut summary = SyncSummary::default();

    for page in pages {
        for (plaid_transaction, is_modified) in page
            .added
            .iter()
            .map(|added| (added, false))
            .chain(page.modified.iter().map(|modified| (modified, true)))
        {
            let Some(account_id) = account_ids.get(&plaid_transaction.account_id) else {
                tracing::warn!(
                    "Skipping transaction {} for unknown account {}",
                    plaid_transaction.transaction_id,
                    plaid_transaction.account_id
                );
                continue;
            };

            upsert_plaid_transaction(*account_id, plaid_transaction, &transaction)?;
            if is_modified {
                summary.modified += 1;
            } else {
                summary.added += 1;
            }
        }

        let removed: Vec<String> = page
            .removed
            .iter()
            .map(|removed| removed.transaction_id.clone())
            .collect();
        summary.removed += delete_plaid_transactions(&removed, &transaction)?;
    }

    if let Some(last_page) = pages.last() {
        save_sync_cursor(institution_id, Some(&last_page.next_cursor), &transaction)?;
    }

    transaction.commit()?;

    Ok(summary)
}

async fn fetch_history(
    plaid: &dyn PlaidApi,
    institution_id: InstitutionId,
    access_token: &str,
    start_date: Date,
    end_date: Date,
    page_size: u32,
    db_connection: &Mutex<Connection>,
) -> Result<usize, Error> {
    let mut offset = 0;
    let mut saved = 0;

    loop {
        let page = plaid
            .get_transactions(access_token, start_date, end_date, offset, page_size)
            .await?;
        let fetched = page.transactions.len() as u32;

        {
            let connection = lock_connection(db_connection)?;
            saved += upsert_for_institution(institution_id, &page.transactions, &connection)?;
        }

        offset += fetched;
        if fetched == 0 || offset >= page.total_transactions {
            return Ok(saved);
        }
    }
}

/// Bring an institution's transactions up to date with Plaid.
///
/// Pages from `/transactions/sync` are collected in full before anything is
/// written, then applied together with the new cursor. The first sync of an
/// item also pulls [SyncConfig::backfill_days] of history, since the sync
/// endpoint may not return all of it straight away.
///
/// # Errors
/// Returns [Error::ManualInstitution] for manual institutions,
/// [Error::SyncRestartLimit] if the data kept changing mid-pagination, or the
/// Plaid or SQL error that stopped the sync. Failures are also saved on the
/// institution.
pub async fn sync_institution_transactions(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    institution_id: InstitutionId,
    config: &SyncConfig,
    today: Date,
) -> Result<SyncSummary, Error> {
    let (institution, access_token) = load_linked_institution(institution_id, db_connection)?;
    let initial_cursor = institution.sync_cursor.clone();
    let is_first_sync = initial_cursor.is_none();

    let result = collect_pages(
        plaid,
        institution_id,
        &access_token,
        initial_cursor,
        config,
        db_connection,
    )
    .await
    .and_then(|(pages, restarts)| {
        let connection = lock_connection(db_connection)?;
        let mut summary = apply_pages(institution_id, &pages, &connection)?;
        summary.restarts = restarts;
        Ok(summary)
    });

    let mut summary = match result {
        Ok(summary) => summary,
        Err(error) => {
            tracing::error!("Transaction sync failed for {}: {error}", institution.name);
            record_failure(institution_id, &error, db_connection);
            return Err(error);
        }
    };

    if is_first_sync {
        let backfill = async {
            let start_date = history_start(today, config.backfill_days)?;

            fetch_history(
                plaid,
                institution_id,
                &access_token,
                start_date,
                today,
                config.page_size,
                db_connection,
            )
            .await
        };

        match backfill.await {
            Ok(backfilled) => summary.backfilled = backfilled,
            Err(error) => tracing::warn!(
                "Historical backfill failed for {}, continuing with synced data: {error}",
                institution.name
            ),
        }
    }

    {
        let connection = lock_connection(db_connection)?;
        mark_sync_success(institution_id, &connection)?;
    }

    tracing::info!(
        "Synced {}: {} added, {} modified, {} removed, {} backfilled",
        institution.name,
        summary.added,
        summary.modified,
        summary.removed,
        summary.backfilled
    );

    Ok(summary)
}

/// The longest history, in days, a backfill may ask Plaid for.
pub const MAX_BACKFILL_DAYS: i64 = 36_500;

/// The first day of a `days` long window ending `today`.
///
/// # Errors
/// Returns [Error::Validation] if `days` is not in `1..=MAX_BACKFILL_DAYS`.
fn history_start(today: Date, days: i64) -> Result<Date, Error> {
    let invalid = || {
        Error::Validation(format!(
            "days must be between 1 and {MAX_BACKFILL_DAYS}, got {days}"
        ))
    };

    if !(1..=MAX_BACKFILL_DAYS).contains(&days) {
        return Err(invalid());
    }

    today.checked_sub(Duration::days(days)).ok_or_else(invalid)
}

/// Fetch `days` of history for an institution using offset pagination.
/// Returns the number of transactions saved.
///
/// # Errors
/// Returns [Error::Validation] if `days` is not in `1..=MAX_BACKFILL_DAYS`.
pub async fn backfill_transactions(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    institution_id: InstitutionId,
    days: i64,
    config: &SyncConfig,
    today: Date,
) -> Result<usize, Error> {
    let start_date = history_start(today, days)?;
    let (institution, access_token) = load_linked_institution(institution_id, db_connection)?;

    let saved = fetch_history(
        plaid,
        institution_id,
        &access_token,
        start_date,
        today,
        config.page_size,
        db_connection,
    )
    .await?;

    tracing::info!(
        "Backfilled {saved} transactions for {} since {start_date}",
        institution.name
    );

    Ok(saved)
}
