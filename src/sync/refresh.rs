use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;
use time::{Date, Duration};

use crate::{
    Error,
    account::{has_investment_accounts, update_account_balances},
    analytics::record_net_worth_snapshot,
    config::SyncConfig,
    db::lock_connection,
    institution::InstitutionId,
    plaid::PlaidApi,
    sync::{
        HoldingsSync, SyncSummary, sync_holdings, sync_institution_transactions,
        sync_investment_transactions,
        transactions::{load_linked_institution, record_failure},
    },
};

/// Refresh account balances from `/accounts/get`. Returns how many accounts
/// were updated.
pub async fn update_balances(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    institution_id: InstitutionId,
) -> Result<usize, Error> {
    let (institution, access_token) = load_linked_institution(institution_id, db_connection)?;

    let accounts = match plaid.get_accounts(&access_token).await {
        Ok(accounts) => accounts,
        Err(error) => {
            let error = Error::from(error);
            record_failure(institution_id, &error, db_connection);
            return Err(error);
        }
    };

    let connection = lock_connection(db_connection)?;
    let mut updated = 0;
    for account in &accounts {
        if update_account_balances(account, &connection)? {
            updated += 1;
        } else {
            tracing::warn!(
                "Balance update for {} skipped unknown account {}",
                institution.name,
                account.account_id
            );
        }
    }

    Ok(updated)
}

/// Everything a full institution refresh did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub transactions: SyncSummary,
    pub holdings: Option<HoldingsSync>,
    pub investment_transactions: Option<usize>,
}

/// Sync transactions, then investments when the institution has investment
/// accounts, then record today's net worth.
///
/// Only the transaction sync can fail the refresh. Investment and snapshot
/// failures are logged.
pub async fn refresh_institution(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    institution_id: InstitutionId,
    config: &SyncConfig,
    today: Date,
) -> Result<RefreshSummary, Error> {
    let transactions =
        sync_institution_transactions(plaid, db_connection, institution_id, config, today).await?;

    let has_investments = {
        let connection = lock_connection(db_connection)?;
        has_investment_accounts(institution_id, &connection)?
    };

    let (holdings, investment_transactions) = if has_investments {
        let holdings = sync_holdings(plaid, db_connection, institution_id)
            .await
            .inspect_err(|error| {
                tracing::warn!("Holdings sync failed for institution {institution_id}: {error}")
            })
            .ok();

        let start_date = today - Duration::days(config.investment_history_days);
        let investment_transactions = sync_investment_transactions(
            plaid,
            db_connection,
            institution_id,
            start_date,
            today,
        )
        .await
        .inspect_err(|error| {
            tracing::warn!(
                "Investment transaction sync failed for institution {institution_id}: {error}"
            )
        })
        .ok();

        (holdings, investment_transactions)
    } else {
        (None, None)
    };

    snapshot_net_worth(db_connection, today);

    Ok(RefreshSummary {
        transactions,
        holdings,
        investment_transactions,
    })
}

/// Record the net worth for `today`, logging rather than returning failures.
pub(crate) fn snapshot_net_worth(db_connection: &Mutex<Connection>, today: Date) {
    let result = lock_connection(db_connection)
        .and_then(|connection| record_net_worth_snapshot(today, &connection));

    if let Err(error) = result {
        tracing::error!("Could not record net worth snapshot for {today}: {error}");
    }
}
