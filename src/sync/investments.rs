//! Pulling holdings and investment transactions from Plaid.

use std::{collections::HashMap, sync::Mutex};

use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    account::{get_plaid_account_ids, has_investment_accounts},
    db::lock_connection,
    institution::InstitutionId,
    investment::{
        HoldingId, SecurityId, delete_stale_holdings, get_security_id, upsert_holding,
        upsert_investment_transaction, upsert_security,
    },
    plaid::{PlaidApi, PlaidSecurity},
    sync::transactions::load_linked_institution,
};

/// The result of a holdings sync.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HoldingsSync {
    /// The institution has no investment accounts, so Plaid was not asked.
    NoInvestmentAccounts,
    Synced {
        securities: usize,
        holdings: usize,
        /// Positions that Plaid no longer reports.
        removed: usize,
    },
}

fn save_securities(
    securities: &[PlaidSecurity],
    connection: &Connection,
) -> Result<HashMap<String, SecurityId>, Error> {
    securities
        .iter()
        .map(|security| {
            upsert_security(security, connection).map(|id| (security.security_id.clone(), id))
        })
        .collect()
}

/// Refresh the holdings of an institution's investment accounts.
///
/// Holdings are replaced as a whole: positions missing from Plaid's response
/// are deleted.
pub async fn sync_holdings(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    institution_id: InstitutionId,
) -> Result<HoldingsSync, Error> {
    let (institution, access_token) = load_linked_institution(institution_id, db_connection)?;

    {
        let connection = lock_connection(db_connection)?;
        if !has_investment_accounts(institution_id, &connection)? {
            return Ok(HoldingsSync::NoInvestmentAccounts);
        }
    }

    let response = plaid.get_investment_holdings(&access_token).await?;

    let connection = lock_connection(db_connection)?;
    let transaction = connection.unchecked_transaction()?;
    let security_ids = save_securities(&response.securities, &transaction)?;
    let account_ids = get_plaid_account_ids(institution_id, &transaction)?;

    let mut kept: HashMap<i64, Vec<HoldingId>> = HashMap::new();
    for holding in &response.holdings {
        let (Some(account_id), Some(security_id)) = (
            account_ids.get(&holding.account_id),
            security_ids.get(&holding.security_id),
        ) else {
            tracing::warn!(
                "Skipping holding of {} for unknown account {}",
                holding.security_id,
                holding.account_id
            );
            continue;
        };

        let holding_id = upsert_holding(*account_id, *security_id, holding, &transaction)?;
        kept.entry(*account_id).or_default().push(holding_id);
    }

    let mut removed = 0;
    for account_id in account_ids.values() {
        let keep = kept.get(account_id).map(Vec::as_slice).unwrap_or_default();
        removed += delete_stale_holdings(*account_id, keep, &transaction)?;
    }

    transaction.commit()?;

    let holdings = kept.values().map(Vec::len).sum();
    tracing::info!(
        "Synced {holdings} holdings for {} ({removed} removed)",
        institution.name
    );

    Ok(HoldingsSync::Synced {
        securities: security_ids.len(),
        holdings,
        removed,
    })
}

/// Fetch investment transactions between two dates, paging by offset.
/// Returns the number of transactions saved.
pub async fn sync_investment_transactions(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    institution_id: InstitutionId,
    start_date: Date,
    end_date: Date,
) -> Result<usize, Error> {
    let (institution, access_token) = load_linked_institution(institution_id, db_connection)?;
    let mut offset = 0;
    let mut saved = 0;

    loop {
        let page = plaid
            .get_investment_transactions(&access_token, start_date, end_date, offset)
            .await?;
        let fetched = page.investment_transactions.len() as u32;

        {
            let connection = lock_connection(db_connection)?;
            let transaction = connection.unchecked_transaction()?;
            let security_ids = save_securities(&page.securities, &transaction)?;
            let account_ids = get_plaid_account_ids(institution_id, &transaction)?;

            for investment_transaction in &page.investment_transactions {
                let Some(account_id) = account_ids.get(&investment_transaction.account_id) else {
                    tracing::warn!(
                        "Skipping investment transaction {} for unknown account {}",
                        investment_transaction.investment_transaction_id,
                        investment_transaction.account_id
                    );
                    continue;
                };

                let security_id = match &investment_transaction.security_id {
                    Some(plaid_security_id) => match security_ids.get(plaid_security_id) {
                        Some(id) => Some(*id),
                        None => get_security_id(plaid_security_id, &transaction)?,
                    },
                    None => None,
                };

                upsert_investment_transaction(
                    *account_id,
                    security_id,
                    investment_transaction,
                    &transaction,
                )?;
                saved += 1;
            }

            transaction.commit()?;
        }

        offset += fetched;
        if fetched == 0 || offset >= page.total_investment_transactions {
            break;
        }
    }

    tracing::info!(
        "Synced {saved} investment transactions for {} between {start_date} and {end_date}",
        institution.name
    );

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        account::{AccountType, link_plaid_account},
        db::initialize,
        institution::test_utils::create_linked_institution,
        investment::{HoldingQuery, get_holdings, test_utils::*},
        plaid::{
            HoldingsResponse,
            test_client::{FakePlaid, plaid_account},
        },
        transaction::test_utils::create_institution_with_account,
    };

    use super::{HoldingsSync, sync_holdings, sync_investment_transactions};

    fn get_test_db() -> Mutex<Connection> {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        Mutex::new(connection)
    }

    fn create_brokerage(db: &Mutex<Connection>) -> i64 {
        let connection = db.lock().unwrap();
        let institution = create_linked_institution("broker", &connection);
        link_plaid_account(
            institution.id,
            &plaid_account("ira", AccountType::Investment, "9999", Some(0.0)),
            &connection,
        )
        .unwrap();
        institution.id
    }

    #[tokio::test]
    async fn no_investment_accounts() {
        let db = get_test_db();
        let (institution, _) = create_institution_with_account("item-1", &db.lock().unwrap());
        let plaid = FakePlaid::default();

        let result = sync_holdings(&plaid, &db, institution.id).await;

        assert_eq!(result, Ok(HoldingsSync::NoInvestmentAccounts));
    }

    #[tokio::test]
    async fn replaces_holdings() {
        let db = get_test_db();
        let institution_id = create_brokerage(&db);
        let plaid = FakePlaid::default();
        *plaid.holdings.lock().unwrap() = Some(HoldingsResponse {
            holdings: vec![
                plaid_holding("ira", "sec-1", 2.0, 10.0, None),
                plaid_holding("ira", "sec-2", 1.0, 50.0, None),
            ],
            securities: vec![
                plaid_security("sec-1", "ACME", 10.0),
                plaid_security("sec-2", "GLBX", 50.0),
            ],
        });
        sync_holdings(&plaid, &db, institution_id).await.unwrap();
        *plaid.holdings.lock().unwrap() = Some(HoldingsResponse {
            holdings: vec![plaid_holding("ira", "sec-1", 3.0, 10.0, None)],
            securities: vec![plaid_security("sec-1", "ACME", 10.0)],
        });

        let result = sync_holdings(&plaid, &db, institution_id).await;

        assert_eq!(
            result,
            Ok(HoldingsSync::Synced {
                securities: 1,
                holdings: 1,
                removed: 1
            })
        );
        let holdings = get_holdings(&HoldingQuery::default(), &db.lock().unwrap()).unwrap();
        assert_eq!(holdings.holdings.len(), 1);
        assert_eq!(holdings.holdings[0].holding.quantity, 3.0);
    }

    #[tokio::test]
    async fn saves_investment_transactions_in_range() {
        let db = get_test_db();
        let institution_id = create_brokerage(&db);
        let plaid = FakePlaid::default();
        *plaid.investment_transactions.lock().unwrap() = vec![
            plaid_investment_transaction("inv-1", "ira", None, "fee", 1.0, date!(2024 - 05 - 01)),
            plaid_investment_transaction("inv-2", "ira", None, "cash", 100.0, date!(2024 - 05 - 02)),
            plaid_investment_transaction("inv-3", "ira", None, "fee", 1.0, date!(2020 - 01 - 01)),
            plaid_investment_transaction("inv-4", "other", None, "fee", 1.0, date!(2024 - 05 - 03)),
        ];

        let saved = sync_investment_transactions(
            &plaid,
            &db,
            institution_id,
            date!(2024 - 01 - 01),
            date!(2024 - 06 - 30),
        )
        .await
        .unwrap();

        assert_eq!(saved, 2);
    }
}
