//! Current net worth and the daily snapshots that track it over time.

use rusqlite::{Connection, Row};
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use crate::{
    Error,
    account::{Account, AccountType, get_all_accounts},
    currency::format_currency,
    database_id::DatabaseId,
};

// ============================================================================
// MODELS
// ============================================================================

/// Assets minus liabilities over the active, selected accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetWorth {
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub net_worth: f64,
    pub net_worth_display: String,
    #[serde(with = "time::serde::rfc3339")]
    pub as_of: OffsetDateTime,
}

/// The balances that make up a net worth figure, split by account type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Breakdown {
    total_assets: f64,
    total_liabilities: f64,
    cash_and_investments: f64,
    credit_cards: f64,
    loans: f64,
}

impl Breakdown {
    fn from_accounts(accounts: &[Account]) -> Self {
        let mut breakdown = Self::default();

        for account in accounts
            .iter()
            .filter(|account| account.is_active && account.is_selected)
        {
            let balance = account.current_balance;

            match account.account_type {
                AccountType::Depository | AccountType::Investment => {
                    breakdown.total_assets += balance;
                    breakdown.cash_and_investments += balance;
                }
                AccountType::Credit => {
                    breakdown.total_liabilities += balance;
                    breakdown.credit_cards += balance;
                }
                AccountType::Loan => {
                    breakdown.total_liabilities += balance;
                    breakdown.loans += balance;
                }
                AccountType::Other => {}
            }
        }

        breakdown
    }

    fn net_worth(&self) -> f64 {
        self.total_assets - self.total_liabilities
    }
}

/// The net worth recorded for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetWorthSnapshot {
    pub id: DatabaseId,
    pub date: Date,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub net_worth: f64,
    pub cash_and_investments: f64,
    pub credit_cards: f64,
    pub loans: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// How net worth moved since the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetWorthChange {
    pub amount: f64,
    /// `None` when the previous net worth was zero.
    pub percentage: Option<f64>,
    pub days_ago: i64,
}

/// One point of the net worth trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetWorthTrendPoint {
    #[serde(flatten)]
    pub snapshot: NetWorthSnapshot,
    pub net_worth_display: String,
    pub change_from_previous: Option<NetWorthChange>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Calculate the current net worth from the stored account balances.
pub fn calculate_net_worth(connection: &Connection) -> Result<NetWorth, Error> {
    let breakdown = Breakdown::from_accounts(&get_all_accounts(connection)?);
    let net_worth = breakdown.net_worth();

    Ok(NetWorth {
        total_assets: breakdown.total_assets,
        total_liabilities: breakdown.total_liabilities,
        net_worth,
        net_worth_display: format_currency(net_worth),
        as_of: OffsetDateTime::now_utc(),
    })
}

pub fn create_net_worth_snapshot_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS net_worth_snapshot (
            id INTEGER PRIMARY KEY,
            date TEXT NOT NULL UNIQUE,
            total_assets REAL NOT NULL DEFAULT 0,
            total_liabilities REAL NOT NULL DEFAULT 0,
            net_worth REAL NOT NULL DEFAULT 0,
            cash_and_investments REAL NOT NULL DEFAULT 0,
            credit_cards REAL NOT NULL DEFAULT 0,
            loans REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

const SNAPSHOT_COLUMNS: &str = "id, date, total_assets, total_liabilities, net_worth, \
    cash_and_investments, credit_cards, loans, created_at";

fn map_snapshot_row(row: &Row) -> Result<NetWorthSnapshot, rusqlite::Error> {
    Ok(NetWorthSnapshot {
        id: row.get(0)?,
        date: row.get(1)?,
        total_assets: row.get(2)?,
        total_liabilities: row.get(3)?,
        net_worth: row.get(4)?,
        cash_and_investments: row.get(5)?,
        credit_cards: row.get(6)?,
        loans: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Record the current net worth for `date`, replacing any earlier snapshot
/// for the same day.
pub fn record_net_worth_snapshot(
    date: Date,
    connection: &Connection,
) -> Result<NetWorthSnapshot, Error> {
    let breakdown = Breakdown::from_accounts(&get_all_accounts(connection)?);

    connection
        .query_row(
            &format!(
                "INSERT INTO net_worth_snapshot \
                (date, total_assets, total_liabilities, net_worth, cash_and_investments, \
                credit_cards, loans, created_at) \
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                ON CONFLICT(date) DO UPDATE SET \
                total_assets = excluded.total_assets, \
                total_liabilities = excluded.total_liabilities, \
                net_worth = excluded.net_worth, \
                cash_and_investments = excluded.cash_and_investments, \
                credit_cards = excluded.credit_cards, \
                loans = excluded.loans \
                RETURNING {SNAPSHOT_COLUMNS}"
            ),
            (
                date,
                breakdown.total_assets,
                breakdown.total_liabilities,
                breakdown.net_worth(),
                breakdown.cash_and_investments,
                breakdown.credit_cards,
                breakdown.loans,
                OffsetDateTime::now_utc(),
            ),
            map_snapshot_row,
        )
        .map_err(Error::from)
}

/// Get the snapshots from `days` days before `end_date` up to `end_date`,
/// oldest first, each with its change from the one before.
pub fn get_net_worth_trend(
    end_date: Date,
    days: i64,
    connection: &Connection,
) -> Result<Vec<NetWorthTrendPoint>, Error> {
    let start_date = end_date - Duration::days(days);

    let snapshots = connection
        .prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM net_worth_snapshot \
            WHERE date BETWEEN ?1 AND ?2 ORDER BY date ASC"
        ))?
        .query_map((start_date, end_date), map_snapshot_row)?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    let mut trend: Vec<NetWorthTrendPoint> = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let change_from_previous = trend.last().map(|previous| {
            let previous = &previous.snapshot;
            let amount = snapshot.net_worth - previous.net_worth;

            NetWorthChange {
                amount,
                percentage: (previous.net_worth != 0.0)
                    .then(|| amount / previous.net_worth.abs() * 100.0),
                days_ago: (snapshot.date - previous.date).whole_days(),
            }
        });

        trend.push(NetWorthTrendPoint {
            net_worth_display: format_currency(snapshot.net_worth),
            snapshot,
            change_from_previous,
        });
    }

    Ok(trend)
}

// ============================================================================
// TESTS
// ============================================================================
