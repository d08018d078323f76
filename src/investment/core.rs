//! Securities, holdings and investment transactions reported by Plaid.

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::AccountId,
    database_id::DatabaseId,
    plaid::{PlaidHolding, PlaidInvestmentTransaction, PlaidSecurity},
    transaction::UpsertOutcome,
};

pub type SecurityId = DatabaseId;
pub type HoldingId = DatabaseId;
pub type InvestmentTransactionId = DatabaseId;

// ============================================================================
// MODELS
// ============================================================================

/// A stock, fund, bond or cash position type that can be held.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Security {
    pub id: SecurityId,
    pub plaid_security_id: String,
    pub name: String,
    pub ticker_symbol: Option<String>,
    pub cusip: Option<String>,
    pub isin: Option<String>,
    pub sedol: Option<String>,
    #[serde(rename = "type")]
    pub security_type: Option<String>,
    pub close_price: Option<f64>,
    pub close_price_as_of: Option<Date>,
    pub institution_id: Option<String>,
    pub institution_security_id: Option<String>,
    pub is_cash_equivalent: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A position in one security held in one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub id: HoldingId,
    pub account_id: AccountId,
    pub security_id: SecurityId,
    pub quantity: f64,
    pub institution_price: f64,
    pub institution_price_as_of: Option<Date>,
    pub institution_value: f64,
    pub cost_basis: Option<f64>,
    pub iso_currency_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Holding {
    /// Value minus cost basis. `None` without a (non-zero) cost basis.
    pub fn unrealized_gain_loss(&self) -> Option<f64> {
        self.cost_basis
            .filter(|cost_basis| *cost_basis != 0.0)
            .map(|cost_basis| self.institution_value - cost_basis)
    }

    pub fn unrealized_gain_loss_percent(&self) -> Option<f64> {
        self.cost_basis
            .filter(|cost_basis| *cost_basis > 0.0)
            .map(|cost_basis| (self.institution_value - cost_basis) / cost_basis * 100.0)
    }
}

/// A buy, sell, dividend, fee or other movement in an investment account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentTransaction {
    pub id: InvestmentTransactionId,
    pub account_id: AccountId,
    pub plaid_investment_transaction_id: String,
    pub security_id: Option<SecurityId>,
    pub amount: f64,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub fees: Option<f64>,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub subtype: Option<String>,
    pub date: Date,
    pub name: String,
    pub iso_currency_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_security_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS security (
            id INTEGER PRIMARY KEY,
            plaid_security_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            ticker_symbol TEXT,
            cusip TEXT,
            isin TEXT,
            sedol TEXT,
            security_type TEXT,
            close_price REAL,
            close_price_as_of TEXT,
            institution_id TEXT,
            institution_security_id TEXT,
            is_cash_equivalent INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

pub fn create_holding_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS holding (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            security_id INTEGER NOT NULL,
            quantity REAL NOT NULL,
            institution_price REAL NOT NULL,
            institution_price_as_of TEXT,
            institution_value REAL NOT NULL,
            cost_basis REAL,
            iso_currency_code TEXT NOT NULL DEFAULT 'USD',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(account_id, security_id),
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(security_id) REFERENCES security(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_holding_value ON holding(institution_value);",
    )?;

    Ok(())
}

pub fn create_investment_transaction_table(
    connection: &Connection,
) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS investment_transaction (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            plaid_investment_transaction_id TEXT NOT NULL UNIQUE,
            security_id INTEGER,
            amount REAL NOT NULL,
            quantity REAL,
            price REAL,
            fees REAL,
            transaction_type TEXT NOT NULL,
            subtype TEXT,
            date TEXT NOT NULL,
            name TEXT NOT NULL,
            iso_currency_code TEXT NOT NULL DEFAULT 'USD',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(security_id) REFERENCES security(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_investment_transaction_date ON investment_transaction(date);
        CREATE INDEX IF NOT EXISTS idx_investment_transaction_account ON investment_transaction(account_id);
        CREATE INDEX IF NOT EXISTS idx_investment_transaction_type ON investment_transaction(transaction_type);",
    )?;

    Ok(())
}

pub const SECURITY_COLUMNS: &str = "s.id, s.plaid_security_id, s.name, s.ticker_symbol, s.cusip, \
    s.isin, s.sedol, s.security_type, s.close_price, s.close_price_as_of, s.institution_id, \
    s.institution_security_id, s.is_cash_equivalent, s.created_at, s.updated_at";

pub const SECURITY_COLUMN_COUNT: usize = 15;

/// Map a row holding [SECURITY_COLUMNS] starting at column `offset`.
pub fn map_security_row(row: &Row, offset: usize) -> Result<Security, rusqlite::Error> {
    Ok(Security {
        id: row.get(offset)?,
        plaid_security_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        ticker_symbol: row.get(offset + 3)?,
        cusip: row.get(offset + 4)?,
        isin: row.get(offset + 5)?,
        sedol: row.get(offset + 6)?,
        security_type: row.get(offset + 7)?,
        close_price: row.get(offset + 8)?,
        close_price_as_of: row.get(offset + 9)?,
        institution_id: row.get(offset + 10)?,
        institution_security_id: row.get(offset + 11)?,
        is_cash_equivalent: row.get(offset + 12)?,
        created_at: row.get(offset + 13)?,
        updated_at: row.get(offset + 14)?,
    })
}

pub const HOLDING_COLUMNS: &str = "h.id, h.account_id, h.security_id, h.quantity, \
    h.institution_price, h.institution_price_as_of, h.institution_value, h.cost_basis, \
    h.iso_currency_code, h.created_at, h.updated_at";

pub const HOLDING_COLUMN_COUNT: usize = 11;

pub fn map_holding_row(row: &Row) -> Result<Holding, rusqlite::Error> {
    Ok(Holding {
        id: row.get(0)?,
        account_id: row.get(1)?,
        security_id: row.get(2)?,
        quantity: row.get(3)?,
        institution_price: row.get(4)?,
        institution_price_as_of: row.get(5)?,
        institution_value: row.get(6)?,
        cost_basis: row.get(7)?,
        iso_currency_code: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub const INVESTMENT_TRANSACTION_COLUMNS: &str = "it.id, it.account_id, \
    it.plaid_investment_transaction_id, it.security_id, it.amount, it.quantity, it.price, \
    it.fees, it.transaction_type, it.subtype, it.date, it.name, it.iso_currency_code, \
    it.created_at, it.updated_at";

pub const INVESTMENT_TRANSACTION_COLUMN_COUNT: usize = 15;

pub fn map_investment_transaction_row(
    row: &Row,
) -> Result<InvestmentTransaction, rusqlite::Error> {
    Ok(InvestmentTransaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        plaid_investment_transaction_id: row.get(2)?,
        security_id: row.get(3)?,
        amount: row.get(4)?,
        quantity: row.get(5)?,
        price: row.get(6)?,
        fees: row.get(7)?,
        transaction_type: row.get(8)?,
        subtype: row.get(9)?,
        date: row.get(10)?,
        name: row.get(11)?,
        iso_currency_code: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Insert or refresh a security by its Plaid security ID and return the local ID.
pub fn upsert_security(security: &PlaidSecurity, connection: &Connection) -> Result<SecurityId, Error> {
    let name = security
        .name
        .clone()
        .or_else(|| security.ticker_symbol.clone())
        .unwrap_or_else(|| "Unknown Security".to_owned());

    connection
        .query_row(
            "INSERT INTO security (plaid_security_id, name, ticker_symbol, cusip, isin, sedol, \
                security_type, close_price, close_price_as_of, institution_id, \
                institution_security_id, is_cash_equivalent, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            ON CONFLICT(plaid_security_id) DO UPDATE SET
                name = excluded.name,
                ticker_symbol = excluded.ticker_symbol,
                cusip = excluded.cusip,
                isin = excluded.isin,
                sedol = excluded.sedol,
                security_type = excluded.security_type,
                close_price = excluded.close_price,
                close_price_as_of = excluded.close_price_as_of,
                institution_id = excluded.institution_id,
                institution_security_id = excluded.institution_security_id,
                is_cash_equivalent = excluded.is_cash_equivalent,
                updated_at = excluded.updated_at
            RETURNING id",
            params![
                security.security_id,
                name,
                security.ticker_symbol,
                security.cusip,
                security.isin,
                security.sedol,
                security.security_type,
                security.close_price,
                security.close_price_as_of,
                security.institution_id,
                security.institution_security_id,
                security.is_cash_equivalent.unwrap_or(false),
                OffsetDateTime::now_utc(),
            ],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

pub fn get_security_id(
    plaid_security_id: &str,
    connection: &Connection,
) -> Result<Option<SecurityId>, Error> {
    connection
        .query_row(
            "SELECT id FROM security WHERE plaid_security_id = ?1",
            [plaid_security_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
}

/// Insert or refresh the position for an account and security.
pub fn upsert_holding(
    account_id: AccountId,
    security_id: SecurityId,
    holding: &PlaidHolding,
    connection: &Connection,
) -> Result<HoldingId, Error> {
    connection
        .query_row(
            "INSERT INTO holding (account_id, security_id, quantity, institution_price, \
                institution_price_as_of, institution_value, cost_basis, iso_currency_code, \
                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(account_id, security_id) DO UPDATE SET
                quantity = excluded.quantity,
                institution_price = excluded.institution_price,
                institution_price_as_of = excluded.institution_price_as_of,
                institution_value = excluded.institution_value,
                cost_basis = excluded.cost_basis,
                iso_currency_code = excluded.iso_currency_code,
                updated_at = excluded.updated_at
            RETURNING id",
            params![
                account_id,
                security_id,
                holding.quantity,
                holding.institution_price,
                holding.institution_price_as_of,
                holding.institution_value,
                holding.cost_basis,
                holding.iso_currency_code.as_deref().unwrap_or("USD"),
                OffsetDateTime::now_utc(),
            ],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// Delete the holdings of `account_id` other than those in `keep`.
///
/// Returns the number of holdings deleted.
pub fn delete_stale_holdings(
    account_id: AccountId,
    keep: &[HoldingId],
    connection: &Connection,
) -> Result<usize, Error> {
    let existing: Vec<HoldingId> = connection
        .prepare("SELECT id FROM holding WHERE account_id = ?1")?
        .query_map([account_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut deleted = 0;
    for id in existing.into_iter().filter(|id| !keep.contains(id)) {
        deleted += connection.execute("DELETE FROM holding WHERE id = ?1", [id])?;
    }

    Ok(deleted)
}

/// Insert or refresh an investment transaction by its Plaid ID.
pub fn upsert_investment_transaction(
    account_id: AccountId,
    security_id: Option<SecurityId>,
    transaction: &PlaidInvestmentTransaction,
    connection: &Connection,
) -> Result<UpsertOutcome, Error> {
    let existing: Option<InvestmentTransactionId> = connection
        .query_row(
            "SELECT id FROM investment_transaction WHERE plaid_investment_transaction_id = ?1",
            [&transaction.investment_transaction_id],
            |row| row.get(0),
        )
        .optional()?;

    let now = OffsetDateTime::now_utc();
    let currency = transaction.iso_currency_code.as_deref().unwrap_or("USD");

    match existing {
        Some(id) => {
            connection.execute(
                "UPDATE investment_transaction SET account_id = ?1, security_id = ?2, \
                amount = ?3, quantity = ?4, price = ?5, fees = ?6, transaction_type = ?7, \
                subtype = ?8, date = ?9, name = ?10, iso_currency_code = ?11, updated_at = ?12 \
                WHERE id = ?13",
                params![
                    account_id,
                    security_id,
                    transaction.amount,
                    transaction.quantity,
                    transaction.price,
                    transaction.fees,
                    transaction.transaction_type,
                    transaction.subtype,
                    transaction.date,
                    transaction.name,
                    currency,
                    now,
                    id,
                ],
            )?;

            Ok(UpsertOutcome::Updated(id))
        }
        None => {
            connection.execute(
                "INSERT INTO investment_transaction (account_id, plaid_investment_transaction_id, \
                    security_id, amount, quantity, price, fees, transaction_type, subtype, date, \
                    name, iso_currency_code, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    account_id,
                    transaction.investment_transaction_id,
                    security_id,
                    transaction.amount,
                    transaction.quantity,
                    transaction.price,
                    transaction.fees,
                    transaction.transaction_type,
                    transaction.subtype,
                    transaction.date,
                    transaction.name,
                    currency,
                    now,
                ],
            )?;

            Ok(UpsertOutcome::Created(connection.last_insert_rowid()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub mod test_utils {
    use time::Date;

    use crate::plaid::{PlaidHolding, PlaidInvestmentTransaction, PlaidSecurity};

    pub fn plaid_security(security_id: &str, ticker: &str, close_price: f64) -> PlaidSecurity {
        PlaidSecurity {
            security_id: security_id.to_owned(),
            name: Some(format!("{ticker} Inc.")),
            ticker_symbol: Some(ticker.to_owned()),
            cusip: None,
            isin: None,
            sedol: None,
            security_type: Some("equity".to_owned()),
            close_price: Some(close_price),
            close_price_as_of: None,
            institution_id: None,
            institution_security_id: None,
            is_cash_equivalent: Some(false),
        }
    }

    pub fn plaid_holding(
        account_id: &str,
        security_id: &str,
        quantity: f64,
        price: f64,
        cost_basis: Option<f64>,
    ) -> PlaidHolding {
        PlaidHolding {
            account_id: account_id.to_owned(),
            security_id: security_id.to_owned(),
            quantity,
            institution_price: price,
            institution_price_as_of: None,
            institution_value: quantity * price,
            cost_basis,
            iso_currency_code: Some("USD".to_owned()),
        }
    }

    pub fn plaid_investment_transaction(
        id: &str,
        account_id: &str,
        security_id: Option<&str>,
        transaction_type: &str,
        amount: f64,
        date: Date,
    ) -> PlaidInvestmentTransaction {
        PlaidInvestmentTransaction {
            investment_transaction_id: id.to_owned(),
            account_id: account_id.to_owned(),
            security_id: security_id.map(str::to_owned),
            date,
            name: format!("{transaction_type} {id}"),
            quantity: 1.0,
            amount,
            price: amount,
            fees: None,
            transaction_type: transaction_type.to_owned(),
            subtype: None,
            iso_currency_code: Some("USD".to_owned()),
        }
    }
}
