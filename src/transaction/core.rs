//! Defines the core data models and database queries for transactions.

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::AccountId,
    database_id::DatabaseId,
    db::{count_column, json_column, to_json_text},
    plaid::PlaidTransaction,
};

pub type TransactionId = DatabaseId;

// ============================================================================
// MODELS
// ============================================================================

/// A movement of money in or out of an account.
///
/// Amounts follow Plaid's sign convention: positive values are money leaving
/// the account (purchases, fees) and negative values are money coming in
/// (pay, refunds).
///
/// To create a manual transaction, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    /// Plaid's ID, or `manual_<uuid>` for transactions entered by hand.
    pub plaid_transaction_id: String,
    pub amount: f64,
    pub iso_currency_code: Option<String>,
    pub name: String,
    pub merchant_name: Option<String>,
    /// The category path, most general first.
    pub category: Vec<String>,
    pub primary_category: Option<String>,
    pub detailed_category: Option<String>,
    pub date: Date,
    pub authorized_date: Option<Date>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub datetime: Option<OffsetDateTime>,
    pub payment_channel: Option<String>,
    pub transaction_type: Option<String>,
    pub location: Option<serde_json::Value>,
    pub pending: bool,
    pub pending_transaction_id: Option<String>,
    pub account_owner: Option<String>,
    /// A category chosen by the user, overriding Plaid's.
    pub user_category: Option<String>,
    pub notes: Option<String>,
    pub is_manual: bool,
    /// Excluded transactions are left out of spending and cash flow reports.
    pub exclude_from_reports: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Transaction {
    /// Create a new manual transaction.
    ///
    /// Shortcut for [ManualTransactionBuilder] for discoverability.
    pub fn build(account_id: AccountId, amount: f64, date: Date) -> ManualTransactionBuilder {
        ManualTransactionBuilder {
            account_id,
            amount,
            date,
            name: "Manual Transaction".to_owned(),
            merchant_name: None,
            category: "OTHER".to_owned(),
            user_category: None,
            notes: None,
        }
    }

    /// The user's category, else the primary category in title case, else
    /// "Uncategorized".
    pub fn category_display(&self) -> String {
        if let Some(user_category) = &self.user_category {
            return user_category.clone();
        }

        match &self.primary_category {
            Some(primary_category) => title_case(primary_category),
            None => "Uncategorized".to_owned(),
        }
    }
}

/// Turn "FOOD_AND_DRINK" or "food and drink" into "Food And Drink".
pub fn title_case(text: &str) -> String {
    text.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A builder for transactions entered by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualTransactionBuilder {
    pub account_id: AccountId,
    pub amount: f64,
    pub date: Date,
    pub name: String,
    pub merchant_name: Option<String>,
    /// Stored as the primary category and the single entry of the category path.
    pub category: String,
    pub user_category: Option<String>,
    pub notes: Option<String>,
}

impl ManualTransactionBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn merchant_name(mut self, merchant_name: Option<String>) -> Self {
        self.merchant_name = merchant_name;
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self
    }

    pub fn user_category(mut self, user_category: Option<String>) -> Self {
        self.user_category = user_category;
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// The request body for creating a manual transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualTransactionForm {
    pub account_id: AccountId,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub date: Option<Date>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub user_category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ManualTransactionForm {
    /// Convert the form into a builder, defaulting the date to `today`.
    pub fn into_builder(self, today: Date) -> ManualTransactionBuilder {
        let mut builder = Transaction::build(self.account_id, self.amount, self.date.unwrap_or(today))
            .merchant_name(non_blank(self.merchant_name))
            .user_category(non_blank(self.user_category))
            .notes(non_blank(self.notes));

        if let Some(description) = non_blank(self.description) {
            builder = builder.name(&description);
        }
        if let Some(category) = non_blank(self.category) {
            builder = builder.category(&category);
        }

        builder
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Whether an upsert inserted a new row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(TransactionId),
    Updated(TransactionId),
}

impl UpsertOutcome {
    pub fn id(&self) -> TransactionId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            plaid_transaction_id TEXT NOT NULL UNIQUE,
            amount REAL NOT NULL,
            iso_currency_code TEXT,
            name TEXT NOT NULL,
            merchant_name TEXT,
            category TEXT NOT NULL DEFAULT '[]',
            primary_category TEXT,
            detailed_category TEXT,
            date TEXT NOT NULL,
            authorized_date TEXT,
            datetime TEXT,
            payment_channel TEXT,
            transaction_type TEXT,
            location TEXT,
            pending INTEGER NOT NULL DEFAULT 0,
            pending_transaction_id TEXT,
            account_owner TEXT,
            user_category TEXT,
            notes TEXT,
            is_manual INTEGER NOT NULL DEFAULT 0,
            exclude_from_reports INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_transaction_date ON \"transaction\"(date);
        CREATE INDEX IF NOT EXISTS idx_transaction_account_date ON \"transaction\"(account_id, date);
        CREATE INDEX IF NOT EXISTS idx_transaction_primary_category ON \"transaction\"(primary_category);",
    )?;

    Ok(())
}

/// The transaction columns, in the order [map_transaction_row] expects,
/// qualified with the alias `t`.
pub const TRANSACTION_COLUMNS: &str = "t.id, t.account_id, t.plaid_transaction_id, t.amount, \
    t.iso_currency_code, t.name, t.merchant_name, t.category, t.primary_category, \
    t.detailed_category, t.date, t.authorized_date, t.datetime, t.payment_channel, \
    t.transaction_type, t.location, t.pending, t.pending_transaction_id, t.account_owner, \
    t.user_category, t.notes, t.is_manual, t.exclude_from_reports, t.created_at, t.updated_at";

/// The number of columns in [TRANSACTION_COLUMNS].
pub const TRANSACTION_COLUMN_COUNT: usize = 25;

pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        plaid_transaction_id: row.get(2)?,
        amount: row.get(3)?,
        iso_currency_code: row.get(4)?,
        name: row.get(5)?,
        merchant_name: row.get(6)?,
        category: json_column(row, 7)?,
        primary_category: row.get(8)?,
        detailed_category: row.get(9)?,
        date: row.get(10)?,
        authorized_date: row.get(11)?,
        datetime: row.get(12)?,
        payment_channel: row.get(13)?,
        transaction_type: row.get(14)?,
        location: json_column(row, 15)?,
        pending: row.get(16)?,
        pending_transaction_id: row.get(17)?,
        account_owner: row.get(18)?,
        user_category: row.get(19)?,
        notes: row.get(20)?,
        is_manual: row.get(21)?,
        exclude_from_reports: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .query_row(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" t WHERE t.id = ?1"),
            [id],
            map_transaction_row,
        )
        .map_err(Error::from)
}

/// Insert a transaction reported by Plaid, or refresh the stored copy.
///
/// Transactions are keyed by their Plaid transaction ID, so seeing the same
/// transaction again from a sync page or the historical backfill never
/// creates a duplicate. Fields set by the user (category override, notes and
/// the report exclusion flag) are left untouched.
pub fn upsert_plaid_transaction(
    account_id: AccountId,
    plaid_transaction: &PlaidTransaction,
    connection: &Connection,
) -> Result<UpsertOutcome, Error> {
    let existing: Option<TransactionId> = connection
        .query_row(
            "SELECT id FROM \"transaction\" WHERE plaid_transaction_id = ?1",
            [&plaid_transaction.transaction_id],
            |row| row.get(0),
        )
        .optional()?;

    let category = to_json_text(&plaid_transaction.categories())?;
    let location = plaid_transaction
        .location
        .as_ref()
        .map(to_json_text)
        .transpose()?;
    let now = OffsetDateTime::now_utc();

    match existing {
        Some(id) => {
            connection.execute(
                "UPDATE \"transaction\" SET account_id = ?1, amount = ?2, iso_currency_code = ?3, \
                name = ?4, merchant_name = ?5, category = ?6, primary_category = ?7, \
                detailed_category = ?8, date = ?9, authorized_date = ?10, datetime = ?11, \
                payment_channel = ?12, transaction_type = ?13, location = ?14, pending = ?15, \
                pending_transaction_id = ?16, account_owner = ?17, updated_at = ?18 WHERE id = ?19",
                params![
                    account_id,
                    plaid_transaction.amount,
                    plaid_transaction.iso_currency_code,
                    plaid_transaction.name,
                    plaid_transaction.merchant_name,
                    category,
                    plaid_transaction.primary_category(),
                    plaid_transaction.detailed_category(),
                    plaid_transaction.date,
                    plaid_transaction.authorized_date,
                    plaid_transaction.datetime,
                    plaid_transaction.payment_channel,
                    plaid_transaction.transaction_type,
                    location,
                    plaid_transaction.pending,
                    plaid_transaction.pending_transaction_id,
                    plaid_transaction.account_owner,
                    now,
                    id,
                ],
            )?;

            Ok(UpsertOutcome::Updated(id))
        }
        None => {
            connection.execute(
                "INSERT INTO \"transaction\" (account_id, plaid_transaction_id, amount, \
                    iso_currency_code, name, merchant_name, category, primary_category, \
                    detailed_category, date, authorized_date, datetime, payment_channel, \
                    transaction_type, location, pending, pending_transaction_id, account_owner, \
                    is_manual, exclude_from_reports, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                    ?17, ?18, 0, 0, ?19, ?19)",
                params![
                    account_id,
                    plaid_transaction.transaction_id,
                    plaid_transaction.amount,
                    plaid_transaction.iso_currency_code,
                    plaid_transaction.name,
                    plaid_transaction.merchant_name,
                    category,
                    plaid_transaction.primary_category(),
                    plaid_transaction.detailed_category(),
                    plaid_transaction.date,
                    plaid_transaction.authorized_date,
                    plaid_transaction.datetime,
                    plaid_transaction.payment_channel,
                    plaid_transaction.transaction_type,
                    location,
                    plaid_transaction.pending,
                    plaid_transaction.pending_transaction_id,
                    plaid_transaction.account_owner,
                    now,
                ],
            )?;

            Ok(UpsertOutcome::Created(connection.last_insert_rowid()))
        }
    }
}

/// Delete transactions by their Plaid IDs, returning how many were removed.
pub fn delete_plaid_transactions(
    plaid_transaction_ids: &[String],
    connection: &Connection,
) -> Result<usize, Error> {
    let mut statement =
        connection.prepare("DELETE FROM \"transaction\" WHERE plaid_transaction_id = ?1")?;

    let mut deleted = 0;
    for plaid_transaction_id in plaid_transaction_ids {
        deleted += statement.execute([plaid_transaction_id])?;
    }

    Ok(deleted)
}

/// Delete transactions by Plaid ID, only touching those that belong to
/// `institution_id`.
pub fn delete_institution_transactions(
    institution_id: DatabaseId,
    plaid_transaction_ids: &[String],
    connection: &Connection,
) -> Result<usize, Error> {
    let mut statement = connection.prepare(
        "DELETE FROM \"transaction\" WHERE plaid_transaction_id = ?1 \
        AND account_id IN (SELECT id FROM account WHERE institution_id = ?2)",
    )?;

    let mut deleted = 0;
    for plaid_transaction_id in plaid_transaction_ids {
        deleted += statement.execute(params![plaid_transaction_id, institution_id])?;
    }

    Ok(deleted)
}

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_manual_transaction(
    builder: ManualTransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let plaid_transaction_id = format!("manual_{}", uuid::Uuid::new_v4());
    let category = to_json_text(&vec![builder.category.clone()])?;
    let now = OffsetDateTime::now_utc();

    connection
        .execute(
            "INSERT INTO \"transaction\" (account_id, plaid_transaction_id, amount, \
                iso_currency_code, name, merchant_name, category, primary_category, date, \
                pending, user_category, notes, is_manual, exclude_from_reports, created_at, updated_at)
            VALUES (?1, ?2, ?3, 'USD', ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, 1, 0, ?11, ?11)",
            params![
                builder.account_id,
                plaid_transaction_id,
                builder.amount,
                builder.name,
                builder.merchant_name,
                category,
                builder.category,
                builder.date,
                builder.user_category,
                builder.notes,
                now,
            ],
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    get_transaction(connection.last_insert_rowid(), connection)
}

/// Set the user's category override. A blank category clears it.
pub fn set_user_category(
    id: TransactionId,
    user_category: Option<&str>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let user_category = user_category.map(str::trim).filter(|text| !text.is_empty());

    update_and_get(
        id,
        "UPDATE \"transaction\" SET user_category = ?1, updated_at = ?2 WHERE id = ?3",
        user_category,
        connection,
    )
}

pub fn set_notes(
    id: TransactionId,
    notes: Option<&str>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let notes = notes.map(str::trim).filter(|text| !text.is_empty());

    update_and_get(
        id,
        "UPDATE \"transaction\" SET notes = ?1, updated_at = ?2 WHERE id = ?3",
        notes,
        connection,
    )
}

/// Set whether a transaction is left out of reports, or flip it when
/// `exclude` is `None`.
pub fn set_exclude_from_reports(
    id: TransactionId,
    exclude: Option<bool>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    update_and_get(
        id,
        "UPDATE \"transaction\" SET exclude_from_reports = COALESCE(?1, NOT exclude_from_reports), \
        updated_at = ?2 WHERE id = ?3",
        exclude,
        connection,
    )
}

fn update_and_get<T: rusqlite::ToSql>(
    id: TransactionId,
    query: &str,
    value: T,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let rows_affected = connection.execute(query, params![value, OffsetDateTime::now_utc(), id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_transaction(id, connection)
}

/// Count the stored transactions for an institution.
pub fn count_institution_transactions(
    institution_id: DatabaseId,
    connection: &Connection,
) -> Result<u64, Error> {
    connection
        .query_row(
            "SELECT COUNT(*) FROM \"transaction\" t \
            INNER JOIN account a ON a.id = t.account_id WHERE a.institution_id = ?1",
            [institution_id],
            |row| count_column(row, 0),
        )
        .map_err(Error::from)
}

// ============================================================================
// TESTS
// ============================================================================
