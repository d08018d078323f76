//! Database initialization and helpers shared by the domain modules.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Row, Transaction, TransactionBehavior, types::Type};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Error,
    account::create_account_table,
    analytics::create_net_worth_snapshot_table,
    category::create_spending_category_table,
    institution::create_institution_table,
    investment::{
        create_holding_table, create_investment_transaction_table, create_security_table,
    },
    recurring::create_recurring_transaction_table,
    transaction::create_transaction_table,
    webhook::create_webhook_table,
};

/// Create all of the application's tables if they do not already exist.
///
/// Also turns on foreign key enforcement for `connection`, which the cascade
/// deletes rely on.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction =
        Transaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_institution_table(&transaction)?;
    create_account_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_spending_category_table(&transaction)?;
    create_recurring_transaction_table(&transaction)?;
    create_security_table(&transaction)?;
    create_holding_table(&transaction)?;
    create_investment_transaction_table(&transaction)?;
    create_net_worth_snapshot_table(&transaction)?;
    create_webhook_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Lock the shared connection, logging and converting a poisoned lock.
pub fn lock_connection(
    db_connection: &Mutex<Connection>,
) -> Result<MutexGuard<'_, Connection>, Error> {
    db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })
}

/// Serialize `value` for storage in a JSON text column.
pub fn to_json_text<T: Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(Error::from)
}

/// Read a JSON text column, treating NULL as the default value.
pub fn json_column<T: DeserializeOwned + Default>(
    row: &Row,
    index: usize,
) -> Result<T, rusqlite::Error> {
    let text: Option<String> = row.get(index)?;

    match text {
        None => Ok(T::default()),
        Some(text) => serde_json::from_str(&text).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
        }),
    }
}

/// Read a non-negative integer column such as `COUNT(*)`.
///
/// SQLite integers are signed, so the value is read as `i64` and rejected
/// if it is negative.
pub fn count_column(row: &Row, index: usize) -> Result<u64, rusqlite::Error> {
    let value: i64 = row.get(index)?;

    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(index, value))
}
