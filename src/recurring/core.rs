//! Recurring transactions such as subscriptions, bills and pay.

use std::{fmt, str::FromStr};

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

use crate::{Error, category::CategoryId, database_id::DatabaseId};

pub type RecurringId = DatabaseId;

/// Recurring transactions due within this many days are "due soon".
pub const DUE_SOON_DAYS: i64 = 7;

// ============================================================================
// MODELS
// ============================================================================

/// How often a recurring transaction repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Frequency::Weekly => "Weekly",
            Frequency::Biweekly => "Every 2 Weeks",
            Frequency::Monthly => "Monthly",
            Frequency::Quarterly => "Quarterly",
            Frequency::Yearly => "Yearly",
        }
    }

    pub fn per_year(&self) -> f64 {
        match self {
            Frequency::Weekly => 52.0,
            Frequency::Biweekly => 26.0,
            Frequency::Monthly => 12.0,
            Frequency::Quarterly => 4.0,
            Frequency::Yearly => 1.0,
        }
    }

    /// Classify the typical number of days between occurrences.
    pub fn from_interval_days(days: f64) -> Option<Self> {
        match days {
            d if (6.0..=8.0).contains(&d) => Some(Frequency::Weekly),
            d if (13.0..=16.0).contains(&d) => Some(Frequency::Biweekly),
            d if (27.0..=33.0).contains(&d) => Some(Frequency::Monthly),
            d if (85.0..=97.0).contains(&d) => Some(Frequency::Quarterly),
            d if (350.0..=380.0).contains(&d) => Some(Frequency::Yearly),
            _ => None,
        }
    }

    /// The date of the occurrence after `date`.
    ///
    /// Month based frequencies keep the day of the month, clamped to the
    /// length of the target month.
    pub fn next_after(&self, date: Date) -> Date {
        match self {
            Frequency::Weekly => date + Duration::weeks(1),
            Frequency::Biweekly => date + Duration::weeks(2),
            Frequency::Monthly => add_months(date, 1),
            Frequency::Quarterly => add_months(date, 3),
            Frequency::Yearly => add_months(date, 12),
        }
    }
}

fn add_months(date: Date, months: i32) -> Date {
    let month_index = date.year() * 12 + (date.month() as i32 - 1) + months;
    let year = month_index.div_euclid(12);
    let Ok(month) = time::Month::try_from((month_index.rem_euclid(12) + 1) as u8) else {
        return date;
    };
    let day = date.day().min(month.length(year));

    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(Error::Validation(format!("unknown frequency \"{other}\""))),
        }
    }
}

impl ToSql for Frequency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Frequency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// A transaction expected to repeat on a schedule.
///
/// `amount` is always positive, `is_income` gives the direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringTransaction {
    pub id: RecurringId,
    pub name: String,
    pub merchant_name: Option<String>,
    pub amount: f64,
    pub frequency: Frequency,
    pub is_income: bool,
    pub is_active: bool,
    pub category_id: Option<CategoryId>,
    pub next_date: Option<Date>,
    pub last_date: Option<Date>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RecurringTransaction {
    /// The amount normalized to one month.
    pub fn monthly_amount(&self) -> f64 {
        self.amount * self.frequency.per_year() / 12.0
    }

    /// Whether the next occurrence falls between `today` and a week from now.
    pub fn is_due_soon(&self, today: Date) -> bool {
        self.next_date.is_some_and(|next_date| {
            next_date >= today && next_date <= today + Duration::days(DUE_SOON_DAYS)
        })
    }
}

/// The request body for creating or replacing a recurring transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecurringForm {
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    pub amount: f64,
    pub frequency: Frequency,
    #[serde(default)]
    pub is_income: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub next_date: Option<Date>,
    #[serde(default)]
    pub last_date: Option<Date>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_active() -> bool {
    true
}

impl RecurringForm {
    pub fn new(name: &str, amount: f64, frequency: Frequency) -> Self {
        Self {
            name: name.to_owned(),
            merchant_name: None,
            amount,
            frequency,
            is_income: false,
            is_active: true,
            category_id: None,
            next_date: None,
            last_date: None,
            notes: None,
        }
    }
}

/// Filters for [get_recurring_transactions].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecurringQuery {
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub is_income: Option<bool>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_recurring_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS recurring_transaction (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            merchant_name TEXT,
            amount REAL NOT NULL,
            frequency TEXT NOT NULL,
            is_income INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            category_id INTEGER,
            next_date TEXT,
            last_date TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(category_id) REFERENCES spending_category(id) ON UPDATE CASCADE ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recurring_next_date ON recurring_transaction(next_date);",
    )?;

    Ok(())
}

const SELECT_RECURRING: &str = "SELECT id, name, merchant_name, amount, frequency, is_income, \
    is_active, category_id, next_date, last_date, notes, created_at, updated_at \
    FROM recurring_transaction";

fn map_row(row: &Row) -> Result<RecurringTransaction, rusqlite::Error> {
    Ok(RecurringTransaction {
        id: row.get(0)?,
        name: row.get(1)?,
        merchant_name: row.get(2)?,
        amount: row.get(3)?,
        frequency: row.get(4)?,
        is_income: row.get(5)?,
        is_active: row.get(6)?,
        category_id: row.get(7)?,
        next_date: row.get(8)?,
        last_date: row.get(9)?,
        notes: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn validate(form: &RecurringForm) -> Result<String, Error> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Name cannot be empty".to_owned()));
    }
    if !form.amount.is_finite() || form.amount <= 0.0 {
        return Err(Error::Validation(format!(
            "amount must be a positive number, got {}",
            form.amount
        )));
    }

    Ok(name.to_owned())
}

fn map_write_error(error: rusqlite::Error) -> Error {
    match Error::from(error) {
        Error::NotFound => Error::Validation("The category does not exist".to_owned()),
        error => error,
    }
}

pub fn create_recurring_transaction(
    form: &RecurringForm,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    let name = validate(form)?;
    let now = OffsetDateTime::now_utc();

    connection
        .execute(
            "INSERT INTO recurring_transaction (name, merchant_name, amount, frequency, \
                is_income, is_active, category_id, next_date, last_date, notes, \
                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                name,
                form.merchant_name,
                form.amount,
                form.frequency,
                form.is_income,
                form.is_active,
                form.category_id,
                form.next_date,
                form.last_date,
                form.notes,
                now,
            ],
        )
        .map_err(map_write_error)?;

    get_recurring_transaction(connection.last_insert_rowid(), connection)
}

pub fn get_recurring_transaction(
    id: RecurringId,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    connection
        .query_row(&format!("{SELECT_RECURRING} WHERE id = ?1"), [id], map_row)
        .map_err(Error::from)
}

/// Retrieve recurring transactions ordered by next date (undated last),
/// then name.
pub fn get_recurring_transactions(
    query: &RecurringQuery,
    connection: &Connection,
) -> Result<Vec<RecurringTransaction>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_RECURRING} WHERE (?1 IS NULL OR is_active = ?1) \
            AND (?2 IS NULL OR category_id = ?2) AND (?3 IS NULL OR is_income = ?3) \
            ORDER BY next_date IS NULL, next_date ASC, name ASC"
        ))?
        .query_map(
            params![query.is_active, query.category, query.is_income],
            map_row,
        )?
        .map(|maybe_recurring| maybe_recurring.map_err(Error::from))
        .collect()
}

/// Find a recurring transaction by merchant (ignoring case) and frequency.
pub fn find_recurring_by_merchant(
    merchant_name: &str,
    frequency: Frequency,
    connection: &Connection,
) -> Result<Option<RecurringTransaction>, Error> {
    connection
        .query_row(
            &format!(
                "{SELECT_RECURRING} WHERE lower(merchant_name) = lower(?1) AND frequency = ?2 \
                ORDER BY id LIMIT 1"
            ),
            params![merchant_name, frequency],
            map_row,
        )
        .optional()
        .map_err(Error::from)
}

/// Replace a recurring transaction's fields.
pub fn update_recurring_transaction(
    id: RecurringId,
    form: &RecurringForm,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    let name = validate(form)?;

    let rows_affected = connection
        .execute(
            "UPDATE recurring_transaction SET name = ?1, merchant_name = ?2, amount = ?3, \
            frequency = ?4, is_income = ?5, is_active = ?6, category_id = ?7, next_date = ?8, \
            last_date = ?9, notes = ?10, updated_at = ?11 WHERE id = ?12",
            params![
                name,
                form.merchant_name,
                form.amount,
                form.frequency,
                form.is_income,
                form.is_active,
                form.category_id,
                form.next_date,
                form.last_date,
                form.notes,
                OffsetDateTime::now_utc(),
                id,
            ],
        )
        .map_err(map_write_error)?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_recurring_transaction(id, connection)
}

pub fn delete_recurring_transaction(id: RecurringId, connection: &Connection) -> Result<(), Error> {
    let rows_affected =
        connection.execute("DELETE FROM recurring_transaction WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        category::{delete_spending_category, test_utils::create_test_category},
        db::initialize,
    };

    use super::{
        Frequency, RecurringForm, RecurringQuery, create_recurring_transaction,
        delete_recurring_transaction, find_recurring_by_merchant, get_recurring_transaction,
        get_recurring_transactions, update_recurring_transaction,
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn classifies_intervals() {
        assert_eq!(Frequency::from_interval_days(7.0), Some(Frequency::Weekly));
        assert_eq!(Frequency::from_interval_days(14.5), Some(Frequency::Biweekly));
        assert_eq!(Frequency::from_interval_days(30.0), Some(Frequency::Monthly));
        assert_eq!(Frequency::from_interval_days(91.0), Some(Frequency::Quarterly));
        assert_eq!(Frequency::from_interval_days(365.0), Some(Frequency::Yearly));
        assert_eq!(Frequency::from_interval_days(20.0), None);
        assert_eq!(Frequency::from_interval_days(0.0), None);
    }

    #[test]
    fn next_date_clamps_to_month_end() {
        assert_eq!(
            Frequency::Monthly.next_after(date!(2024 - 01 - 31)),
            date!(2024 - 02 - 29)
        );
        assert_eq!(
            Frequency::Quarterly.next_after(date!(2024 - 11 - 30)),
            date!(2025 - 02 - 28)
        );
        assert_eq!(
            Frequency::Biweekly.next_after(date!(2024 - 12 - 25)),
            date!(2025 - 01 - 08)
        );
    }

    #[test]
    fn monthly_amount_and_due_soon() {
        let connection = get_test_connection();
        let mut form = RecurringForm::new("Gym", 12.0, Frequency::Weekly);
        form.next_date = Some(date!(2024 - 03 - 05));
        let recurring = create_recurring_transaction(&form, &connection).unwrap();

        assert_eq!(recurring.monthly_amount(), 52.0);
        assert!(recurring.is_due_soon(date!(2024 - 03 - 01)));
        assert!(!recurring.is_due_soon(date!(2024 - 02 - 20)));
        assert!(!recurring.is_due_soon(date!(2024 - 03 - 06)));
    }

    #[test]
    fn rejects_non_positive_amount() {
        let connection = get_test_connection();

        let result = create_recurring_transaction(
            &RecurringForm::new("Rent", 0.0, Frequency::Monthly),
            &connection,
        );

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn filters_and_orders() {
        let connection = get_test_connection();
        let category = create_test_category("Bills", &[], None, &connection);
        let mut rent = RecurringForm::new("Rent", 1500.0, Frequency::Monthly);
        rent.category_id = Some(category.id);
        rent.next_date = Some(date!(2024 - 04 - 01));
        let rent = create_recurring_transaction(&rent, &connection).unwrap();
        let mut pay = RecurringForm::new("Pay", 3000.0, Frequency::Biweekly);
        pay.is_income = true;
        pay.next_date = Some(date!(2024 - 03 - 15));
        let pay = create_recurring_transaction(&pay, &connection).unwrap();
        let mut old = RecurringForm::new("Old", 5.0, Frequency::Yearly);
        old.is_active = false;
        let old = create_recurring_transaction(&old, &connection).unwrap();

        let all = get_recurring_transactions(&RecurringQuery::default(), &connection).unwrap();
        let income = get_recurring_transactions(
            &RecurringQuery {
                is_income: Some(true),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();
        let inactive = get_recurring_transactions(
            &RecurringQuery {
                is_active: Some(false),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();
        let bills = get_recurring_transactions(
            &RecurringQuery {
                category: Some(category.id),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        assert_eq!(all, vec![pay.clone(), rent.clone(), old.clone()]);
        assert_eq!(income, vec![pay]);
        assert_eq!(inactive, vec![old]);
        assert_eq!(bills, vec![rent]);
    }

    #[test]
    fn update_and_delete() {
        let connection = get_test_connection();
        let created = create_recurring_transaction(
            &RecurringForm::new("Netflix", 15.49, Frequency::Monthly),
            &connection,
        )
        .unwrap();
        let mut form = RecurringForm::new("Netflix Premium", 22.99, Frequency::Monthly);
        form.merchant_name = Some("Netflix".to_owned());

        let updated = update_recurring_transaction(created.id, &form, &connection).unwrap();

        assert_eq!(updated.name, "Netflix Premium");
        assert_eq!(updated.amount, 22.99);
        assert_eq!(
            find_recurring_by_merchant("NETFLIX", Frequency::Monthly, &connection).unwrap(),
            Some(updated.clone())
        );
        assert_eq!(
            find_recurring_by_merchant("netflix", Frequency::Yearly, &connection).unwrap(),
            None
        );

        delete_recurring_transaction(created.id, &connection).unwrap();
        assert_eq!(
            get_recurring_transaction(created.id, &connection),
            Err(Error::NotFound)
        );
        assert_eq!(
            update_recurring_transaction(created.id, &form, &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn deleting_category_keeps_recurring() {
        let connection = get_test_connection();
        let category = create_test_category("Streaming", &[], None, &connection);
        let mut form = RecurringForm::new("Netflix", 15.49, Frequency::Monthly);
        form.category_id = Some(category.id);
        let recurring = create_recurring_transaction(&form, &connection).unwrap();

        delete_spending_category(category.id, &connection).unwrap();

        let recurring = get_recurring_transaction(recurring.id, &connection).unwrap();
        assert_eq!(recurring.category_id, None);
    }

    #[test]
    fn missing_category_is_a_validation_error() {
        let connection = get_test_connection();
        let mut form = RecurringForm::new("Netflix", 15.49, Frequency::Monthly);
        form.category_id = Some(999);

        let result = create_recurring_transaction(&form, &connection);

        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
