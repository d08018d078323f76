//! Filtered, paginated transaction queries.

use rusqlite::{Connection, ToSql, params_from_iter};
use serde::Deserialize;
use time::Date;

use crate::{
    Error,
    db::count_column,
    pagination::{Page, PageRequest},
    timezone::parse_iso_date,
    transaction::{
        TransactionView,
        core::{TRANSACTION_COLUMN_COUNT, TRANSACTION_COLUMNS, map_transaction_row},
    },
};

/// The query string accepted by the transaction list.
///
/// Values are kept as text so a malformed filter is ignored rather than
/// rejecting the whole request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// A local account ID or a Plaid account ID.
    pub account_id: Option<String>,
    pub category: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// The parsed filters for [query_transactions].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionFilter {
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub account: Option<String>,
    pub category: Option<String>,
    /// Compared against the absolute amount.
    pub min_amount: Option<f64>,
    /// Compared against the absolute amount.
    pub max_amount: Option<f64>,
    pub search: Option<String>,
}

impl From<&TransactionQuery> for TransactionFilter {
    fn from(query: &TransactionQuery) -> Self {
        let non_blank = |text: &Option<String>| {
            text.as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_owned)
        };
        let number = |text: &Option<String>| {
            text.as_deref()
                .and_then(|text| text.trim().parse::<f64>().ok())
                .filter(|number| number.is_finite())
        };

        Self {
            start_date: parse_iso_date(query.start_date.as_deref()),
            end_date: parse_iso_date(query.end_date.as_deref()),
            account: non_blank(&query.account_id),
            category: non_blank(&query.category),
            min_amount: number(&query.min_amount),
            max_amount: number(&query.max_amount),
            search: non_blank(&query.search),
        }
    }
}

impl TransactionFilter {
    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(start_date) = self.start_date {
            conditions.push("t.date >= ?");
            params.push(Box::new(start_date));
        }
        if let Some(end_date) = self.end_date {
            conditions.push("t.date <= ?");
            params.push(Box::new(end_date));
        }
        if let Some(account) = &self.account {
            conditions.push("(a.id = ? OR a.plaid_account_id = ?)");
            params.push(Box::new(account.parse::<i64>().ok()));
            params.push(Box::new(account.clone()));
        }
        if let Some(category) = &self.category {
            conditions.push("lower(t.primary_category) = lower(?)");
            params.push(Box::new(category.clone()));
        }
        if let Some(min_amount) = self.min_amount {
            conditions.push("abs(t.amount) >= ?");
            params.push(Box::new(min_amount));
        }
        if let Some(max_amount) = self.max_amount {
            conditions.push("abs(t.amount) <= ?");
            params.push(Box::new(max_amount));
        }
        if let Some(search) = &self.search {
            conditions.push(
                "(t.name LIKE ? ESCAPE '\\' OR t.merchant_name LIKE ? ESCAPE '\\' \
                OR t.notes LIKE ? ESCAPE '\\')",
            );
            let pattern = format!("%{}%", escape_like(search));
            for _ in 0..3 {
                params.push(Box::new(pattern.clone()));
            }
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (clause, params)
    }
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

const FROM_TRANSACTIONS: &str = "FROM \"transaction\" t \
    INNER JOIN account a ON a.id = t.account_id \
    INNER JOIN institution i ON i.id = a.institution_id";

/// Get one page of transactions matching `filter`, newest first.
///
/// # Errors
/// Returns [Error::SqlError] if the query fails.
pub fn query_transactions(
    filter: &TransactionFilter,
    page_request: PageRequest,
    connection: &Connection,
) -> Result<Page<TransactionView>, Error> {
    let (where_clause, mut params) = filter.where_clause();

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) {FROM_TRANSACTIONS} {where_clause}"),
        params_from_iter(params.iter()),
        |row| count_column(row, 0),
    )?;

    params.push(Box::new(page_request.page_size as i64));
    params.push(Box::new(page_request.offset() as i64));

    let results = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS}, COALESCE(a.custom_name, a.name), i.name \
            {FROM_TRANSACTIONS} {where_clause} \
            ORDER BY t.date DESC, t.datetime DESC, t.id DESC LIMIT ? OFFSET ?"
        ))?
        .query_map(params_from_iter(params.iter()), |row| {
            let transaction = map_transaction_row(row)?;
            let account_name: String = row.get(TRANSACTION_COLUMN_COUNT)?;
            let institution_name: String = row.get(TRANSACTION_COLUMN_COUNT + 1)?;

            Ok(TransactionView::new(transaction, account_name, institution_name))
        })?
        .map(|maybe_view| maybe_view.map_err(Error::from))
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Page::new(results, count, page_request))
}

/// Get every transaction between two dates (inclusive) with account and
/// institution names, newest first.
pub fn get_transactions_in_range(
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<TransactionView>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS}, COALESCE(a.custom_name, a.name), i.name \
            {FROM_TRANSACTIONS} WHERE t.date BETWEEN ?1 AND ?2 \
            ORDER BY t.date DESC, t.datetime DESC, t.id DESC"
        ))?
        .query_map((start_date, end_date), |row| {
            let transaction = map_transaction_row(row)?;

            Ok(TransactionView::new(
                transaction,
                row.get(TRANSACTION_COLUMN_COUNT)?,
                row.get(TRANSACTION_COLUMN_COUNT + 1)?,
            ))
        })?
        .map(|maybe_view| maybe_view.map_err(Error::from))
        .collect()
}

/// Get a single transaction with its account and institution names.
pub fn get_transaction_view(id: i64, connection: &Connection) -> Result<TransactionView, Error> {
    connection
        .query_row(
            &format!(
                "SELECT {TRANSACTION_COLUMNS}, COALESCE(a.custom_name, a.name), i.name \
                {FROM_TRANSACTIONS} WHERE t.id = ?1"
            ),
            [id],
            |row| {
                Ok(TransactionView::new(
                    map_transaction_row(row)?,
                    row.get(TRANSACTION_COLUMN_COUNT)?,
                    row.get(TRANSACTION_COLUMN_COUNT + 1)?,
                ))
            },
        )
        .map_err(Error::from)
}
