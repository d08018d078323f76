//! Spending, cash flow and transaction count reports.

use rusqlite::Connection;
use serde::Serialize;
use time::{Date, Month};

use crate::{
    Error,
    account::AccountId,
    category::{CategoryId, CategoryQuery, get_spending_categories, get_spending_per_category},
    currency::format_currency,
    db::count_column,
    institution::InstitutionId,
    transaction::title_case,
};

/// The first and last day of a calendar month.
pub fn month_bounds(year: i32, month: Month) -> Result<(Date, Date), Error> {
    let invalid = |_| Error::Validation(format!("{year}-{} is not a valid month", month as u8));

    let first = Date::from_calendar_date(year, month, 1).map_err(invalid)?;
    let last = Date::from_calendar_date(year, month, month.length(year)).map_err(invalid)?;

    Ok((first, last))
}

/// Total spending for one Plaid primary category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    /// The Plaid primary category, or "Uncategorized".
    pub category: String,
    pub category_display: String,
    pub total: f64,
    pub total_display: String,
    pub count: u64,
}

/// Spending between two dates (inclusive) grouped by primary category,
/// largest first.
///
/// Only money out counts as spending and excluded transactions are ignored.
pub fn spending_by_category(
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<CategoryTotal>, Error> {
    connection
        .prepare(
            "SELECT COALESCE(primary_category, 'Uncategorized') AS category, \
            SUM(amount) AS total, COUNT(*) \
            FROM \"transaction\" \
            WHERE date BETWEEN ?1 AND ?2 AND amount > 0 AND exclude_from_reports = 0 \
            GROUP BY category ORDER BY total DESC, category ASC",
        )?
        .query_map((start_date, end_date), |row| {
            let category: String = row.get(0)?;
            let total: f64 = row.get(1)?;

            Ok(CategoryTotal {
                category_display: title_case(&category),
                category,
                total,
                total_display: format_currency(total),
                count: count_column(row, 2)?,
            })
        })?
        .map(|maybe_total| maybe_total.map_err(Error::from))
        .collect()
}

/// Income against expenses for one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlow {
    pub year: i32,
    pub month: u8,
    pub income: f64,
    pub expenses: f64,
    pub net_cash_flow: f64,
    /// Percent of income kept, zero when there was no income.
    pub savings_rate: f64,
}

/// Calculate the cash flow for a calendar month.
///
/// Income is money in (negative amounts) and expenses are money out.
pub fn monthly_cash_flow(
    year: i32,
    month: Month,
    connection: &Connection,
) -> Result<CashFlow, Error> {
    let (first, last) = month_bounds(year, month)?;

    let (income, expenses): (f64, f64) = connection.query_row(
        "SELECT \
            COALESCE(SUM(CASE WHEN amount < 0 THEN amount END), 0), \
            COALESCE(SUM(CASE WHEN amount > 0 THEN amount END), 0) \
        FROM \"transaction\" \
        WHERE date BETWEEN ?1 AND ?2 AND exclude_from_reports = 0",
        (first, last),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let income = income.abs();
    let net_cash_flow = income - expenses;
    let savings_rate = if income > 0.0 {
        net_cash_flow / income * 100.0
    } else {
        0.0
    };

    Ok(CashFlow {
        year,
        month: month as u8,
        income,
        expenses,
        net_cash_flow,
        savings_rate,
    })
}

/// Spending against budget for one spending category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySpendingItem {
    pub category_id: CategoryId,
    pub category_name: String,
    pub parent_id: Option<CategoryId>,
    pub amount_spent: f64,
    pub amount_spent_display: String,
    pub transaction_count: u64,
    pub monthly_budget: Option<f64>,
}

/// Spending per spending category for a calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySpendingReport {
    pub year: i32,
    pub month: u8,
    pub total_spent: f64,
    pub categories: Vec<MonthlySpendingItem>,
}

/// Build the spending report for a month.
///
/// Categories appear when they had spending or carry a budget, ordered by
/// amount spent.
pub fn monthly_spending_report(
    year: i32,
    month: Month,
    connection: &Connection,
) -> Result<MonthlySpendingReport, Error> {
    let (first, last) = month_bounds(year, month)?;
    let spending = get_spending_per_category(first, last, connection)?;
    let categories = get_spending_categories(&CategoryQuery::default(), connection)?;

    let mut items: Vec<MonthlySpendingItem> = categories
        .into_iter()
        .filter_map(|category| {
            let spent = spending.get(&category.id).copied().unwrap_or_default();

            if spent.transaction_count == 0 && category.monthly_budget.is_none() {
                return None;
            }

            Some(MonthlySpendingItem {
                category_id: category.id,
                category_name: category.name,
                parent_id: category.parent_id,
                amount_spent: spent.amount,
                amount_spent_display: format_currency(spent.amount),
                transaction_count: spent.transaction_count,
                monthly_budget: category.monthly_budget,
            })
        })
        .collect();

    items.sort_by(|a, b| {
        b.amount_spent
            .total_cmp(&a.amount_spent)
            .then_with(|| a.category_name.cmp(&b.category_name))
    });

    Ok(MonthlySpendingReport {
        year,
        month: month as u8,
        total_spent: items.iter().map(|item| item.amount_spent).sum(),
        categories: items,
    })
}

/// The number of transactions stored for an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountTransactionCount {
    pub account_id: AccountId,
    pub account_name: String,
    pub count: u64,
}

/// The number of transactions stored for an institution and each of its
/// accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionTransactionCount {
    pub institution_id: InstitutionId,
    pub institution_name: String,
    pub total: u64,
    pub accounts: Vec<AccountTransactionCount>,
}

/// Count the stored transactions per institution and account.
pub fn transaction_counts(
    connection: &Connection,
) -> Result<Vec<InstitutionTransactionCount>, Error> {
    let rows = connection
        .prepare(
            "SELECT i.id, i.name, a.id, COALESCE(a.custom_name, a.name), COUNT(t.id) \
            FROM institution i \
            INNER JOIN account a ON a.institution_id = i.id \
            LEFT JOIN \"transaction\" t ON t.account_id = a.id \
            GROUP BY a.id ORDER BY i.id, a.id",
        )?
        .query_map([], |row| {
            Ok((
                row.get::<_, InstitutionId>(0)?,
                row.get::<_, String>(1)?,
                AccountTransactionCount {
                    account_id: row.get(2)?,
                    account_name: row.get(3)?,
                    count: count_column(row, 4)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    let mut counts: Vec<InstitutionTransactionCount> = Vec::new();
    for (institution_id, institution_name, account) in rows {
        match counts.last_mut() {
            Some(last) if last.institution_id == institution_id => {
                last.total += account.count;
                last.accounts.push(account);
            }
            _ => counts.push(InstitutionTransactionCount {
                institution_id,
                institution_name,
                total: account.count,
                accounts: vec![account],
            }),
        }
    }

    Ok(counts)
}
