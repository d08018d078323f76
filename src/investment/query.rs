//! Listing holdings and investment transactions for the API.

use rusqlite::{Connection, ToSql, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    currency::format_currency,
    db::count_column,
    institution::InstitutionId,
    investment::core::{
        HOLDING_COLUMN_COUNT, HOLDING_COLUMNS, Holding, INVESTMENT_TRANSACTION_COLUMN_COUNT,
        INVESTMENT_TRANSACTION_COLUMNS, InvestmentTransaction, SECURITY_COLUMNS, Security,
        map_holding_row, map_investment_transaction_row, map_security_row,
    },
    pagination::{Page, PageRequest},
    timezone::parse_iso_date,
};

/// Format a share count with up to four decimal places and no trailing zeros.
pub fn format_quantity(quantity: f64) -> String {
    let formatted = format!("{quantity:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned()
}

fn format_signed_currency(amount: f64) -> String {
    if amount >= 0.0 {
        format!("+{}", format_currency(amount))
    } else {
        format_currency(amount)
    }
}

/// A holding with its security and display strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingView {
    #[serde(flatten)]
    pub holding: Holding,
    pub security: Security,
    pub account_name: String,
    pub quantity_display: String,
    pub value_display: String,
    pub unrealized_gain_loss: Option<f64>,
    pub unrealized_gain_loss_percent: Option<f64>,
    pub gain_loss_display: String,
    pub gain_loss_percent_display: String,
}

impl HoldingView {
    pub fn new(holding: Holding, security: Security, account_name: String) -> Self {
        let gain_loss = holding.unrealized_gain_loss();
        let gain_loss_percent = holding.unrealized_gain_loss_percent();

        Self {
            quantity_display: format_quantity(holding.quantity),
            value_display: format_currency(holding.institution_value),
            gain_loss_display: gain_loss
                .map(format_signed_currency)
                .unwrap_or_else(|| "N/A".to_owned()),
            gain_loss_percent_display: gain_loss_percent
                .map(|percent| {
                    let sign = if percent >= 0.0 { "+" } else { "" };
                    format!("{sign}{percent:.2}%")
                })
                .unwrap_or_else(|| "N/A".to_owned()),
            unrealized_gain_loss: gain_loss,
            unrealized_gain_loss_percent: gain_loss_percent,
            holding,
            security,
            account_name,
        }
    }
}

/// Totals across a set of holdings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_value_display: String,
    /// Sum of gains and losses for holdings with a cost basis.
    pub total_gain_loss: f64,
    pub total_gain_loss_display: String,
    pub holdings_count: usize,
}

impl PortfolioSummary {
    pub fn new(holdings: &[HoldingView]) -> Self {
        let total_value = holdings
            .iter()
            .map(|view| view.holding.institution_value)
            .sum::<f64>();
        let total_gain_loss = holdings
            .iter()
            .filter_map(|view| view.unrealized_gain_loss)
            .sum::<f64>();

        Self {
            total_value,
            total_value_display: format_currency(total_value),
            total_gain_loss,
            total_gain_loss_display: format_signed_currency(total_gain_loss),
            holdings_count: holdings.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingsResponse {
    pub holdings: Vec<HoldingView>,
    pub summary: PortfolioSummary,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct HoldingQuery {
    /// A local account ID or a Plaid account ID.
    pub account_id: Option<String>,
    pub institution_id: Option<InstitutionId>,
}

/// List holdings of active accounts, largest position first.
pub fn get_holdings(query: &HoldingQuery, connection: &Connection) -> Result<HoldingsResponse, Error> {
    let mut conditions = vec!["a.is_active = 1"];
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(account) = query.account_id.as_deref().filter(|text| !text.is_empty()) {
        conditions.push("(a.id = ? OR a.plaid_account_id = ?)");
        params.push(Box::new(account.parse::<i64>().ok()));
        params.push(Box::new(account.to_owned()));
    }
    if let Some(institution_id) = query.institution_id {
        conditions.push("a.institution_id = ?");
        params.push(Box::new(institution_id));
    }

    let sql = format!(
        "SELECT {HOLDING_COLUMNS}, {SECURITY_COLUMNS}, COALESCE(a.custom_name, a.name) \
        FROM holding h \
        INNER JOIN security s ON s.id = h.security_id \
        INNER JOIN account a ON a.id = h.account_id \
        WHERE {} ORDER BY h.institution_value DESC, h.id ASC",
        conditions.join(" AND ")
    );

    let holdings = connection
        .prepare(&sql)?
        .query_map(params_from_iter(params.iter()), |row| {
            let holding = map_holding_row(row)?;
            let security = map_security_row(row, HOLDING_COLUMN_COUNT)?;
            let account_name: String = row.get(HOLDING_COLUMN_COUNT + 15)?;
            Ok(HoldingView::new(holding, security, account_name))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    let summary = PortfolioSummary::new(&holdings);

    Ok(HoldingsResponse { holdings, summary })
}

/// An investment transaction with its security and display strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentTransactionView {
    #[serde(flatten)]
    pub transaction: InvestmentTransaction,
    pub security: Option<Security>,
    pub account_name: String,
    pub amount_display: String,
    pub quantity_display: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct InvestmentTransactionQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub account_id: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Get one page of investment transactions, newest first.
pub fn query_investment_transactions(
    query: &InvestmentTransactionQuery,
    page: PageRequest,
    connection: &Connection,
) -> Result<Page<InvestmentTransactionView>, Error> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(start_date) = parse_iso_date(query.start_date.as_deref()) {
        conditions.push("it.date >= ?");
        params.push(Box::new(start_date));
    }
    if let Some(end_date) = parse_iso_date(query.end_date.as_deref()) {
        conditions.push("it.date <= ?");
        params.push(Box::new(end_date));
    }
    if let Some(account) = query.account_id.as_deref().filter(|text| !text.is_empty()) {
        conditions.push("(a.id = ? OR a.plaid_account_id = ?)");
        params.push(Box::new(account.parse::<i64>().ok()));
        params.push(Box::new(account.to_owned()));
    }
    if let Some(transaction_type) = query
        .transaction_type
        .as_deref()
        .filter(|text| !text.is_empty())
    {
        conditions.push("it.transaction_type = ?");
        params.push(Box::new(transaction_type.to_owned()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let from = "FROM investment_transaction it \
        INNER JOIN account a ON a.id = it.account_id \
        LEFT JOIN security s ON s.id = it.security_id";

    let count: u64 = connection.query_row(
        &format!("SELECT COUNT(*) {from} {where_clause}"),
        params_from_iter(params.iter()),
        |row| count_column(row, 0),
    )?;

    params.push(Box::new(page.page_size as i64));
    params.push(Box::new(page.offset() as i64));

    let results = connection
        .prepare(&format!(
            "SELECT {INVESTMENT_TRANSACTION_COLUMNS}, {SECURITY_COLUMNS}, \
            COALESCE(a.custom_name, a.name) {from} {where_clause} \
            ORDER BY it.date DESC, it.id DESC LIMIT ? OFFSET ?"
        ))?
        .query_map(params_from_iter(params.iter()), |row| {
            let transaction = map_investment_transaction_row(row)?;
            let security_id: Option<i64> = row.get(INVESTMENT_TRANSACTION_COLUMN_COUNT)?;
            let security = match security_id {
                Some(_) => Some(map_security_row(row, INVESTMENT_TRANSACTION_COLUMN_COUNT)?),
                None => None,
            };
            let account_name: String = row.get(INVESTMENT_TRANSACTION_COLUMN_COUNT + 15)?;

            Ok(InvestmentTransactionView {
                amount_display: format_currency(transaction.amount),
                quantity_display: transaction
                    .quantity
                    .map(format_quantity)
                    .unwrap_or_default(),
                transaction,
                security,
                account_name,
            })
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    Ok(Page::new(results, count, page))
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        db::initialize,
        investment::{
            core::test_utils::*, upsert_holding, upsert_investment_transaction, upsert_security,
        },
        pagination::PageRequest,
        transaction::test_utils::create_institution_with_account,
    };

    use super::{
        HoldingQuery, InvestmentTransactionQuery, format_quantity, get_holdings,
        query_investment_transactions,
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn quantity_display_trims_zeros() {
        assert_eq!(format_quantity(10.0), "10");
        assert_eq!(format_quantity(1.25), "1.25");
        assert_eq!(format_quantity(0.123456), "0.1235");
    }

    #[test]
    fn holdings_are_ordered_by_value_with_summary() {
        let connection = get_test_connection();
        let (_, account_id) = create_institution_with_account("item-1", &connection);
        let acme = upsert_security(&plaid_security("sec-1", "ACME", 10.0), &connection).unwrap();
        let globex = upsert_security(&plaid_security("sec-2", "GLBX", 100.0), &connection).unwrap();
        upsert_holding(
            account_id,
            acme,
            &plaid_holding("acc", "sec-1", 5.0, 10.0, Some(40.0)),
            &connection,
        )
        .unwrap();
        upsert_holding(
            account_id,
            globex,
            &plaid_holding("acc", "sec-2", 2.0, 100.0, Some(250.0)),
            &connection,
        )
        .unwrap();

        let response = get_holdings(&HoldingQuery::default(), &connection).unwrap();

        assert_eq!(response.holdings[0].security.ticker_symbol.as_deref(), Some("GLBX"));
        assert_eq!(response.holdings[0].gain_loss_display, "-$50.00");
        assert_eq!(response.holdings[1].gain_loss_percent_display, "+25.00%");
        assert_eq!(response.summary.total_value, 250.0);
        assert_eq!(response.summary.total_gain_loss, -40.0);
        assert_eq!(response.summary.holdings_count, 2);
    }

    #[test]
    fn filters_investment_transactions_by_type() {
        let connection = get_test_connection();
        let (_, account_id) = create_institution_with_account("item-1", &connection);
        let acme = upsert_security(&plaid_security("sec-1", "ACME", 10.0), &connection).unwrap();
        upsert_investment_transaction(
            account_id,
            Some(acme),
            &plaid_investment_transaction("inv-1", "acc", Some("sec-1"), "buy", 10.0, date!(2024 - 01 - 02)),
            &connection,
        )
        .unwrap();
        upsert_investment_transaction(
            account_id,
            None,
            &plaid_investment_transaction("inv-2", "acc", None, "fee", 1.0, date!(2024 - 01 - 03)),
            &connection,
        )
        .unwrap();
        let page = PageRequest {
            page: 1,
            page_size: 10,
        };

        let all =
            query_investment_transactions(&InvestmentTransactionQuery::default(), page, &connection)
                .unwrap();
        let buys = query_investment_transactions(
            &InvestmentTransactionQuery {
                transaction_type: Some("buy".to_owned()),
                ..Default::default()
            },
            page,
            &connection,
        )
        .unwrap();

        assert_eq!(all.count, 2);
        assert_eq!(all.results[0].transaction.plaid_investment_transaction_id, "inv-2");
        assert!(all.results[0].security.is_none());
        assert_eq!(buys.count, 1);
        assert_eq!(
            buys.results[0].security.as_ref().map(|security| security.name.as_str()),
            Some("ACME Inc.")
        );
    }
}
