//! Route handlers for the dashboard and reports.

use std::sync::{Arc, Mutex};

use axum::extract::{FromRef, State};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::{
    AppState, Error,
    analytics::{
        CashFlow, CategoryTotal, MonthlySpendingReport, NetWorth, NetWorthTrendPoint,
        calculate_net_worth, get_net_worth_trend, monthly_cash_flow, monthly_spending_report,
        spending_by_category,
    },
    db::lock_connection,
    extract::{Json, Query},
    institution::{InstitutionView, get_institution_views},
    timezone::{local_today, parse_iso_date},
    transaction::{TransactionView, get_transactions_in_range},
};

/// How many days of snapshots the dashboard shows.
const DASHBOARD_TREND_DAYS: i64 = 30;
const DEFAULT_TREND_DAYS: i64 = 365;
const MAX_TREND_DAYS: i64 = 36_500;

/// The state needed by the analytics endpoints.
#[derive(Debug, Clone)]
pub struct AnalyticsState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub local_timezone: String,
}

impl FromRef<AppState> for AnalyticsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub start_date: Date,
    pub end_date: Date,
    pub net_worth: NetWorth,
    pub institutions: Vec<InstitutionView>,
    pub transactions: Vec<TransactionView>,
    pub spending_by_category: Vec<CategoryTotal>,
    pub monthly_cash_flow: CashFlow,
    pub net_worth_trend: Vec<NetWorthTrendPoint>,
}

/// Dates that are missing or not valid "YYYY-MM-DD" strings fall back to the
/// first of the current month and today.
fn dashboard_range(query: &DashboardQuery, today: Date) -> (Date, Date) {
    let first_of_month = today.replace_day(1).unwrap_or(today);
    let start_date = parse_iso_date(query.start_date.as_deref()).unwrap_or(first_of_month);
    let end_date = parse_iso_date(query.end_date.as_deref()).unwrap_or(today);

    (start_date, end_date)
}

pub async fn dashboard_endpoint(
    State(state): State<AnalyticsState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, Error> {
    let today = local_today(&state.local_timezone)?;
    let (start_date, end_date) = dashboard_range(&query, today);

    let connection = lock_connection(&state.db_connection)?;

    Ok(Json(Dashboard {
        start_date,
        end_date,
        net_worth: calculate_net_worth(&connection)?,
        institutions: get_institution_views(true, &connection)?,
        transactions: get_transactions_in_range(start_date, end_date, &connection)?,
        spending_by_category: spending_by_category(start_date, end_date, &connection)?,
        monthly_cash_flow: monthly_cash_flow(end_date.year(), end_date.month(), &connection)?,
        net_worth_trend: get_net_worth_trend(end_date, DASHBOARD_TREND_DAYS, &connection)?,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u8>,
}

pub async fn monthly_spending_endpoint(
    State(state): State<AnalyticsState>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthlySpendingReport>, Error> {
    let today = local_today(&state.local_timezone)?;
    let year = query.year.unwrap_or(today.year());
    let month = match query.month {
        Some(month) => Month::try_from(month)
            .map_err(|_| Error::Validation(format!("{month} is not a valid month")))?,
        None => today.month(),
    };

    let connection = lock_connection(&state.db_connection)?;

    monthly_spending_report(year, month, &connection).map(Json)
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

pub async fn net_worth_trend_endpoint(
    State(state): State<AnalyticsState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<NetWorthTrendPoint>>, Error> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(0..=MAX_TREND_DAYS).contains(&days) {
        return Err(Error::Validation(format!(
            "days must be between 0 and {MAX_TREND_DAYS}, got {days}"
        )));
    }

    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    get_net_worth_trend(today, days, &connection).map(Json)
}
