//! Net worth, spending and cash flow analytics.

mod endpoints;
mod net_worth;
mod reports;

pub use endpoints::{dashboard_endpoint, monthly_spending_endpoint, net_worth_trend_endpoint};
pub use net_worth::{
    NetWorth, NetWorthChange, NetWorthSnapshot, NetWorthTrendPoint, calculate_net_worth,
    create_net_worth_snapshot_table, get_net_worth_trend, record_net_worth_snapshot,
};
pub use reports::{
    AccountTransactionCount, CashFlow, CategoryTotal, InstitutionTransactionCount,
    MonthlySpendingItem, MonthlySpendingReport, month_bounds, monthly_cash_flow,
    monthly_spending_report, spending_by_category, transaction_counts,
};
