//! Investment accounts: securities, holdings and investment transactions.

mod core;
mod endpoints;
mod query;

pub use core::{
    Holding, HoldingId, InvestmentTransaction, Security, SecurityId, create_holding_table,
    create_investment_transaction_table, create_security_table, delete_stale_holdings,
    get_security_id, upsert_holding, upsert_investment_transaction, upsert_security,
};
pub use endpoints::{list_holdings_endpoint, list_investment_transactions_endpoint};
pub use query::{
    HoldingQuery, HoldingView, HoldingsResponse, InvestmentTransactionQuery,
    InvestmentTransactionView, PortfolioSummary, get_holdings, query_investment_transactions,
};

#[cfg(test)]
pub use core::test_utils;
