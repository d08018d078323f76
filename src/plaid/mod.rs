//! The Plaid API: a trait describing the calls the app makes and an HTTPS
//! client implementing it.

mod client;
mod error;
mod models;
#[cfg(test)]
pub mod test_client;

pub use client::PlaidClient;
pub use error::{PlaidApiError, PlaidError};
pub use models::{
    HoldingsResponse, InvestmentTransactionsPage, LinkToken, LinkTokenOptions, PlaidAccount,
    PersonalFinanceCategory, PlaidBalances, PlaidHolding, PlaidInstitution, PlaidInvestmentTransaction, PlaidSecurity,
    PlaidTransaction, RemovedTransaction, TokenExchange, TransactionsPage, TransactionsSyncPage,
};

use time::Date;

/// The Plaid operations the app depends on.
///
/// Handlers hold this as `Arc<dyn PlaidApi>` so tests can swap in a scripted
/// implementation.
#[async_trait::async_trait]
pub trait PlaidApi: Send + Sync {
    async fn create_link_token(&self, options: LinkTokenOptions) -> Result<LinkToken, PlaidError>;

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange, PlaidError>;

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<PlaidAccount>, PlaidError>;

    async fn get_institution(&self, institution_id: &str) -> Result<PlaidInstitution, PlaidError>;

    /// Fetch the next page of changes after `cursor`, or from the beginning
    /// of the item's history when `cursor` is `None`.
    async fn sync_transactions(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncPage, PlaidError>;

    async fn get_transactions(
        &self,
        access_token: &str,
        start_date: Date,
        end_date: Date,
        offset: u32,
        count: u32,
    ) -> Result<TransactionsPage, PlaidError>;

    async fn get_investment_holdings(
        &self,
        access_token: &str,
    ) -> Result<HoldingsResponse, PlaidError>;

    async fn get_investment_transactions(
        &self,
        access_token: &str,
        start_date: Date,
        end_date: Date,
        offset: u32,
    ) -> Result<InvestmentTransactionsPage, PlaidError>;

    /// Invalidate the access token and delete the item on Plaid's side.
    async fn remove_item(&self, access_token: &str) -> Result<(), PlaidError>;
}
