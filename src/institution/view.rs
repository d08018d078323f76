use rusqlite::Connection;
use serde::Serialize;

use crate::{
    Error,
    account::{Account, AccountView, get_institution_accounts},
    currency::format_currency,
    institution::{Institution, get_all_institutions},
};

/// An institution with its accounts as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionView {
    #[serde(flatten)]
    pub institution: Institution,
    pub accounts: Vec<AccountView>,
    /// The number of active accounts.
    pub account_count: usize,
    /// Assets minus liabilities over active, selected accounts.
    pub total_balance: f64,
    pub total_balance_display: String,
}

impl InstitutionView {
    pub fn new(institution: Institution, accounts: Vec<Account>) -> Self {
        let account_count = accounts.iter().filter(|account| account.is_active).count();
        let total_balance = accounts
            .iter()
            .filter(|account| account.is_active && account.is_selected)
            .map(Account::net_worth_contribution)
            .sum::<f64>();

        Self {
            institution,
            accounts: accounts.into_iter().map(AccountView::from).collect(),
            account_count,
            total_balance,
            total_balance_display: format_currency(total_balance),
        }
    }
}

/// Get every institution with its accounts, optionally only the active ones.
pub fn get_institution_views(
    active_only: bool,
    connection: &Connection,
) -> Result<Vec<InstitutionView>, Error> {
    get_all_institutions(connection)?
        .into_iter()
        .filter(|institution| !active_only || institution.is_active)
        .map(|institution| {
            let accounts = get_institution_accounts(institution.id, connection)?;
            Ok(InstitutionView::new(institution, accounts))
        })
        .collect()
}
