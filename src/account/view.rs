use serde::Serialize;

use crate::{account::Account, currency::format_currency};

/// An account as returned by the API, with display helpers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub display_name: String,
    pub type_display: &'static str,
    pub is_asset: bool,
    pub is_liability: bool,
    /// Liabilities are shown as negative amounts.
    pub balance_display: String,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        let signed_balance = if account.account_type.is_liability() {
            -account.current_balance
        } else {
            account.current_balance
        };

        Self {
            display_name: account.display_name().to_owned(),
            type_display: account.account_type.display_name(),
            is_asset: account.account_type.is_asset(),
            is_liability: account.account_type.is_liability(),
            balance_display: format_currency(signed_balance),
            account,
        }
    }
}
