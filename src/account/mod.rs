//! Bank, credit, loan and investment accounts.

mod core;
mod endpoints;
mod view;

pub use core::{
    Account, AccountId, AccountType, LinkOutcome, ManualAccountForm, SELECT_ACCOUNT,
    create_account_table, create_manual_account, delete_account, get_account, get_all_accounts,
    get_institution_accounts, get_plaid_account_ids, has_investment_accounts, link_plaid_account,
    map_row_to_account, set_account_custom_name, toggle_account_selected,
    update_account_balances,
};
pub use endpoints::{
    create_manual_account_endpoint, delete_account_endpoint, get_account_endpoint,
    list_accounts_endpoint, toggle_selected_endpoint, update_custom_name_endpoint,
};
pub use view::AccountView;
