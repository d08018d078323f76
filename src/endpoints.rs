//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/accounts/{account_id}', use [format_endpoint].

/// The liveness check.
pub const HEALTH: &str = "/health";
/// The route to create a Plaid Link token for linking a new institution.
pub const CREATE_LINK_TOKEN: &str = "/api/plaid/create-link-token";
/// The route to exchange a Link public token and save the linked institution.
pub const EXCHANGE_PUBLIC_TOKEN: &str = "/api/plaid/exchange-public-token";
/// The route Plaid delivers webhooks to.
pub const PLAID_WEBHOOK: &str = "/api/plaid/webhook";
/// The route to list institutions.
pub const INSTITUTIONS: &str = "/api/institutions";
/// The route to access a single institution.
pub const INSTITUTION: &str = "/api/institutions/{institution_id}";
pub const INSTITUTION_TOGGLE_ACTIVE: &str = "/api/institutions/{institution_id}/toggle-active";
/// The route to pull new transactions for an institution from Plaid.
pub const INSTITUTION_SYNC_TRANSACTIONS: &str = "/api/institutions/{institution_id}/sync-transactions";
pub const INSTITUTION_SYNC_HOLDINGS: &str = "/api/institutions/{institution_id}/sync-holdings";
pub const INSTITUTION_UPDATE_BALANCES: &str = "/api/institutions/{institution_id}/update-balances";
/// The route to get a Link token that adds the investments product to an item.
pub const INSTITUTION_UPGRADE_FOR_INVESTMENTS: &str = "/api/institutions/{institution_id}/upgrade-for-investments";
/// The route to get an update mode Link token for re-authenticating an item.
pub const INSTITUTION_UPDATE_LINK_TOKEN: &str = "/api/institutions/{institution_id}/update-link-token";
/// The route to list accounts.
pub const ACCOUNTS: &str = "/api/accounts";
/// The route to create a hand-maintained account.
pub const MANUAL_ACCOUNT: &str = "/api/accounts/manual";
/// The route to access a single account.
pub const ACCOUNT: &str = "/api/accounts/{account_id}";
pub const ACCOUNT_TOGGLE_SELECTED: &str = "/api/accounts/{account_id}/toggle-selected";
pub const ACCOUNT_CUSTOM_NAME: &str = "/api/accounts/{account_id}/custom-name";
/// The route to list transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to create a manual transaction.
pub const MANUAL_TRANSACTION: &str = "/api/transactions/manual";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
pub const TRANSACTION_CATEGORY: &str = "/api/transactions/{transaction_id}/category";
pub const TRANSACTION_NOTES: &str = "/api/transactions/{transaction_id}/notes";
pub const TRANSACTION_EXCLUDE: &str = "/api/transactions/{transaction_id}/exclude";
/// The route to list and create spending categories.
pub const SPENDING_CATEGORIES: &str = "/api/spending-categories";
pub const SPENDING_CATEGORY_TREE: &str = "/api/spending-categories/tree";
/// The route to access a single spending category.
pub const SPENDING_CATEGORY: &str = "/api/spending-categories/{category_id}";
/// The route to list and create recurring transactions.
pub const RECURRING: &str = "/api/recurring";
pub const RECURRING_SUMMARY: &str = "/api/recurring/summary";
/// The route to detect recurring transactions from history.
pub const RECURRING_DETECT: &str = "/api/recurring/detect";
/// The route to access a single recurring transaction.
pub const RECURRING_TRANSACTION: &str = "/api/recurring/{recurring_id}";
/// The route to list investment holdings.
pub const HOLDINGS: &str = "/api/holdings";
pub const INVESTMENT_TRANSACTIONS: &str = "/api/investment-transactions";
/// The route for the dashboard summary.
pub const DASHBOARD: &str = "/api/dashboard";
pub const MONTHLY_SPENDING_REPORT: &str = "/api/reports/monthly-spending";
pub const NET_WORTH_TREND: &str = "/api/reports/net-worth-trend";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
