//! Application router configuration for the REST API.

use axum::{
    Json, Router,
    routing::{get, patch, post},
};
use serde_json::json;

use crate::{
    AppState, Error,
    account::{
        create_manual_account_endpoint, delete_account_endpoint, get_account_endpoint,
        list_accounts_endpoint, toggle_selected_endpoint, update_custom_name_endpoint,
    },
    analytics::{dashboard_endpoint, monthly_spending_endpoint, net_worth_trend_endpoint},
    category::{
        category_tree_endpoint, create_category_endpoint, delete_category_endpoint,
        get_category_endpoint, list_categories_endpoint, update_category_endpoint,
    },
    endpoints,
    institution::{
        delete_institution_endpoint, get_institution_endpoint, list_institutions_endpoint,
        sync_holdings_endpoint, sync_transactions_endpoint, toggle_active_endpoint,
        update_balances_endpoint, update_link_token_endpoint, upgrade_for_investments_endpoint,
    },
    investment::{list_holdings_endpoint, list_investment_transactions_endpoint},
    link::{create_link_token_endpoint, exchange_public_token_endpoint},
    recurring::{
        create_recurring_endpoint, delete_recurring_endpoint, detect_recurring_endpoint,
        get_recurring_endpoint, list_recurring_endpoint, recurring_summary_endpoint,
        update_recurring_endpoint,
    },
    transaction::{
        create_manual_transaction_endpoint, get_transaction_endpoint, list_transactions_endpoint,
        update_category_endpoint as update_transaction_category_endpoint, update_exclude_endpoint,
        update_notes_endpoint,
    },
    webhook::plaid_webhook_endpoint,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let plaid_routes = Router::new()
        .route(endpoints::CREATE_LINK_TOKEN, post(create_link_token_endpoint))
        .route(
            endpoints::EXCHANGE_PUBLIC_TOKEN,
            post(exchange_public_token_endpoint),
        )
        .route(endpoints::PLAID_WEBHOOK, post(plaid_webhook_endpoint));

    let institution_routes = Router::new()
        .route(endpoints::INSTITUTIONS, get(list_institutions_endpoint))
        .route(
            endpoints::INSTITUTION,
            get(get_institution_endpoint).delete(delete_institution_endpoint),
        )
        .route(
            endpoints::INSTITUTION_TOGGLE_ACTIVE,
            post(toggle_active_endpoint),
        )
        .route(
            endpoints::INSTITUTION_SYNC_TRANSACTIONS,
            post(sync_transactions_endpoint),
        )
        .route(
            endpoints::INSTITUTION_SYNC_HOLDINGS,
            post(sync_holdings_endpoint),
        )
        .route(
            endpoints::INSTITUTION_UPDATE_BALANCES,
            post(update_balances_endpoint),
        )
        .route(
            endpoints::INSTITUTION_UPGRADE_FOR_INVESTMENTS,
            post(upgrade_for_investments_endpoint),
        )
        .route(
            endpoints::INSTITUTION_UPDATE_LINK_TOKEN,
            post(update_link_token_endpoint),
        );

    let account_routes = Router::new()
        .route(endpoints::ACCOUNTS, get(list_accounts_endpoint))
        .route(endpoints::MANUAL_ACCOUNT, post(create_manual_account_endpoint))
        .route(
            endpoints::ACCOUNT,
            get(get_account_endpoint).delete(delete_account_endpoint),
        )
        .route(
            endpoints::ACCOUNT_TOGGLE_SELECTED,
            post(toggle_selected_endpoint),
        )
        .route(
            endpoints::ACCOUNT_CUSTOM_NAME,
            patch(update_custom_name_endpoint),
        );

    let transaction_routes = Router::new()
        .route(endpoints::TRANSACTIONS, get(list_transactions_endpoint))
        .route(
            endpoints::MANUAL_TRANSACTION,
            post(create_manual_transaction_endpoint),
        )
        .route(endpoints::TRANSACTION, get(get_transaction_endpoint))
        .route(
            endpoints::TRANSACTION_CATEGORY,
            patch(update_transaction_category_endpoint),
        )
        .route(endpoints::TRANSACTION_NOTES, patch(update_notes_endpoint))
        .route(endpoints::TRANSACTION_EXCLUDE, patch(update_exclude_endpoint));

    let category_routes = Router::new()
        .route(
            endpoints::SPENDING_CATEGORIES,
            get(list_categories_endpoint).post(create_category_endpoint),
        )
        .route(endpoints::SPENDING_CATEGORY_TREE, get(category_tree_endpoint))
        .route(
            endpoints::SPENDING_CATEGORY,
            get(get_category_endpoint)
                .put(update_category_endpoint)
                .delete(delete_category_endpoint),
        );

    let recurring_routes = Router::new()
        .route(
            endpoints::RECURRING,
            get(list_recurring_endpoint).post(create_recurring_endpoint),
        )
        .route(endpoints::RECURRING_SUMMARY, get(recurring_summary_endpoint))
        .route(endpoints::RECURRING_DETECT, post(detect_recurring_endpoint))
        .route(
            endpoints::RECURRING_TRANSACTION,
            get(get_recurring_endpoint)
                .put(update_recurring_endpoint)
                .delete(delete_recurring_endpoint),
        );

    let report_routes = Router::new()
        .route(endpoints::HOLDINGS, get(list_holdings_endpoint))
        .route(
            endpoints::INVESTMENT_TRANSACTIONS,
            get(list_investment_transactions_endpoint),
        )
        .route(endpoints::DASHBOARD, get(dashboard_endpoint))
        .route(
            endpoints::MONTHLY_SPENDING_REPORT,
            get(monthly_spending_endpoint),
        )
        .route(endpoints::NET_WORTH_TREND, get(net_worth_trend_endpoint));

    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .merge(plaid_routes)
        .merge(institution_routes)
        .merge(account_routes)
        .merge(transaction_routes)
        .merge(category_routes)
        .merge(recurring_routes)
        .merge(report_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

/// Liveness check for load balancers and uptime monitors.
async fn get_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn get_404_not_found() -> Error {
    Error::NotFound
}
