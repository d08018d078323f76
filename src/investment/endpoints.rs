//! Route handlers for holdings and investment transactions.

use std::sync::{Arc, Mutex};

use axum::extract::{FromRef, State};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    db::lock_connection,
    extract::{Json, Query},
    investment::{
        HoldingQuery, HoldingsResponse, InvestmentTransactionQuery, InvestmentTransactionView,
        get_holdings, query_investment_transactions,
    },
    pagination::{Page, PageQuery, PageRequest, PaginationConfig},
};

#[derive(Debug, Clone)]
pub struct InvestmentState {
    db_connection: Arc<Mutex<Connection>>,
    pagination_config: PaginationConfig,
}

impl FromRef<AppState> for InvestmentState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

pub async fn list_holdings_endpoint(
    State(state): State<InvestmentState>,
    Query(query): Query<HoldingQuery>,
) -> Result<Json<HoldingsResponse>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_holdings(&query, &connection).map(Json)
}

pub async fn list_investment_transactions_endpoint(
    State(state): State<InvestmentState>,
    Query(query): Query<InvestmentTransactionQuery>,
) -> Result<Json<Page<InvestmentTransactionView>>, Error> {
    let page = PageRequest::new(
        &PageQuery {
            page: query.page,
            page_size: query.page_size,
        },
        &state.pagination_config,
    );
    let connection = lock_connection(&state.db_connection)?;

    query_investment_transactions(&query, page, &connection).map(Json)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::{endpoints, test_utils::test_server};

    #[tokio::test]
    async fn empty_portfolio() {
        let (server, _) = test_server();

        let holdings: Value = server.get(endpoints::HOLDINGS).await.json();
        let transactions: Value = server.get(endpoints::INVESTMENT_TRANSACTIONS).await.json();

        assert_eq!(holdings["summary"]["total_value_display"], "$0.00");
        assert_eq!(holdings["holdings"].as_array().map(Vec::len), Some(0));
        assert_eq!(transactions["count"], 0);
    }
}
