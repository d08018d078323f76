//! Route handlers for transactions.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    db::lock_connection,
    extract::{Json, Path, Query},
    pagination::{Page, PageQuery, PageRequest, PaginationConfig},
    timezone::local_today,
    transaction::{
        ManualTransactionForm, TransactionFilter, TransactionId, TransactionQuery,
        TransactionView, create_manual_transaction, get_transaction_view, query_transactions,
        set_exclude_from_reports, set_notes, set_user_category,
    },
};

/// The state needed by the transaction endpoints.
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
    pub local_timezone: String,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// List transactions, newest first, filtered by the query string.
pub async fn list_transactions_endpoint(
    State(state): State<TransactionState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Page<TransactionView>>, Error> {
    let filter = TransactionFilter::from(&query);
    let page_request = PageRequest::new(
        &PageQuery {
            page: query.page,
            page_size: query.page_size,
        },
        &state.pagination_config,
    );

    let connection = lock_connection(&state.db_connection)?;

    query_transactions(&filter, page_request, &connection).map(Json)
}

pub async fn get_transaction_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<TransactionId>,
) -> Result<Json<TransactionView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_transaction_view(transaction_id, &connection).map(Json)
}

pub async fn create_manual_transaction_endpoint(
    State(state): State<TransactionState>,
    Json(form): Json<ManualTransactionForm>,
) -> Result<(StatusCode, Json<TransactionView>), Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    let transaction = create_manual_transaction(form.into_builder(today), &connection)?;
    let view = get_transaction_view(transaction.id, &connection)?;

    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub category: Option<String>,
}

pub async fn update_category_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<TransactionId>,
    Json(form): Json<CategoryForm>,
) -> Result<Json<TransactionView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    set_user_category(transaction_id, form.category.as_deref(), &connection)?;

    get_transaction_view(transaction_id, &connection).map(Json)
}

#[derive(Debug, Deserialize)]
pub struct NotesForm {
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn update_notes_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<TransactionId>,
    Json(form): Json<NotesForm>,
) -> Result<Json<TransactionView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    set_notes(transaction_id, form.notes.as_deref(), &connection)?;

    get_transaction_view(transaction_id, &connection).map(Json)
}

#[derive(Debug, Default, Deserialize)]
pub struct ExcludeForm {
    /// Omit to flip the current value.
    #[serde(default)]
    pub exclude: Option<bool>,
}

pub async fn update_exclude_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<TransactionId>,
    body: Option<Json<ExcludeForm>>,
) -> Result<Json<TransactionView>, Error> {
    let exclude = body.and_then(|Json(form)| form.exclude);
    let connection = lock_connection(&state.db_connection)?;

    set_exclude_from_reports(transaction_id, exclude, &connection)?;

    get_transaction_view(transaction_id, &connection).map(Json)
}
