//! Bank transactions: storage, Plaid upserts, filtered listing and user edits.

mod core;
mod endpoints;
mod query;
mod view;

pub use core::{
    ManualTransactionBuilder, ManualTransactionForm, TRANSACTION_COLUMNS, Transaction,
    TransactionId, UpsertOutcome, count_institution_transactions, create_manual_transaction,
    create_transaction_table, delete_institution_transactions, delete_plaid_transactions,
    get_transaction, map_transaction_row, set_exclude_from_reports, set_notes,
    set_user_category, title_case, upsert_plaid_transaction,
};
pub use endpoints::{
    create_manual_transaction_endpoint, get_transaction_endpoint, list_transactions_endpoint,
    update_category_endpoint, update_exclude_endpoint, update_notes_endpoint,
};
pub use query::{
    TransactionFilter, TransactionQuery, get_transaction_view, get_transactions_in_range,
    query_transactions,
};
pub use view::TransactionView;

#[cfg(test)]
pub use core::test_utils;
