use serde::Serialize;

use crate::{currency::format_transaction_amount, transaction::Transaction};

/// A transaction as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub account_name: String,
    pub institution_name: String,
    /// "-$12.00" for money out, "+$12.00" for money in.
    pub amount_display: String,
    pub category_display: String,
}

impl TransactionView {
    pub fn new(transaction: Transaction, account_name: String, institution_name: String) -> Self {
        Self {
            amount_display: format_transaction_amount(transaction.amount),
            category_display: transaction.category_display(),
            transaction,
            account_name,
            institution_name,
        }
    }
}
