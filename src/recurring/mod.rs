//! Recurring transactions: subscriptions, bills and income on a schedule,
//! entered by hand or detected from history.

mod core;
mod detection;
mod endpoints;
mod view;

pub use core::{
    DUE_SOON_DAYS, Frequency, RecurringForm, RecurringId, RecurringQuery, RecurringTransaction,
    create_recurring_transaction, create_recurring_transaction_table,
    delete_recurring_transaction, find_recurring_by_merchant, get_recurring_transaction,
    get_recurring_transactions, update_recurring_transaction,
};
pub use detection::{
    CandidateTransaction, DetectedPattern, DetectionOptions, DetectionResult, detect_patterns,
    detect_recurring_transactions, normalize_merchant,
};
pub use endpoints::{
    create_recurring_endpoint, delete_recurring_endpoint, detect_recurring_endpoint,
    get_recurring_endpoint, list_recurring_endpoint, recurring_summary_endpoint,
    update_recurring_endpoint,
};
pub use view::{RecurringSummary, RecurringView};
