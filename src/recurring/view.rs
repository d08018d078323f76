use serde::Serialize;
use time::Date;

use crate::{currency::format_currency, recurring::RecurringTransaction};

/// A recurring transaction as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringView {
    #[serde(flatten)]
    pub recurring: RecurringTransaction,
    pub frequency_display: &'static str,
    pub amount_display: String,
    pub monthly_amount: f64,
    pub is_due_soon: bool,
}

impl RecurringView {
    pub fn new(recurring: RecurringTransaction, today: Date) -> Self {
        Self {
            frequency_display: recurring.frequency.display_name(),
            amount_display: format_currency(recurring.amount),
            monthly_amount: round_cents(recurring.monthly_amount()),
            is_due_soon: recurring.is_due_soon(today),
            recurring,
        }
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Monthly totals over the active recurring transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringSummary {
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub net_monthly: f64,
    pub total_active: usize,
    pub upcoming_count: usize,
    pub upcoming: Vec<RecurringView>,
}

impl RecurringSummary {
    /// Summarize `recurring`, ignoring inactive entries.
    pub fn new(recurring: Vec<RecurringTransaction>, today: Date) -> Self {
        let active: Vec<RecurringTransaction> = recurring
            .into_iter()
            .filter(|recurring| recurring.is_active)
            .collect();

        let (income, expenses): (Vec<&RecurringTransaction>, Vec<&RecurringTransaction>) =
            active.iter().partition(|recurring| recurring.is_income);
        let monthly_income: f64 = income.iter().map(|r| r.monthly_amount()).sum();
        let monthly_expenses: f64 = expenses.iter().map(|r| r.monthly_amount()).sum();

        let total_active = active.len();
        let upcoming: Vec<RecurringView> = active
            .into_iter()
            .filter(|recurring| recurring.is_due_soon(today))
            .map(|recurring| RecurringView::new(recurring, today))
            .collect();

        Self {
            monthly_income: round_cents(monthly_income),
            monthly_expenses: round_cents(monthly_expenses),
            net_monthly: round_cents(monthly_income - monthly_expenses),
            total_active,
            upcoming_count: upcoming.len(),
            upcoming,
        }
    }
}
