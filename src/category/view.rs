use serde::Serialize;

use crate::category::{CategorySpending, SpendingCategory};

/// How much of a monthly budget is left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetRemaining {
    pub amount: f64,
    /// The remaining amount as a percentage of the budget.
    pub percentage: f64,
    pub is_over: bool,
}

impl BudgetRemaining {
    pub fn new(budget: f64, spent: f64) -> Self {
        let amount = budget - spent;

        Self {
            amount,
            percentage: if budget != 0.0 {
                amount / budget * 100.0
            } else {
                0.0
            },
            is_over: amount < 0.0,
        }
    }
}

/// A spending category as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: SpendingCategory,
    pub current_month_spending: f64,
    /// Only present when the category has a budget.
    pub budget_remaining: Option<BudgetRemaining>,
}

impl CategoryView {
    pub fn new(category: SpendingCategory, spending: Option<CategorySpending>) -> Self {
        let current_month_spending = spending.map(|spending| spending.amount).unwrap_or(0.0);
        let budget_remaining = category
            .monthly_budget
            .filter(|budget| *budget > 0.0)
            .map(|budget| BudgetRemaining::new(budget, current_month_spending));

        Self {
            category,
            current_month_spending,
            budget_remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BudgetRemaining;

    #[test]
    fn under_budget() {
        let remaining = BudgetRemaining::new(200.0, 50.0);

        assert_eq!(remaining.amount, 150.0);
        assert_eq!(remaining.percentage, 75.0);
        assert!(!remaining.is_over);
    }

    #[test]
    fn over_budget() {
        let remaining = BudgetRemaining::new(100.0, 125.0);

        assert_eq!(remaining.amount, -25.0);
        assert_eq!(remaining.percentage, -25.0);
        assert!(remaining.is_over);
    }
}
