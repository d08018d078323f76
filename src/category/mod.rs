//! Spending categories, their budgets and the default category set.

mod core;
mod defaults;
mod endpoints;
mod view;

pub use core::{
    CategorizableTransaction, CategoryForm, CategoryId, CategoryNode, CategoryQuery,
    CategorySpending, DEFAULT_CATEGORY_COLOR, SpendingCategory, build_category_tree, categorize,
    create_spending_category, create_spending_category_table, delete_spending_category,
    get_categories_by_id, get_spending_categories, get_spending_category,
    get_spending_per_category, update_spending_category,
};
pub use defaults::seed_default_categories;
pub use endpoints::{
    category_tree_endpoint, create_category_endpoint, delete_category_endpoint,
    get_category_endpoint, list_categories_endpoint, update_category_endpoint,
};
pub use view::{BudgetRemaining, CategoryView};

#[cfg(test)]
pub use core::test_utils;
