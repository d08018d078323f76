//! Spending categories: user defined buckets with optional budgets that
//! group transactions by their Plaid categories.

use std::collections::HashMap;

use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    database_id::DatabaseId,
    db::{json_column, to_json_text},
};

pub type CategoryId = DatabaseId;

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingCategory {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub icon: Option<String>,
    pub color: String,
    pub monthly_budget: Option<f64>,
    /// Plaid primary or detailed categories that belong to this category.
    pub plaid_categories: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";

/// The request body for creating or replacing a spending category.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryForm {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub monthly_budget: Option<f64>,
    #[serde(default)]
    pub plaid_categories: Vec<String>,
}

/// Filters for [get_spending_categories].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub parent_only: Option<bool>,
    #[serde(default)]
    pub children_only: Option<bool>,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

/// A category and its subcategories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: SpendingCategory,
    pub children: Vec<CategoryNode>,
}

/// The parts of a transaction used to assign it to a spending category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizableTransaction {
    pub user_category: Option<String>,
    pub primary_category: Option<String>,
    pub detailed_category: Option<String>,
    pub amount: f64,
}

/// Money spent in one spending category over some period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategorySpending {
    pub amount: f64,
    pub transaction_count: u64,
}

/// Pick the spending category for a transaction.
///
/// A user category matching a category name wins. Otherwise the first
/// category (in `categories` order) mapping the transaction's primary or
/// detailed Plaid category is used.
pub fn categorize(
    transaction: &CategorizableTransaction,
    categories: &[SpendingCategory],
) -> Option<CategoryId> {
    if let Some(user_category) = &transaction.user_category {
        if let Some(category) = categories
            .iter()
            .find(|category| category.name.eq_ignore_ascii_case(user_category))
        {
            return Some(category.id);
        }
    }

    let plaid_categories = [&transaction.primary_category, &transaction.detailed_category];

    categories
        .iter()
        .find(|category| {
            plaid_categories.iter().any(|plaid_category| {
                plaid_category.as_ref().is_some_and(|plaid_category| {
                    category
                        .plaid_categories
                        .iter()
                        .any(|mapped| mapped.eq_ignore_ascii_case(plaid_category))
                })
            })
        })
        .map(|category| category.id)
}

/// Arrange categories into trees, roots and children ordered by name.
pub fn build_category_tree(categories: Vec<SpendingCategory>) -> Vec<CategoryNode> {
    let mut by_parent: HashMap<Option<CategoryId>, Vec<SpendingCategory>> = HashMap::new();
    for category in categories {
        by_parent.entry(category.parent_id).or_default().push(category);
    }

    fn build(
        parent_id: Option<CategoryId>,
        by_parent: &mut HashMap<Option<CategoryId>, Vec<SpendingCategory>>,
    ) -> Vec<CategoryNode> {
        let mut children = by_parent.remove(&parent_id).unwrap_or_default();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        children
            .into_iter()
            .map(|category| {
                let children = build(Some(category.id), by_parent);
                CategoryNode { category, children }
            })
            .collect()
    }

    build(None, &mut by_parent)
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_spending_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS spending_category (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            parent_id INTEGER,
            icon TEXT,
            color TEXT NOT NULL DEFAULT '#6B7280',
            monthly_budget REAL,
            plaid_categories TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(parent_id) REFERENCES spending_category(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_spending_category_parent ON spending_category(parent_id);",
    )?;

    Ok(())
}

const SELECT_CATEGORY: &str = "SELECT id, name, parent_id, icon, color, monthly_budget, \
    plaid_categories, created_at, updated_at FROM spending_category";

fn map_row(row: &Row) -> Result<SpendingCategory, rusqlite::Error> {
    Ok(SpendingCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        icon: row.get(3)?,
        color: row.get(4)?,
        monthly_budget: row.get(5)?,
        plaid_categories: json_column(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn validate(form: &CategoryForm, id: Option<CategoryId>) -> Result<String, Error> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Category name cannot be empty".to_owned()));
    }
    if id.is_some() && form.parent_id == id {
        return Err(Error::Validation(
            "A category cannot be its own parent".to_owned(),
        ));
    }
    if form.monthly_budget.is_some_and(|budget| budget < 0.0) {
        return Err(Error::Validation(
            "monthly_budget cannot be negative".to_owned(),
        ));
    }

    Ok(name.to_owned())
}

fn map_write_error(error: rusqlite::Error, name: &str) -> Error {
    match Error::from(error) {
        Error::DuplicateCategoryName(_) => Error::DuplicateCategoryName(name.to_owned()),
        Error::NotFound => Error::Validation("The parent category does not exist".to_owned()),
        error => error,
    }
}

/// Create a spending category and return it with its generated ID.
///
/// # Errors
/// Returns [Error::DuplicateCategoryName] if the name is taken and
/// [Error::Validation] for a blank name or a missing parent.
pub fn create_spending_category(
    form: &CategoryForm,
    connection: &Connection,
) -> Result<SpendingCategory, Error> {
    let name = validate(form, None)?;
    let now = OffsetDateTime::now_utc();

    connection
        .execute(
            "INSERT INTO spending_category (name, parent_id, icon, color, monthly_budget, \
                plaid_categories, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                name,
                form.parent_id,
                form.icon,
                form.color.as_deref().unwrap_or(DEFAULT_CATEGORY_COLOR),
                form.monthly_budget,
                to_json_text(&form.plaid_categories)?,
                now,
            ],
        )
        .map_err(|error| map_write_error(error, &name))?;

    get_spending_category(connection.last_insert_rowid(), connection)
}

pub fn get_spending_category(
    id: CategoryId,
    connection: &Connection,
) -> Result<SpendingCategory, Error> {
    connection
        .query_row(&format!("{SELECT_CATEGORY} WHERE id = ?1"), [id], map_row)
        .map_err(Error::from)
}

/// Retrieve categories ordered by name, optionally only roots, only
/// subcategories or only the children of one parent.
pub fn get_spending_categories(
    query: &CategoryQuery,
    connection: &Connection,
) -> Result<Vec<SpendingCategory>, Error> {
    let (condition, parent_id) = if let Some(parent_id) = query.parent_id {
        ("WHERE parent_id = ?1", Some(parent_id))
    } else if query.parent_only == Some(true) {
        ("WHERE parent_id IS NULL AND ?1 IS NULL", None)
    } else if query.children_only == Some(true) {
        ("WHERE parent_id IS NOT NULL AND ?1 IS NULL", None)
    } else {
        ("WHERE ?1 IS NULL", None)
    };

    connection
        .prepare(&format!("{SELECT_CATEGORY} {condition} ORDER BY name ASC"))?
        .query_map([parent_id], map_row)?
        .map(|maybe_category| maybe_category.map_err(Error::from))
        .collect()
}

/// Categories in ID order, the order [categorize] gives precedence by.
pub fn get_categories_by_id(connection: &Connection) -> Result<Vec<SpendingCategory>, Error> {
    connection
        .prepare(&format!("{SELECT_CATEGORY} ORDER BY id ASC"))?
        .query_map([], map_row)?
        .map(|maybe_category| maybe_category.map_err(Error::from))
        .collect()
}

/// Replace a category's fields.
pub fn update_spending_category(
    id: CategoryId,
    form: &CategoryForm,
    connection: &Connection,
) -> Result<SpendingCategory, Error> {
    let name = validate(form, Some(id))?;

    let rows_affected = connection
        .execute(
            "UPDATE spending_category SET name = ?1, parent_id = ?2, icon = ?3, color = ?4, \
            monthly_budget = ?5, plaid_categories = ?6, updated_at = ?7 WHERE id = ?8",
            params![
                name,
                form.parent_id,
                form.icon,
                form.color.as_deref().unwrap_or(DEFAULT_CATEGORY_COLOR),
                form.monthly_budget,
                to_json_text(&form.plaid_categories)?,
                OffsetDateTime::now_utc(),
                id,
            ],
        )
        .map_err(|error| map_write_error(error, &name))?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_spending_category(id, connection)
}

/// Delete a category and its subcategories.
pub fn delete_spending_category(id: CategoryId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM spending_category WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Total spending per category between two dates (inclusive).
///
/// Only money out (positive amounts) counts, and transactions excluded from
/// reports are skipped. Transactions that match no category are left out.
pub fn get_spending_per_category(
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<HashMap<CategoryId, CategorySpending>, Error> {
    let categories = get_categories_by_id(connection)?;

    let transactions = connection
        .prepare(
            "SELECT user_category, primary_category, detailed_category, amount \
            FROM \"transaction\" \
            WHERE date BETWEEN ?1 AND ?2 AND amount > 0 AND exclude_from_reports = 0",
        )?
        .query_map((start_date, end_date), |row| {
            Ok(CategorizableTransaction {
                user_category: row.get(0)?,
                primary_category: row.get(1)?,
                detailed_category: row.get(2)?,
                amount: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    let mut spending: HashMap<CategoryId, CategorySpending> = HashMap::new();
    for transaction in &transactions {
        if let Some(category_id) = categorize(transaction, &categories) {
            let entry = spending.entry(category_id).or_default();
            entry.amount += transaction.amount;
            entry.transaction_count += 1;
        }
    }

    Ok(spending)
}

// ============================================================================
// TESTS
// ============================================================================
