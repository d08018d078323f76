//! Route handlers for spending categories.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use time::Date;

use crate::{
    AppState, Error,
    category::{
        CategoryForm, CategoryId, CategoryNode, CategoryQuery, CategoryView,
        build_category_tree, create_spending_category, delete_spending_category,
        get_spending_categories, get_spending_category, get_spending_per_category,
        update_spending_category,
    },
    db::lock_connection,
    extract::{Json, Path, Query},
    timezone::local_today,
};

/// The state needed by the spending category endpoints.
#[derive(Debug, Clone)]
pub struct CategoryState {
    db_connection: Arc<Mutex<Connection>>,
    /// Used to work out which month is the current one.
    local_timezone: String,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

fn current_month(local_timezone: &str) -> Result<(Date, Date), Error> {
    let today = local_today(local_timezone)?;
    let start = today.replace_day(1).map_err(|error| {
        tracing::error!("could not get the first day of {today}: {error}");
        Error::Validation(error.to_string())
    })?;

    Ok((start, today))
}

fn to_views(
    categories: Vec<crate::category::SpendingCategory>,
    local_timezone: &str,
    connection: &Connection,
) -> Result<Vec<CategoryView>, Error> {
    let (start, end) = current_month(local_timezone)?;
    let spending = get_spending_per_category(start, end, connection)?;

    Ok(categories
        .into_iter()
        .map(|category| {
            let category_spending = spending.get(&category.id).copied();
            CategoryView::new(category, category_spending)
        })
        .collect())
}

pub async fn list_categories_endpoint(
    State(state): State<CategoryState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Vec<CategoryView>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let categories = get_spending_categories(&query, &connection)?;

    to_views(categories, &state.local_timezone, &connection).map(Json)
}

/// Root categories with their subcategories nested underneath.
pub async fn category_tree_endpoint(
    State(state): State<CategoryState>,
) -> Result<Json<Vec<CategoryNode>>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let categories = get_spending_categories(&CategoryQuery::default(), &connection)?;

    Ok(Json(build_category_tree(categories)))
}

pub async fn get_category_endpoint(
    State(state): State<CategoryState>,
    Path(category_id): Path<CategoryId>,
) -> Result<Json<CategoryView>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let category = get_spending_category(category_id, &connection)?;

    to_views(vec![category], &state.local_timezone, &connection)?
        .pop()
        .map(Json)
        .ok_or(Error::NotFound)
}

pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    Json(form): Json<CategoryForm>,
) -> Result<(StatusCode, Json<CategoryView>), Error> {
    let connection = lock_connection(&state.db_connection)?;
    let category = create_spending_category(&form, &connection)?;

    Ok((StatusCode::CREATED, Json(CategoryView::new(category, None))))
}

pub async fn update_category_endpoint(
    State(state): State<CategoryState>,
    Path(category_id): Path<CategoryId>,
    Json(form): Json<CategoryForm>,
) -> Result<Json<CategoryView>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let category = update_spending_category(category_id, &form, &connection)?;

    to_views(vec![category], &state.local_timezone, &connection)?
        .pop()
        .map(Json)
        .ok_or(Error::NotFound)
}

pub async fn delete_category_endpoint(
    State(state): State<CategoryState>,
    Path(category_id): Path<CategoryId>,
) -> Result<StatusCode, Error> {
    let connection = lock_connection(&state.db_connection)?;

    delete_spending_category(category_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{endpoints, test_utils::test_server};

    #[tokio::test]
    async fn creates_and_fetches_category() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({
                "name": "Groceries",
                "monthly_budget": 400.0,
                "plaid_categories": ["FOOD_AND_DRINK_GROCERIES"]
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        assert_eq!(created["color"], "#6B7280");
        let id = created["id"].as_i64().unwrap();

        let fetched: Value = server
            .get(&endpoints::format_endpoint(endpoints::SPENDING_CATEGORY, id))
            .await
            .json();
        assert_eq!(fetched["current_month_spending"], 0.0);
        assert_eq!(fetched["budget_remaining"]["amount"], 400.0);
        assert_eq!(fetched["budget_remaining"]["is_over"], false);
    }

    #[tokio::test]
    async fn duplicate_name_is_bad_request() {
        let (server, _) = test_server();
        server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({"name": "Travel"}))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({"name": "Travel"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("Travel"));
    }

    #[tokio::test]
    async fn tree_nests_children() {
        let (server, _) = test_server();
        let parent: Value = server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({"name": "Food"}))
            .await
            .json();
        server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({"name": "Coffee", "parent_id": parent["id"]}))
            .await
            .assert_status(StatusCode::CREATED);

        let tree: Value = server.get(endpoints::SPENDING_CATEGORY_TREE).await.json();
        let parents_only: Value = server
            .get(endpoints::SPENDING_CATEGORIES)
            .add_query_param("parent_only", "true")
            .await
            .json();

        assert_eq!(tree[0]["name"], "Food");
        assert_eq!(tree[0]["children"][0]["name"], "Coffee");
        assert_eq!(parents_only.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (server, _) = test_server();
        let created: Value = server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({"name": "Fun"}))
            .await
            .json();
        let path = endpoints::format_endpoint(
            endpoints::SPENDING_CATEGORY,
            created["id"].as_i64().unwrap(),
        );

        let updated: Value = server
            .put(&path)
            .json(&json!({"name": "Entertainment", "color": "#8b5cf6"}))
            .await
            .json();
        assert_eq!(updated["name"], "Entertainment");
        assert_eq!(updated["color"], "#8b5cf6");

        server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
        server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    }
}
