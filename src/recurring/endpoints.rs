//! Route handlers for recurring transactions.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    db::lock_connection,
    extract::{Json, Path, Query},
    recurring::{
        DetectionOptions, DetectionResult, RecurringForm, RecurringId, RecurringQuery,
        RecurringSummary, RecurringView, create_recurring_transaction,
        delete_recurring_transaction, detect_recurring_transactions, get_recurring_transaction,
        get_recurring_transactions, update_recurring_transaction,
    },
    timezone::local_today,
};

/// The state needed by the recurring transaction endpoints.
#[derive(Debug, Clone)]
pub struct RecurringState {
    db_connection: Arc<Mutex<Connection>>,
    /// Decides which entries are due soon.
    local_timezone: String,
}

impl FromRef<AppState> for RecurringState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

pub async fn list_recurring_endpoint(
    State(state): State<RecurringState>,
    Query(query): Query<RecurringQuery>,
) -> Result<Json<Vec<RecurringView>>, Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    let views = get_recurring_transactions(&query, &connection)?
        .into_iter()
        .map(|recurring| RecurringView::new(recurring, today))
        .collect();

    Ok(Json(views))
}

pub async fn get_recurring_endpoint(
    State(state): State<RecurringState>,
    Path(recurring_id): Path<RecurringId>,
) -> Result<Json<RecurringView>, Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    let recurring = get_recurring_transaction(recurring_id, &connection)?;

    Ok(Json(RecurringView::new(recurring, today)))
}

pub async fn create_recurring_endpoint(
    State(state): State<RecurringState>,
    Json(form): Json<RecurringForm>,
) -> Result<(StatusCode, Json<RecurringView>), Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    let recurring = create_recurring_transaction(&form, &connection)?;

    Ok((StatusCode::CREATED, Json(RecurringView::new(recurring, today))))
}

pub async fn update_recurring_endpoint(
    State(state): State<RecurringState>,
    Path(recurring_id): Path<RecurringId>,
    Json(form): Json<RecurringForm>,
) -> Result<Json<RecurringView>, Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    let recurring = update_recurring_transaction(recurring_id, &form, &connection)?;

    Ok(Json(RecurringView::new(recurring, today)))
}

pub async fn delete_recurring_endpoint(
    State(state): State<RecurringState>,
    Path(recurring_id): Path<RecurringId>,
) -> Result<StatusCode, Error> {
    let connection = lock_connection(&state.db_connection)?;

    delete_recurring_transaction(recurring_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn recurring_summary_endpoint(
    State(state): State<RecurringState>,
) -> Result<Json<RecurringSummary>, Error> {
    let today = local_today(&state.local_timezone)?;
    let connection = lock_connection(&state.db_connection)?;

    let recurring = get_recurring_transactions(
        &RecurringQuery {
            is_active: Some(true),
            ..Default::default()
        },
        &connection,
    )?;

    Ok(Json(RecurringSummary::new(recurring, today)))
}

/// Detect recurring patterns, the body is optional.
pub async fn detect_recurring_endpoint(
    State(state): State<RecurringState>,
    body: Option<Json<DetectionOptions>>,
) -> Result<Json<DetectionResult>, Error> {
    let Json(options) = body.unwrap_or_default();
    if options.min_occurrences < 2 {
        return Err(Error::Validation(
            "min_occurrences must be at least 2".to_owned(),
        ));
    }

    let connection = lock_connection(&state.db_connection)?;

    detect_recurring_transactions(&options, &connection).map(Json)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use time::{Duration, macros::date};

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::test_server,
        timezone::local_today,
        transaction::{
            Transaction, create_manual_transaction, test_utils::create_institution_with_account,
        },
    };

    #[tokio::test]
    async fn create_get_update_delete() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::RECURRING)
            .json(&json!({
                "name": "Netflix",
                "merchant_name": "Netflix",
                "amount": 15.49,
                "frequency": "monthly",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        assert_eq!(created["frequency_display"], "Monthly");
        assert_eq!(created["is_active"], true);
        let recurring_id = created["id"].as_i64().unwrap();
        let path = format_endpoint(endpoints::RECURRING_TRANSACTION, recurring_id);

        let updated: Value = server
            .put(&path)
            .json(&json!({
                "name": "Netflix",
                "amount": 120.0,
                "frequency": "yearly",
                "next_date": "2030-01-01",
            }))
            .await
            .json();
        assert_eq!(updated["monthly_amount"], 10.0);
        assert_eq!(updated["next_date"], "2030-01-01");

        server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
        server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_unknown_frequency() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::RECURRING)
            .json(&json!({"name": "Rent", "amount": 1.0, "frequency": "daily"}))
            .await;

        assert!(response.status_code().is_client_error());
    }

    #[tokio::test]
    async fn list_filters_by_income() {
        let (server, _) = test_server();
        for (name, is_income) in [("Pay", true), ("Rent", false)] {
            server
                .post(endpoints::RECURRING)
                .json(&json!({
                    "name": name,
                    "amount": 100.0,
                    "frequency": "monthly",
                    "is_income": is_income,
                }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let body: Value = server
            .get(endpoints::RECURRING)
            .add_query_param("is_income", true)
            .await
            .json();

        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["name"], "Pay");
    }

    #[tokio::test]
    async fn summary_lists_upcoming() {
        let (server, state) = test_server();
        let today = local_today(&state.local_timezone).unwrap();
        server
            .post(endpoints::RECURRING)
            .json(&json!({
                "name": "Rent",
                "amount": 1500.0,
                "frequency": "monthly",
                "next_date": (today + Duration::days(2)).to_string(),
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let body: Value = server.get(endpoints::RECURRING_SUMMARY).await.json();

        assert_eq!(body["monthly_expenses"], 1500.0);
        assert_eq!(body["net_monthly"], -1500.0);
        assert_eq!(body["total_active"], 1);
        assert_eq!(body["upcoming_count"], 1);
        assert_eq!(body["upcoming"][0]["is_due_soon"], true);
    }

    #[tokio::test]
    async fn detect_without_body_uses_defaults() {
        let (server, state) = test_server();
        {
            let connection = state.db_connection.lock().unwrap();
            let (_, account_id) = create_institution_with_account("item-1", &connection);
            let start = date!(2024 - 01 - 10);
            for i in 0..3 {
                create_manual_transaction(
                    Transaction::build(account_id, 9.99, start + Duration::days(7 * i))
                        .merchant_name(Some("Coffee Club".to_owned())),
                    &connection,
                )
                .unwrap();
            }
        }

        let body: Value = server.post(endpoints::RECURRING_DETECT).await.json();

        assert_eq!(body["patterns_detected"], 1);
        assert_eq!(body["created_count"], 1);
        assert_eq!(body["patterns"][0]["frequency"], "weekly");

        server
            .post(endpoints::RECURRING_DETECT)
            .json(&json!({"min_occurrences": 1}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
