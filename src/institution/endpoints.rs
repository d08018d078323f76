//! Route handlers for institutions.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState, Error,
    account::{get_institution_accounts, has_investment_accounts},
    config::Config,
    db::lock_connection,
    extract::{Json, Path},
    institution::{
        InstitutionId, InstitutionView, delete_institution, get_institution,
        get_institution_views, set_institution_active,
    },
    link::create_link_token,
    plaid::{LinkToken, PlaidApi},
    sync::{HoldingsSync, RefreshSummary, refresh_institution, sync_holdings, update_balances},
    timezone::local_today,
};

/// The state needed by the institution endpoints.
#[derive(Clone)]
pub struct InstitutionState {
    db_connection: Arc<Mutex<Connection>>,
    plaid: Arc<dyn PlaidApi>,
    config: Arc<Config>,
    local_timezone: String,
}

impl FromRef<AppState> for InstitutionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            plaid: state.plaid.clone(),
            config: state.config.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

fn get_institution_view(
    institution_id: InstitutionId,
    connection: &Connection,
) -> Result<InstitutionView, Error> {
    let institution = get_institution(institution_id, connection)?;
    let accounts = get_institution_accounts(institution_id, connection)?;

    Ok(InstitutionView::new(institution, accounts))
}

pub async fn list_institutions_endpoint(
    State(state): State<InstitutionState>,
) -> Result<Json<Vec<InstitutionView>>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_institution_views(false, &connection).map(Json)
}

pub async fn get_institution_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<InstitutionView>, Error> {
    let connection = lock_connection(&state.db_connection)?;

    get_institution_view(institution_id, &connection).map(Json)
}

/// Delete an institution, removing its item from Plaid first.
///
/// A failure to remove the item is logged and does not stop the delete.
pub async fn delete_institution_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<StatusCode, Error> {
    let institution = {
        let connection = lock_connection(&state.db_connection)?;
        get_institution(institution_id, &connection)?
    };

    if let Some(access_token) = &institution.access_token {
        if let Err(error) = state.plaid.remove_item(access_token).await {
            tracing::warn!(
                "Could not remove the Plaid item for {}, deleting it locally anyway: {error}",
                institution.name
            );
        }
    }

    let connection = lock_connection(&state.db_connection)?;
    delete_institution(institution_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Flip whether the institution and its accounts are active.
pub async fn toggle_active_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<InstitutionView>, Error> {
    let connection = lock_connection(&state.db_connection)?;
    let institution = get_institution(institution_id, &connection)?;

    set_institution_active(institution_id, !institution.is_active, &connection)?;

    get_institution_view(institution_id, &connection).map(Json)
}

pub async fn sync_transactions_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<RefreshSummary>, Error> {
    let today = local_today(&state.local_timezone)?;

    refresh_institution(
        state.plaid.as_ref(),
        &state.db_connection,
        institution_id,
        &state.config.sync,
        today,
    )
    .await
    .map(Json)
}

pub async fn sync_holdings_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<HoldingsSync>, Error> {
    sync_holdings(state.plaid.as_ref(), &state.db_connection, institution_id)
        .await
        .map(Json)
}

#[derive(Debug, Serialize)]
pub struct BalanceUpdate {
    pub updated_accounts: usize,
    pub institution: InstitutionView,
}

pub async fn update_balances_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<BalanceUpdate>, Error> {
    let updated_accounts =
        update_balances(state.plaid.as_ref(), &state.db_connection, institution_id).await?;

    let connection = lock_connection(&state.db_connection)?;
    let institution = get_institution_view(institution_id, &connection)?;

    Ok(Json(BalanceUpdate {
        updated_accounts,
        institution,
    }))
}

fn linked_access_token(
    institution_id: InstitutionId,
    require_investments: bool,
    connection: &Connection,
) -> Result<String, Error> {
    let institution = get_institution(institution_id, connection)?;
    let access_token = match (institution.is_manual, institution.access_token) {
        (false, Some(access_token)) => access_token,
        _ => return Err(Error::ManualInstitution),
    };

    if require_investments && !has_investment_accounts(institution_id, connection)? {
        return Err(Error::NoInvestmentAccounts);
    }

    Ok(access_token)
}

/// An update mode Link token that adds the investments product to the item.
pub async fn upgrade_for_investments_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<LinkToken>, Error> {
    let access_token = {
        let connection = lock_connection(&state.db_connection)?;
        linked_access_token(institution_id, true, &connection)?
    };

    create_link_token(state.plaid.as_ref(), &state.config, Some(access_token), true)
        .await
        .map(Json)
}

/// An update mode Link token for re-authenticating the item.
pub async fn update_link_token_endpoint(
    State(state): State<InstitutionState>,
    Path(institution_id): Path<InstitutionId>,
) -> Result<Json<LinkToken>, Error> {
    let access_token = {
        let connection = lock_connection(&state.db_connection)?;
        linked_access_token(institution_id, false, &connection)?
    };

    create_link_token(state.plaid.as_ref(), &state.config, Some(access_token), false)
        .await
        .map(Json)
}
