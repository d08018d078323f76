//! Route handlers for Plaid Link.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    AppState, Error,
    config::Config,
    extract::Json,
    institution::Institution,
    link::{ExchangeRequest, create_link_token, link_institution},
    plaid::{LinkToken, PlaidApi},
    timezone::local_today,
};

#[derive(Clone)]
pub struct LinkState {
    db_connection: Arc<Mutex<Connection>>,
    plaid: Arc<dyn PlaidApi>,
    config: Arc<Config>,
    local_timezone: String,
}

impl FromRef<AppState> for LinkState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            plaid: state.plaid.clone(),
            config: state.config.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkTokenRequest {
    #[serde(default)]
    pub include_investments: bool,
}

pub async fn create_link_token_endpoint(
    State(state): State<LinkState>,
    body: Option<Json<LinkTokenRequest>>,
) -> Result<(StatusCode, Json<LinkToken>), Error> {
    let Json(request) = body.unwrap_or_default();

    let link_token = create_link_token(
        state.plaid.as_ref(),
        &state.config,
        None,
        request.include_investments,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(link_token)))
}

pub async fn exchange_public_token_endpoint(
    State(state): State<LinkState>,
    Json(request): Json<ExchangeRequest>,
) -> Result<(StatusCode, Json<Institution>), Error> {
    let today = local_today(&state.local_timezone)?;

    let institution = link_institution(
        state.plaid.as_ref(),
        &state.db_connection,
        &state.config,
        &request,
        today,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(institution)))
}
