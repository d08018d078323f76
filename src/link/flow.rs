//! Linking a new Plaid item: link tokens and the public token exchange.

use std::sync::Mutex;

use rusqlite::Connection;
use serde::Deserialize;
use time::{Date, Duration};

use crate::{
    Error,
    account::{has_investment_accounts, link_plaid_account},
    config::Config,
    db::lock_connection,
    institution::{Institution, LinkedItem, get_institution, upsert_linked_institution},
    plaid::{LinkToken, LinkTokenOptions, PlaidApi},
    sync::{snapshot_net_worth, sync_holdings, sync_institution_transactions, sync_investment_transactions},
};

/// Ask Plaid for a Link token.
///
/// Passing an `access_token` creates an update mode token for an existing
/// item, used to re-authenticate or to add the investments product.
pub async fn create_link_token(
    plaid: &dyn PlaidApi,
    config: &Config,
    access_token: Option<String>,
    include_investments: bool,
) -> Result<LinkToken, Error> {
    let options = LinkTokenOptions {
        access_token,
        include_investments,
        redirect_uri: config.redirect_uri(),
    };

    plaid.create_link_token(options).await.map_err(|error| {
        tracing::error!("Could not create link token: {error}");
        Error::from(error)
    })
}

/// The details Plaid Link hands the frontend after a successful link.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExchangeRequest {
    pub public_token: String,
    pub institution_id: String,
    #[serde(default)]
    pub institution_name: Option<String>,
}

/// Exchange a public token and save the institution and its accounts, then
/// run the first sync.
///
/// Only the exchange and the account fetch can fail the link. Missing
/// institution metadata and sync failures are logged, since webhooks and
/// manual syncs retry later.
pub async fn link_institution(
    plaid: &dyn PlaidApi,
    db_connection: &Mutex<Connection>,
    config: &Config,
    request: &ExchangeRequest,
    today: Date,
) -> Result<Institution, Error> {
    if request.public_token.trim().is_empty() || request.institution_id.trim().is_empty() {
        return Err(Error::Validation(
            "public_token and institution_id are required".to_owned(),
        ));
    }

    let exchange = plaid.exchange_public_token(&request.public_token).await?;

    let metadata = plaid
        .get_institution(&request.institution_id)
        .await
        .inspect_err(|error| {
            tracing::warn!(
                "Could not fetch metadata for institution {}: {error}",
                request.institution_id
            )
        })
        .ok();

    let accounts = plaid.get_accounts(&exchange.access_token).await?;

    let name = request
        .institution_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| metadata.as_ref().map(|metadata| metadata.name.clone()))
        .unwrap_or_else(|| request.institution_id.clone());

    let item = LinkedItem {
        plaid_institution_id: request.institution_id.clone(),
        name,
        logo_url: metadata.as_ref().and_then(|metadata| metadata.logo.clone()),
        primary_color: metadata
            .as_ref()
            .and_then(|metadata| metadata.primary_color.clone()),
        url: metadata.as_ref().and_then(|metadata| metadata.url.clone()),
        access_token: exchange.access_token,
        item_id: exchange.item_id,
    };

    let (institution, has_investments) = {
        let connection = lock_connection(db_connection)?;
        let transaction = connection.unchecked_transaction()?;
        let institution = upsert_linked_institution(&item, &transaction)?;
        for account in &accounts {
            link_plaid_account(institution.id, account, &transaction)?;
        }
        let has_investments = has_investment_accounts(institution.id, &transaction)?;
        transaction.commit()?;
        (institution, has_investments)
    };

    tracing::info!(
        "Linked {} with {} accounts",
        institution.name,
        accounts.len()
    );

    if let Err(error) =
        sync_institution_transactions(plaid, db_connection, institution.id, &config.sync, today)
            .await
    {
        tracing::warn!(
            "Initial sync for {} failed, it will be retried on the next webhook: {error}",
            institution.name
        );
    }

    if has_investments {
        if let Err(error) = sync_holdings(plaid, db_connection, institution.id).await {
            tracing::warn!("Could not sync holdings for {}: {error}", institution.name);
        }

        let start_date = today - Duration::days(config.sync.investment_history_days);
        if let Err(error) =
            sync_investment_transactions(plaid, db_connection, institution.id, start_date, today)
                .await
        {
            tracing::warn!(
                "Could not sync investment transactions for {}: {error}",
                institution.name
            );
        }
    }

    snapshot_net_worth(db_connection, today);

    let connection = lock_connection(db_connection)?;
    get_institution(institution.id, &connection)
}
