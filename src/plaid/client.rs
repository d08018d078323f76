use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use time::Date;

use crate::{
    config::PlaidConfig,
    plaid::{
        PlaidApi,
        error::{PlaidApiError, PlaidError},
        models::{
            AccountsResponse, HoldingsResponse, InstitutionResponse,
            InvestmentTransactionsPage, LinkToken, LinkTokenOptions, PlaidAccount,
            PlaidInstitution, TokenExchange, TransactionsPage, TransactionsSyncPage,
        },
    },
};

/// Days of transaction history requested when an item is first linked.
const LINK_DAYS_REQUESTED: u32 = 730;

/// Calls the Plaid REST API over HTTPS.
#[derive(Debug, Clone)]
pub struct PlaidClient {
    http: Client,
    base_url: String,
    headers: HeaderMap,
    config: PlaidConfig,
}

impl PlaidClient {
    /// Create a client for the environment and credentials in `config`.
    ///
    /// # Errors
    /// Returns [PlaidError::Transport] if the credentials cannot be sent as
    /// HTTP headers or the HTTP client cannot be built.
    pub fn new(config: PlaidConfig) -> Result<Self, PlaidError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "PLAID-CLIENT-ID",
            HeaderValue::from_str(&config.client_id)
                .map_err(|_| PlaidError::Transport("invalid Plaid client ID".to_owned()))?,
        );
        headers.insert(
            "PLAID-SECRET",
            HeaderValue::from_str(&config.secret)
                .map_err(|_| PlaidError::Transport("invalid Plaid secret".to_owned()))?,
        );

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url: config.environment.base_url().to_owned(),
            headers,
            config,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, PlaidError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!("POST {path}");

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return match serde_json::from_slice::<PlaidApiError>(&bytes) {
                Ok(error) => {
                    tracing::warn!("{path} failed with {status}: {error}");
                    Err(PlaidError::Api(error))
                }
                Err(_) => Err(PlaidError::Decode(format!(
                    "{path} returned {status}: {}",
                    String::from_utf8_lossy(&bytes)
                ))),
            };
        }

        serde_json::from_slice(&bytes)
            .map_err(|error| PlaidError::Decode(format!("{path}: {error}")))
    }
}

#[async_trait::async_trait]
impl PlaidApi for PlaidClient {
    async fn create_link_token(&self, options: LinkTokenOptions) -> Result<LinkToken, PlaidError> {
        let mut body = json!({
            "client_name": self.config.client_name,
            "language": "en",
            "country_codes": self.config.country_codes,
            "user": { "client_user_id": self.config.client_user_id },
        });

        match &options.access_token {
            // Update mode reuses the products the item already has.
            Some(access_token) => body["access_token"] = json!(access_token),
            None => {
                let mut products = vec!["transactions"];
                if options.include_investments {
                    products.push("investments");
                }
                body["products"] = json!(products);
                body["transactions"] = json!({ "days_requested": LINK_DAYS_REQUESTED });
            }
        }

        if let Some(webhook) = &self.config.webhook_url {
            body["webhook"] = json!(webhook);
        }
        if let Some(redirect_uri) = &options.redirect_uri {
            body["redirect_uri"] = json!(redirect_uri);
        }

        self.post("/link/token/create", &body).await
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<TokenExchange, PlaidError> {
        self.post(
            "/item/public_token/exchange",
            &json!({ "public_token": public_token }),
        )
        .await
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<PlaidAccount>, PlaidError> {
        let response: AccountsResponse = self
            .post("/accounts/get", &json!({ "access_token": access_token }))
            .await?;

        Ok(response.accounts)
    }

    async fn get_institution(&self, institution_id: &str) -> Result<PlaidInstitution, PlaidError> {
        let response: InstitutionResponse = self
            .post(
                "/institutions/get_by_id",
                &json!({
                    "institution_id": institution_id,
                    "country_codes": self.config.country_codes,
                    "options": { "include_optional_metadata": true },
                }),
            )
            .await?;

        Ok(response.institution)
    }

    async fn sync_transactions(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncPage, PlaidError> {
        let mut body = json!({ "access_token": access_token });
        if let Some(cursor) = cursor {
            body["cursor"] = json!(cursor);
        }

        self.post("/transactions/sync", &body).await
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start_date: Date,
        end_date: Date,
        offset: u32,
        count: u32,
    ) -> Result<TransactionsPage, PlaidError> {
        self.post(
            "/transactions/get",
            &json!({
                "access_token": access_token,
                "start_date": start_date.to_string(),
                "end_date": end_date.to_string(),
                "options": { "count": count, "offset": offset },
            }),
        )
        .await
    }

    async fn get_investment_holdings(
        &self,
        access_token: &str,
    ) -> Result<HoldingsResponse, PlaidError> {
        self.post(
            "/investments/holdings/get",
            &json!({ "access_token": access_token }),
        )
        .await
    }

    async fn get_investment_transactions(
        &self,
        access_token: &str,
        start_date: Date,
        end_date: Date,
        offset: u32,
    ) -> Result<InvestmentTransactionsPage, PlaidError> {
        self.post(
            "/investments/transactions/get",
            &json!({
                "access_token": access_token,
                "start_date": start_date.to_string(),
                "end_date": end_date.to_string(),
                "options": { "offset": offset },
            }),
        )
        .await
    }

    async fn remove_item(&self, access_token: &str) -> Result<(), PlaidError> {
        let _: serde_json::Value = self
            .post("/item/remove", &json!({ "access_token": access_token }))
            .await?;

        Ok(())
    }
}
