//! Request options and response bodies for the Plaid endpoints we call.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::account::AccountType;

/// Options for a new Link session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkTokenOptions {
    /// Open Link in update mode for an existing item.
    pub access_token: Option<String>,
    /// Ask for the investments product alongside transactions.
    pub include_investments: bool,
    /// Required for OAuth institutions, must be HTTPS.
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkToken {
    pub link_token: String,
    pub expiration: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    pub item_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaidBalances {
    pub available: Option<f64>,
    pub current: Option<f64>,
    pub limit: Option<f64>,
    pub iso_currency_code: Option<String>,
}

impl PlaidBalances {
    /// The balance to store as the account's current balance.
    ///
    /// Some institutions only report an available balance.
    pub fn current_or_available(&self) -> f64 {
        self.current.or(self.available).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidAccount {
    pub account_id: String,
    #[serde(default)]
    pub balances: PlaidBalances,
    pub mask: Option<String>,
    pub name: String,
    pub official_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(super) struct AccountsResponse {
    pub accounts: Vec<PlaidAccount>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidInstitution {
    pub institution_id: String,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(super) struct InstitutionResponse {
    pub institution: PlaidInstitution,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PersonalFinanceCategory {
    pub primary: String,
    #[serde(default)]
    pub detailed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidTransaction {
    pub transaction_id: String,
    pub account_id: String,
    /// Positive when money leaves the account.
    pub amount: f64,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    /// The legacy category hierarchy, most general first.
    #[serde(default)]
    pub category: Option<Vec<String>>,
    #[serde(default)]
    pub personal_finance_category: Option<PersonalFinanceCategory>,
    pub date: Date,
    #[serde(default)]
    pub authorized_date: Option<Date>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub datetime: Option<OffsetDateTime>,
    #[serde(default)]
    pub payment_channel: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub location: Option<serde_json::Value>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub pending_transaction_id: Option<String>,
    #[serde(default)]
    pub account_owner: Option<String>,
}

impl PlaidTransaction {
    /// The category path to store, preferring the legacy hierarchy and
    /// falling back to the personal finance category.
    pub fn categories(&self) -> Vec<String> {
        match &self.category {
            Some(categories) if !categories.is_empty() => categories.clone(),
            _ => self
                .personal_finance_category
                .as_ref()
                .map(|pfc| vec![pfc.primary.clone()])
                .unwrap_or_default(),
        }
    }

    pub fn primary_category(&self) -> Option<String> {
        self.category
            .as_ref()
            .and_then(|categories| categories.first().cloned())
            .or_else(|| {
                self.personal_finance_category
                    .as_ref()
                    .map(|pfc| pfc.primary.clone())
            })
    }

    pub fn detailed_category(&self) -> Option<String> {
        self.personal_finance_category
            .as_ref()
            .and_then(|pfc| pfc.detailed.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// One page of changes from `/transactions/sync`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionsSyncPage {
    #[serde(default)]
    pub added: Vec<PlaidTransaction>,
    #[serde(default)]
    pub modified: Vec<PlaidTransaction>,
    #[serde(default)]
    pub removed: Vec<RemovedTransaction>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// One page from `/transactions/get`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionsPage {
    pub transactions: Vec<PlaidTransaction>,
    pub total_transactions: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidSecurity {
    pub security_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ticker_symbol: Option<String>,
    #[serde(default)]
    pub cusip: Option<String>,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default)]
    pub sedol: Option<String>,
    #[serde(default, rename = "type")]
    pub security_type: Option<String>,
    #[serde(default)]
    pub close_price: Option<f64>,
    #[serde(default)]
    pub close_price_as_of: Option<Date>,
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default)]
    pub institution_security_id: Option<String>,
    #[serde(default)]
    pub is_cash_equivalent: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidHolding {
    pub account_id: String,
    pub security_id: String,
    pub quantity: f64,
    pub institution_price: f64,
    #[serde(default)]
    pub institution_price_as_of: Option<Date>,
    pub institution_value: f64,
    #[serde(default)]
    pub cost_basis: Option<f64>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HoldingsResponse {
    pub holdings: Vec<PlaidHolding>,
    pub securities: Vec<PlaidSecurity>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaidInvestmentTransaction {
    pub investment_transaction_id: String,
    pub account_id: String,
    #[serde(default)]
    pub security_id: Option<String>,
    pub date: Date,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    pub amount: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub fees: Option<f64>,
    #[serde(rename = "type")]
    pub transaction_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
}

/// One page from `/investments/transactions/get`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvestmentTransactionsPage {
    pub investment_transactions: Vec<PlaidInvestmentTransaction>,
    pub total_investment_transactions: u32,
    #[serde(default)]
    pub securities: Vec<PlaidSecurity>,
}
