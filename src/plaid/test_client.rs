//! A scripted, in-memory [PlaidApi] for tests.

use std::{collections::VecDeque, sync::Mutex};

use time::Date;

use crate::{
    account::AccountType,
    plaid::{
        HoldingsResponse, InvestmentTransactionsPage, LinkToken, LinkTokenOptions, PlaidAccount,
        PlaidApi, PlaidApiError, PlaidBalances, PlaidError, PlaidInstitution,
        PlaidInvestmentTransaction, PlaidTransaction, TokenExchange, TransactionsPage,
        TransactionsSyncPage,
    },
};

#[derive(Debug, Default)]
pub struct FakePlaid {
    pub accounts: Mutex<Vec<PlaidAccount>>,
    pub institution: Mutex<Option<PlaidInstitution>>,
    pub exchange: Mutex<Option<TokenExchange>>,
    /// Responses to `sync_transactions`, served in order. Once exhausted an
    /// empty final page is returned.
    pub sync_responses: Mutex<VecDeque<Result<TransactionsSyncPage, PlaidError>>>,
    /// The cursor passed to each `sync_transactions` call.
    pub sync_calls: Mutex<Vec<Option<String>>>,
    /// The history served by `get_transactions`.
    pub history: Mutex<Vec<PlaidTransaction>>,
    pub history_calls: Mutex<u32>,
    /// Errors returned by `get_transactions` before any history is served.
    pub history_errors: Mutex<VecDeque<PlaidError>>,
    pub holdings: Mutex<Option<HoldingsResponse>>,
    pub investment_transactions: Mutex<Vec<PlaidInvestmentTransaction>>,
    pub link_requests: Mutex<Vec<LinkTokenOptions>>,
    pub removed_items: Mutex<Vec<String>>,
    /// Returned by the next `remove_item` call.
    pub remove_item_error: Mutex<Option<PlaidError>>,
}

impl FakePlaid {
    pub fn push_sync_response(&self, response: Result<TransactionsSyncPage, PlaidError>) {
        self.sync_responses.lock().unwrap().push_back(response);
    }

    pub fn push_history_error(&self, error: PlaidError) {
        self.history_errors.lock().unwrap().push_back(error);
    }

    pub fn sync_cursors(&self) -> Vec<Option<String>> {
        self.sync_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PlaidApi for FakePlaid {
    async fn create_link_token(&self, options: LinkTokenOptions) -> Result<LinkToken, PlaidError> {
        self.link_requests.lock().unwrap().push(options);

        Ok(LinkToken {
            link_token: "link-sandbox-token".to_owned(),
            expiration: "2030-01-01T00:00:00Z".to_owned(),
        })
    }

    async fn exchange_public_token(&self, _public_token: &str) -> Result<TokenExchange, PlaidError> {
        self.exchange
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlaidError::Api(api_error("INVALID_PUBLIC_TOKEN")))
    }

    async fn get_accounts(&self, _access_token: &str) -> Result<Vec<PlaidAccount>, PlaidError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn get_institution(&self, institution_id: &str) -> Result<PlaidInstitution, PlaidError> {
        self.institution
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlaidError::Transport(format!("no institution {institution_id}")))
    }

    async fn sync_transactions(
        &self,
        _access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncPage, PlaidError> {
        self.sync_calls
            .lock()
            .unwrap()
            .push(cursor.map(str::to_owned));

        self.sync_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sync_page(vec![], vec![], vec![], cursor.unwrap_or("final"), false)))
    }

    async fn get_transactions(
        &self,
        _access_token: &str,
        start_date: Date,
        end_date: Date,
        offset: u32,
        count: u32,
    ) -> Result<TransactionsPage, PlaidError> {
        *self.history_calls.lock().unwrap() += 1;

        if let Some(error) = self.history_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let in_range: Vec<PlaidTransaction> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|transaction| transaction.date >= start_date && transaction.date <= end_date)
            .cloned()
            .collect();

        let transactions = in_range
            .iter()
            .skip(offset as usize)
            .take(count as usize)
            .cloned()
            .collect();

        Ok(TransactionsPage {
            transactions,
            total_transactions: in_range.len() as u32,
        })
    }

    async fn get_investment_holdings(
        &self,
        _access_token: &str,
    ) -> Result<HoldingsResponse, PlaidError> {
        self.holdings
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlaidError::Api(api_error("PRODUCTS_NOT_SUPPORTED")))
    }

    async fn get_investment_transactions(
        &self,
        _access_token: &str,
        start_date: Date,
        end_date: Date,
        offset: u32,
    ) -> Result<InvestmentTransactionsPage, PlaidError> {
        let in_range: Vec<PlaidInvestmentTransaction> = self
            .investment_transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|transaction| transaction.date >= start_date && transaction.date <= end_date)
            .cloned()
            .collect();

        Ok(InvestmentTransactionsPage {
            investment_transactions: in_range.iter().skip(offset as usize).cloned().collect(),
            total_investment_transactions: in_range.len() as u32,
            securities: vec![],
        })
    }

    async fn remove_item(&self, access_token: &str) -> Result<(), PlaidError> {
        self.removed_items
            .lock()
            .unwrap()
            .push(access_token.to_owned());

        match self.remove_item_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub fn api_error(code: &str) -> PlaidApiError {
    PlaidApiError {
        error_type: "TEST_ERROR".to_owned(),
        error_code: code.to_owned(),
        error_message: format!("{code} happened"),
        display_message: None,
        request_id: None,
    }
}

pub fn sync_page(
    added: Vec<PlaidTransaction>,
    modified: Vec<PlaidTransaction>,
    removed: Vec<&str>,
    next_cursor: &str,
    has_more: bool,
) -> TransactionsSyncPage {
    TransactionsSyncPage {
        added,
        modified,
        removed: removed
            .into_iter()
            .map(|transaction_id| crate::plaid::RemovedTransaction {
                transaction_id: transaction_id.to_owned(),
                account_id: None,
            })
            .collect(),
        next_cursor: next_cursor.to_owned(),
        has_more,
    }
}

pub fn plaid_transaction(
    transaction_id: &str,
    account_id: &str,
    amount: f64,
    date: Date,
) -> PlaidTransaction {
    PlaidTransaction {
        transaction_id: transaction_id.to_owned(),
        account_id: account_id.to_owned(),
        amount,
        iso_currency_code: Some("USD".to_owned()),
        name: format!("Transaction {transaction_id}"),
        merchant_name: None,
        category: None,
        personal_finance_category: None,
        date,
        authorized_date: None,
        datetime: None,
        payment_channel: None,
        transaction_type: None,
        location: None,
        pending: false,
        pending_transaction_id: None,
        account_owner: None,
    }
}

pub fn plaid_account(
    account_id: &str,
    account_type: AccountType,
    mask: &str,
    current: Option<f64>,
) -> PlaidAccount {
    PlaidAccount {
        account_id: account_id.to_owned(),
        balances: PlaidBalances {
            available: None,
            current,
            limit: None,
            iso_currency_code: Some("USD".to_owned()),
        },
        mask: Some(mask.to_owned()),
        name: format!("Account {mask}"),
        official_name: None,
        account_type,
        subtype: Some("checking".to_owned()),
    }
}
