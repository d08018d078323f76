//! The account model and its database functions.

use std::{collections::HashMap, fmt, str::FromStr};

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::DatabaseId,
    institution::{InstitutionId, get_or_create_manual_institution},
    plaid::PlaidAccount,
};

pub type AccountId = DatabaseId;

// ============================================================================
// MODELS
// ============================================================================

/// The kind of account, using Plaid's account type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Depository,
    Credit,
    Loan,
    Investment,
    #[serde(other)]
    Other,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Depository => "depository",
            AccountType::Credit => "credit",
            AccountType::Loan => "loan",
            AccountType::Investment => "investment",
            AccountType::Other => "other",
        }
    }

    /// The human readable name, e.g. "Credit Card".
    pub fn display_name(&self) -> &'static str {
        match self {
            AccountType::Depository => "Depository",
            AccountType::Credit => "Credit Card",
            AccountType::Loan => "Loan",
            AccountType::Investment => "Investment",
            AccountType::Other => "Other",
        }
    }

    /// Whether balances of this type add to net worth.
    pub fn is_asset(&self) -> bool {
        matches!(self, AccountType::Depository | AccountType::Investment)
    }

    /// Whether balances of this type subtract from net worth.
    pub fn is_liability(&self) -> bool {
        matches!(self, AccountType::Credit | AccountType::Loan)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depository" => Ok(AccountType::Depository),
            "credit" => Ok(AccountType::Credit),
            "loan" => Ok(AccountType::Loan),
            "investment" => Ok(AccountType::Investment),
            "other" => Ok(AccountType::Other),
            other => Err(Error::Validation(format!("unknown account type \"{other}\""))),
        }
    }
}

impl ToSql for AccountType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// A bank account, credit card, loan or investment account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub institution_id: InstitutionId,
    pub plaid_account_id: Option<String>,
    pub name: String,
    pub custom_name: Option<String>,
    pub official_name: Option<String>,
    pub mask: Option<String>,
    pub account_type: AccountType,
    pub subtype: Option<String>,
    pub current_balance: f64,
    pub available_balance: Option<f64>,
    pub credit_limit: Option<f64>,
    pub iso_currency_code: String,
    pub is_active: bool,
    pub is_selected: bool,
    pub is_manual: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Account {
    /// The custom name if the user set one, otherwise the institution's name.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }

    /// The balance as it contributes to net worth: liabilities are negative
    /// and accounts that are neither assets nor liabilities contribute nothing.
    pub fn net_worth_contribution(&self) -> f64 {
        if self.account_type.is_asset() {
            self.current_balance
        } else if self.account_type.is_liability() {
            -self.current_balance
        } else {
            0.0
        }
    }
}

/// The details for a hand-maintained account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManualAccountForm {
    pub institution_name: String,
    pub account_name: String,
    #[serde(default = "default_manual_account_type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub account_subtype: Option<String>,
    #[serde(default)]
    pub current_balance: f64,
}

fn default_manual_account_type() -> AccountType {
    AccountType::Other
}

/// Whether a Plaid account was matched to an existing row or inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created(AccountId),
    Updated(AccountId),
}

impl LinkOutcome {
    pub fn account_id(&self) -> AccountId {
        match self {
            LinkOutcome::Created(id) | LinkOutcome::Updated(id) => *id,
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            institution_id INTEGER NOT NULL,
            plaid_account_id TEXT UNIQUE,
            name TEXT NOT NULL,
            custom_name TEXT,
            official_name TEXT,
            mask TEXT,
            account_type TEXT NOT NULL,
            subtype TEXT,
            current_balance REAL NOT NULL DEFAULT 0,
            available_balance REAL,
            credit_limit REAL,
            iso_currency_code TEXT NOT NULL DEFAULT 'USD',
            is_active INTEGER NOT NULL DEFAULT 1,
            is_selected INTEGER NOT NULL DEFAULT 1,
            is_manual INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(institution_id) REFERENCES institution(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_account_institution ON account(institution_id);",
    )?;

    Ok(())
}

pub const SELECT_ACCOUNT: &str = "SELECT account.id, account.institution_id, \
    account.plaid_account_id, account.name, account.custom_name, account.official_name, \
    account.mask, account.account_type, account.subtype, account.current_balance, \
    account.available_balance, account.credit_limit, account.iso_currency_code, \
    account.is_active, account.is_selected, account.is_manual, account.created_at, \
    account.updated_at FROM account";

pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        institution_id: row.get(1)?,
        plaid_account_id: row.get(2)?,
        name: row.get(3)?,
        custom_name: row.get(4)?,
        official_name: row.get(5)?,
        mask: row.get(6)?,
        account_type: row.get(7)?,
        subtype: row.get(8)?,
        current_balance: row.get(9)?,
        available_balance: row.get(10)?,
        credit_limit: row.get(11)?,
        iso_currency_code: row.get(12)?,
        is_active: row.get(13)?,
        is_selected: row.get(14)?,
        is_manual: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub fn get_account(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .query_row(
            &format!("{SELECT_ACCOUNT} WHERE account.id = ?1"),
            [id],
            map_row_to_account,
        )
        .map_err(Error::from)
}

/// Retrieve all accounts ordered by institution name, then account name.
pub fn get_all_accounts(connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_ACCOUNT} INNER JOIN institution ON institution.id = account.institution_id \
            ORDER BY institution.name ASC, account.name ASC, account.id ASC"
        ))?
        .query_map([], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

pub fn get_institution_accounts(
    institution_id: InstitutionId,
    connection: &Connection,
) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_ACCOUNT} WHERE account.institution_id = ?1 ORDER BY account.name ASC, account.id ASC"
        ))?
        .query_map([institution_id], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

/// Map Plaid account IDs to local account IDs for an institution.
pub fn get_plaid_account_ids(
    institution_id: InstitutionId,
    connection: &Connection,
) -> Result<HashMap<String, AccountId>, Error> {
    connection
        .prepare(
            "SELECT plaid_account_id, id FROM account \
            WHERE institution_id = ?1 AND plaid_account_id IS NOT NULL",
        )?
        .query_map([institution_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .map(|maybe_pair| maybe_pair.map_err(Error::from))
        .collect()
}

pub fn has_investment_accounts(
    institution_id: InstitutionId,
    connection: &Connection,
) -> Result<bool, Error> {
    connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM account WHERE institution_id = ?1 AND account_type = ?2)",
            params![institution_id, AccountType::Investment],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// Flip whether the account is included in totals and analytics.
pub fn toggle_account_selected(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET is_selected = NOT is_selected, updated_at = ?1 WHERE id = ?2",
        params![OffsetDateTime::now_utc(), id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_account(id, connection)
}

/// Set the user's name for an account. A blank name clears it.
pub fn set_account_custom_name(
    id: AccountId,
    custom_name: Option<&str>,
    connection: &Connection,
) -> Result<Account, Error> {
    let custom_name = custom_name
        .map(str::trim)
        .filter(|custom_name| !custom_name.is_empty());

    let rows_affected = connection.execute(
        "UPDATE account SET custom_name = ?1, updated_at = ?2 WHERE id = ?3",
        params![custom_name, OffsetDateTime::now_utc(), id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_account(id, connection)
}

pub fn delete_account(id: AccountId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM account WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Create a hand-maintained account, creating its institution if needed.
///
/// # Errors
/// Returns [Error::Validation] if the institution or account name is blank.
pub fn create_manual_account(
    form: &ManualAccountForm,
    connection: &Connection,
) -> Result<Account, Error> {
    let institution_name = form.institution_name.trim();
    let account_name = form.account_name.trim();

    if institution_name.is_empty() || account_name.is_empty() {
        return Err(Error::Validation(
            "institution_name and account_name are required".to_owned(),
        ));
    }

    let transaction = connection.unchecked_transaction()?;
    let institution = get_or_create_manual_institution(institution_name, &transaction)?;
    let now = OffsetDateTime::now_utc();

    transaction.execute(
        "INSERT INTO account (institution_id, name, account_type, subtype, current_balance, \
            is_active, is_selected, is_manual, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, 1, 1, ?6, ?6)",
        params![
            institution.id,
            account_name,
            form.account_type,
            form.account_subtype.as_deref().unwrap_or("manual"),
            form.current_balance,
            now,
        ],
    )?;
    let id = transaction.last_insert_rowid();
    transaction.commit()?;

    get_account(id, connection)
}

/// Save an account reported by Plaid for `institution_id`.
///
/// Accounts are matched by Plaid account ID first, then by mask and subtype
/// within the institution, since Plaid issues new account IDs when an item
/// is relinked (e.g. to add the investments product).
pub fn link_plaid_account(
    institution_id: InstitutionId,
    plaid_account: &PlaidAccount,
    connection: &Connection,
) -> Result<LinkOutcome, Error> {
    let by_plaid_id: Option<AccountId> = connection
        .query_row(
            "SELECT id FROM account WHERE plaid_account_id = ?1",
            [&plaid_account.account_id],
            |row| row.get(0),
        )
        .optional()?;

    let existing = match by_plaid_id {
        Some(id) => Some(id),
        None => match &plaid_account.mask {
            Some(mask) => connection
                .query_row(
                    "SELECT id FROM account WHERE institution_id = ?1 AND mask = ?2 \
                    AND subtype IS ?3 AND is_manual = 0 ORDER BY id LIMIT 1",
                    params![institution_id, mask, plaid_account.subtype],
                    |row| row.get(0),
                )
                .optional()?,
            None => None,
        },
    };

    let balances = &plaid_account.balances;
    let now = OffsetDateTime::now_utc();

    match existing {
        Some(id) => {
            connection.execute(
                "UPDATE account SET institution_id = ?1, plaid_account_id = ?2, name = ?3, \
                official_name = ?4, mask = ?5, account_type = ?6, subtype = ?7, \
                current_balance = ?8, available_balance = ?9, credit_limit = ?10, \
                iso_currency_code = ?11, is_active = 1, updated_at = ?12 WHERE id = ?13",
                params![
                    institution_id,
                    plaid_account.account_id,
                    plaid_account.name,
                    plaid_account.official_name,
                    plaid_account.mask,
                    plaid_account.account_type,
                    plaid_account.subtype,
                    balances.current_or_available(),
                    balances.available,
                    balances.limit,
                    balances.iso_currency_code.as_deref().unwrap_or("USD"),
                    now,
                    id,
                ],
            )?;

            Ok(LinkOutcome::Updated(id))
        }
        None => {
            connection.execute(
                "INSERT INTO account (institution_id, plaid_account_id, name, official_name, \
                    mask, account_type, subtype, current_balance, available_balance, \
                    credit_limit, iso_currency_code, is_active, is_selected, is_manual, \
                    created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, 1, 0, ?12, ?12)",
                params![
                    institution_id,
                    plaid_account.account_id,
                    plaid_account.name,
                    plaid_account.official_name,
                    plaid_account.mask,
                    plaid_account.account_type,
                    plaid_account.subtype,
                    balances.current_or_available(),
                    balances.available,
                    balances.limit,
                    balances.iso_currency_code.as_deref().unwrap_or("USD"),
                    now,
                ],
            )?;

            Ok(LinkOutcome::Created(connection.last_insert_rowid()))
        }
    }
}

/// Refresh the balances of a known account. Returns `false` if no account
/// has the Plaid account ID.
pub fn update_account_balances(
    plaid_account: &PlaidAccount,
    connection: &Connection,
) -> Result<bool, Error> {
    let balances = &plaid_account.balances;

    let rows_affected = connection.execute(
        "UPDATE account SET current_balance = ?1, available_balance = ?2, credit_limit = ?3, \
        updated_at = ?4 WHERE plaid_account_id = ?5",
        params![
            balances.current_or_available(),
            balances.available,
            balances.limit,
            OffsetDateTime::now_utc(),
            plaid_account.account_id,
        ],
    )?;

    Ok(rows_affected > 0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        account::AccountType,
        db::initialize,
        institution::{delete_institution, test_utils::create_linked_institution},
        plaid::test_client::plaid_account,
    };

    use super::{
        LinkOutcome, ManualAccountForm, create_manual_account, get_account, get_all_accounts,
        get_plaid_account_ids, has_investment_accounts, link_plaid_account,
        set_account_custom_name, toggle_account_selected, update_account_balances,
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn links_new_account() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        let plaid = plaid_account("acc-1", AccountType::Depository, "0000", Some(100.0));

        let outcome = link_plaid_account(institution.id, &plaid, &connection).unwrap();

        let LinkOutcome::Created(id) = outcome else {
            panic!("expected a new account, got {outcome:?}");
        };
        let account = get_account(id, &connection).unwrap();
        assert_eq!(account.plaid_account_id, Some("acc-1".to_owned()));
        assert_eq!(account.current_balance, 100.0);
        assert!(account.is_selected);
    }

    #[test]
    fn relinking_matches_by_mask_and_subtype() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        let original = plaid_account("acc-1", AccountType::Depository, "1111", Some(5.0));
        let id = link_plaid_account(institution.id, &original, &connection)
            .unwrap()
            .account_id();

        let relinked = plaid_account("acc-new", AccountType::Depository, "1111", Some(7.0));
        let outcome = link_plaid_account(institution.id, &relinked, &connection).unwrap();

        assert_eq!(outcome, LinkOutcome::Updated(id));
        let account = get_account(id, &connection).unwrap();
        assert_eq!(account.plaid_account_id, Some("acc-new".to_owned()));
        assert_eq!(account.current_balance, 7.0);
    }

    #[test]
    fn balance_falls_back_to_available_then_zero() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        let mut plaid = plaid_account("acc-1", AccountType::Credit, "2222", None);
        plaid.balances.available = Some(30.0);
        let id = link_plaid_account(institution.id, &plaid, &connection)
            .unwrap()
            .account_id();
        assert_eq!(get_account(id, &connection).unwrap().current_balance, 30.0);

        plaid.balances.available = None;
        assert!(update_account_balances(&plaid, &connection).unwrap());

        assert_eq!(get_account(id, &connection).unwrap().current_balance, 0.0);
    }

    #[test]
    fn update_balances_for_unknown_account_returns_false() {
        let connection = get_test_connection();
        let plaid = plaid_account("ghost", AccountType::Depository, "9999", Some(1.0));

        assert_eq!(update_account_balances(&plaid, &connection), Ok(false));
    }

    #[test]
    fn maps_plaid_ids() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        let plaid = plaid_account("acc-1", AccountType::Investment, "3333", Some(1.0));
        let id = link_plaid_account(institution.id, &plaid, &connection)
            .unwrap()
            .account_id();

        let ids = get_plaid_account_ids(institution.id, &connection).unwrap();

        assert_eq!(ids.get("acc-1"), Some(&id));
        assert_eq!(has_investment_accounts(institution.id, &connection), Ok(true));
    }

    #[test]
    fn creates_manual_account() {
        let connection = get_test_connection();

        let account = create_manual_account(
            &ManualAccountForm {
                institution_name: "Venmo".to_owned(),
                account_name: "Wallet".to_owned(),
                account_type: AccountType::Depository,
                account_subtype: None,
                current_balance: 42.0,
            },
            &connection,
        )
        .unwrap();

        assert!(account.is_manual);
        assert_eq!(account.plaid_account_id, None);
        assert_eq!(account.subtype, Some("manual".to_owned()));
        assert_eq!(account.current_balance, 42.0);
    }

    #[test]
    fn manual_account_requires_names() {
        let connection = get_test_connection();

        let result = create_manual_account(
            &ManualAccountForm {
                institution_name: " ".to_owned(),
                account_name: "Wallet".to_owned(),
                account_type: AccountType::Other,
                account_subtype: None,
                current_balance: 0.0,
            },
            &connection,
        );

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn toggles_selected_and_sets_custom_name() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        let plaid = plaid_account("acc-1", AccountType::Depository, "0000", Some(1.0));
        let id = link_plaid_account(institution.id, &plaid, &connection)
            .unwrap()
            .account_id();

        let toggled = toggle_account_selected(id, &connection).unwrap();
        let renamed = set_account_custom_name(id, Some("  Rainy day  "), &connection).unwrap();
        let cleared = set_account_custom_name(id, Some(""), &connection).unwrap();

        assert!(!toggled.is_selected);
        assert_eq!(renamed.display_name(), "Rainy day");
        assert_eq!(cleared.custom_name, None);
    }

    #[test]
    fn deleting_institution_cascades_to_accounts() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        let plaid = plaid_account("acc-1", AccountType::Depository, "0000", Some(1.0));
        link_plaid_account(institution.id, &plaid, &connection).unwrap();

        delete_institution(institution.id, &connection).unwrap();

        assert_eq!(get_all_accounts(&connection), Ok(vec![]));
    }
}
