//! The institution model and its database functions.

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{Error, database_id::DatabaseId};

pub type InstitutionId = DatabaseId;

// ============================================================================
// MODELS
// ============================================================================

/// A bank, brokerage or service holding one or more accounts.
///
/// Institutions linked through Plaid carry the item's access token and sync
/// cursor. Manual institutions have neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub plaid_institution_id: Option<String>,
    pub name: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub url: Option<String>,
    #[serde(skip)]
    pub access_token: Option<String>,
    pub item_id: Option<String>,
    #[serde(skip)]
    pub sync_cursor: Option<String>,
    pub is_active: bool,
    pub is_manual: bool,
    pub needs_update: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_successful_update: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The details saved after exchanging a Link public token.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedItem {
    pub plaid_institution_id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub url: Option<String>,
    pub access_token: String,
    pub item_id: String,
}

/// Display defaults for manual institutions with well known names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstitutionPreset {
    pub primary_color: &'static str,
    pub url: &'static str,
}

const PRESETS: [(&str, InstitutionPreset); 7] = [
    (
        "coinbase",
        InstitutionPreset {
            primary_color: "#0052FF",
            url: "https://www.coinbase.com",
        },
    ),
    (
        "robinhood",
        InstitutionPreset {
            primary_color: "#00C805",
            url: "https://robinhood.com",
        },
    ),
    (
        "crypto.com",
        InstitutionPreset {
            primary_color: "#002D74",
            url: "https://crypto.com",
        },
    ),
    (
        "binance",
        InstitutionPreset {
            primary_color: "#F3BA2F",
            url: "https://www.binance.com",
        },
    ),
    (
        "venmo",
        InstitutionPreset {
            primary_color: "#3D95CE",
            url: "https://venmo.com",
        },
    ),
    (
        "paypal",
        InstitutionPreset {
            primary_color: "#003087",
            url: "https://www.paypal.com",
        },
    ),
    (
        "cash app",
        InstitutionPreset {
            primary_color: "#00D632",
            url: "https://cash.app",
        },
    ),
];

/// Find the preset for an institution name, ignoring case.
pub fn find_preset(name: &str) -> Option<InstitutionPreset> {
    let name = name.trim().to_lowercase();

    PRESETS
        .iter()
        .find(|(key, _)| name.contains(key))
        .map(|(_, preset)| *preset)
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

pub fn create_institution_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS institution (
            id INTEGER PRIMARY KEY,
            plaid_institution_id TEXT UNIQUE,
            name TEXT NOT NULL,
            logo_url TEXT,
            primary_color TEXT,
            url TEXT,
            access_token TEXT,
            item_id TEXT UNIQUE,
            sync_cursor TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_manual INTEGER NOT NULL DEFAULT 0,
            needs_update INTEGER NOT NULL DEFAULT 0,
            last_successful_update TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_institution_name ON institution(name);",
    )?;

    Ok(())
}

const SELECT_INSTITUTION: &str = "SELECT id, plaid_institution_id, name, logo_url, primary_color, \
    url, access_token, item_id, sync_cursor, is_active, is_manual, needs_update, \
    last_successful_update, error_message, created_at, updated_at FROM institution";

pub fn map_row_to_institution(row: &Row) -> Result<Institution, rusqlite::Error> {
    Ok(Institution {
        id: row.get(0)?,
        plaid_institution_id: row.get(1)?,
        name: row.get(2)?,
        logo_url: row.get(3)?,
        primary_color: row.get(4)?,
        url: row.get(5)?,
        access_token: row.get(6)?,
        item_id: row.get(7)?,
        sync_cursor: row.get(8)?,
        is_active: row.get(9)?,
        is_manual: row.get(10)?,
        needs_update: row.get(11)?,
        last_successful_update: row.get(12)?,
        error_message: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub fn get_institution(id: InstitutionId, connection: &Connection) -> Result<Institution, Error> {
    connection
        .query_row(
            &format!("{SELECT_INSTITUTION} WHERE id = ?1"),
            [id],
            map_row_to_institution,
        )
        .map_err(Error::from)
}

pub fn get_institution_by_item_id(
    item_id: &str,
    connection: &Connection,
) -> Result<Option<Institution>, Error> {
    connection
        .query_row(
            &format!("{SELECT_INSTITUTION} WHERE item_id = ?1"),
            [item_id],
            map_row_to_institution,
        )
        .optional()
        .map_err(Error::from)
}

/// Retrieve all institutions ordered by name.
pub fn get_all_institutions(connection: &Connection) -> Result<Vec<Institution>, Error> {
    connection
        .prepare(&format!("{SELECT_INSTITUTION} ORDER BY name ASC, id ASC"))?
        .query_map([], map_row_to_institution)?
        .map(|maybe_institution| maybe_institution.map_err(Error::from))
        .collect()
}

/// Insert or refresh the institution for a newly linked Plaid item.
///
/// Relinking reactivates the institution and clears its error state. The sync
/// cursor is kept only when the item is unchanged.
pub fn upsert_linked_institution(
    item: &LinkedItem,
    connection: &Connection,
) -> Result<Institution, Error> {
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO institution (plaid_institution_id, name, logo_url, primary_color, url, \
            access_token, item_id, is_active, is_manual, needs_update, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, 0, ?8, ?8)
        ON CONFLICT(plaid_institution_id) DO UPDATE SET
            name = excluded.name,
            logo_url = COALESCE(excluded.logo_url, logo_url),
            primary_color = COALESCE(excluded.primary_color, primary_color),
            url = COALESCE(excluded.url, url),
            sync_cursor = CASE WHEN item_id = excluded.item_id THEN sync_cursor ELSE NULL END,
            access_token = excluded.access_token,
            item_id = excluded.item_id,
            is_active = 1,
            needs_update = 0,
            error_message = NULL,
            updated_at = excluded.updated_at",
        params![
            item.plaid_institution_id,
            item.name,
            item.logo_url,
            item.primary_color,
            item.url,
            item.access_token,
            item.item_id,
            now,
        ],
    )?;

    connection
        .query_row(
            &format!("{SELECT_INSTITUTION} WHERE plaid_institution_id = ?1"),
            [&item.plaid_institution_id],
            map_row_to_institution,
        )
        .map_err(Error::from)
}

/// Find the manual institution called `name` (ignoring case) or create it.
pub fn get_or_create_manual_institution(
    name: &str,
    connection: &Connection,
) -> Result<Institution, Error> {
    let existing = connection
        .query_row(
            &format!("{SELECT_INSTITUTION} WHERE is_manual = 1 AND lower(name) = lower(?1)"),
            [name],
            map_row_to_institution,
        )
        .optional()?;

    if let Some(institution) = existing {
        return Ok(institution);
    }

    let preset = find_preset(name);
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO institution (name, primary_color, url, is_active, is_manual, created_at, updated_at)
        VALUES (?1, ?2, ?3, 1, 1, ?4, ?4)",
        params![
            name,
            preset.map(|preset| preset.primary_color),
            preset.map(|preset| preset.url),
            now,
        ],
    )?;

    get_institution(connection.last_insert_rowid(), connection)
}

/// Delete an institution along with its accounts and their transactions and holdings.
pub fn delete_institution(id: InstitutionId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM institution WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Set whether the institution and all of its accounts are active.
pub fn set_institution_active(
    id: InstitutionId,
    is_active: bool,
    connection: &Connection,
) -> Result<(), Error> {
    let transaction = connection.unchecked_transaction()?;
    let now = OffsetDateTime::now_utc();

    let rows_affected = transaction.execute(
        "UPDATE institution SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![is_active, now, id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    transaction.execute(
        "UPDATE account SET is_active = ?1, updated_at = ?2 WHERE institution_id = ?3",
        params![is_active, now, id],
    )?;

    transaction.commit()?;

    Ok(())
}

pub fn save_sync_cursor(
    id: InstitutionId,
    cursor: Option<&str>,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE institution SET sync_cursor = ?1, updated_at = ?2 WHERE id = ?3",
        params![cursor, OffsetDateTime::now_utc(), id],
    )?;

    Ok(())
}

/// Record a completed sync and clear any previous error.
pub fn mark_sync_success(id: InstitutionId, connection: &Connection) -> Result<(), Error> {
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "UPDATE institution SET last_successful_update = ?1, needs_update = 0, \
        error_message = NULL, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;

    Ok(())
}

/// Flag the institution as needing the user to re-authenticate via Link.
pub fn mark_needs_update(
    id: InstitutionId,
    message: &str,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE institution SET needs_update = 1, error_message = ?1, updated_at = ?2 WHERE id = ?3",
        params![message, OffsetDateTime::now_utc(), id],
    )?;

    Ok(())
}

pub fn record_sync_error(
    id: InstitutionId,
    message: &str,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE institution SET error_message = ?1, updated_at = ?2 WHERE id = ?3",
        params![message, OffsetDateTime::now_utc(), id],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;

    use crate::{Error, db::initialize};

    use super::{
        LinkedItem, delete_institution, find_preset, get_institution,
        get_institution_by_item_id, get_or_create_manual_institution, mark_needs_update,
        mark_sync_success, save_sync_cursor, set_institution_active, test_utils::*,
        upsert_linked_institution,
    };

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn upsert_creates_then_updates() {
        let connection = get_test_connection();
        let first = create_linked_institution("item-1", &connection);
        save_sync_cursor(first.id, Some("cursor-1"), &connection).unwrap();
        mark_needs_update(first.id, "login required", &connection).unwrap();

        let relinked = upsert_linked_institution(
            &LinkedItem {
                plaid_institution_id: "ins_item-1".to_owned(),
                name: "Renamed Bank".to_owned(),
                logo_url: None,
                primary_color: None,
                url: None,
                access_token: "access-new".to_owned(),
                item_id: "item-1".to_owned(),
            },
            &connection,
        )
        .unwrap();

        assert_eq!(relinked.id, first.id);
        assert_eq!(relinked.name, "Renamed Bank");
        assert_eq!(relinked.primary_color, Some("#123456".to_owned()));
        assert_eq!(relinked.access_token, Some("access-new".to_owned()));
        assert_eq!(relinked.sync_cursor, Some("cursor-1".to_owned()));
        assert!(!relinked.needs_update);
        assert_eq!(relinked.error_message, None);
    }

    #[test]
    fn relinking_with_new_item_resets_cursor() {
        let connection = get_test_connection();
        let first = create_linked_institution("item-1", &connection);
        save_sync_cursor(first.id, Some("cursor-1"), &connection).unwrap();

        let relinked = upsert_linked_institution(
            &LinkedItem {
                plaid_institution_id: "ins_item-1".to_owned(),
                name: first.name.clone(),
                logo_url: None,
                primary_color: None,
                url: None,
                access_token: "access-2".to_owned(),
                item_id: "item-2".to_owned(),
            },
            &connection,
        )
        .unwrap();

        assert_eq!(relinked.sync_cursor, None);
        assert_eq!(relinked.item_id, Some("item-2".to_owned()));
    }

    #[test]
    fn finds_by_item_id() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-9", &connection);

        let got = get_institution_by_item_id("item-9", &connection).unwrap();
        let missing = get_institution_by_item_id("nope", &connection).unwrap();

        assert_eq!(got, Some(institution));
        assert_eq!(missing, None);
    }

    #[test]
    fn manual_institution_is_reused_and_uses_preset() {
        let connection = get_test_connection();

        let first = get_or_create_manual_institution("Coinbase", &connection).unwrap();
        let second = get_or_create_manual_institution("coinbase", &connection).unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_manual);
        assert_eq!(first.primary_color, Some("#0052FF".to_owned()));
        assert_eq!(first.access_token, None);
    }

    #[test]
    fn preset_lookup_ignores_case() {
        assert!(find_preset("My PayPal").is_some());
        assert!(find_preset("Local Credit Union").is_none());
    }

    #[test]
    fn sync_success_clears_errors() {
        let connection = get_test_connection();
        let institution = create_linked_institution("item-1", &connection);
        mark_needs_update(institution.id, "ITEM_LOGIN_REQUIRED", &connection).unwrap();

        mark_sync_success(institution.id, &connection).unwrap();

        let got = get_institution(institution.id, &connection).unwrap();
        assert!(!got.needs_update);
        assert_eq!(got.error_message, None);
        assert!(got.last_successful_update.is_some());
    }

    #[test]
    fn toggling_missing_institution_is_not_found() {
        let connection = get_test_connection();

        assert_eq!(
            set_institution_active(42, false, &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn delete_missing_institution_is_not_found() {
        let connection = get_test_connection();

        assert_eq!(delete_institution(42, &connection), Err(Error::NotFound));
    }
}
