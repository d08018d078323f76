//! Banks and other institutions, linked through Plaid or kept by hand.

mod core;
mod endpoints;
mod view;

pub use core::{
    Institution, InstitutionId, InstitutionPreset, LinkedItem, create_institution_table,
    delete_institution, find_preset, get_all_institutions, get_institution,
    get_institution_by_item_id, get_or_create_manual_institution, map_row_to_institution,
    mark_needs_update, mark_sync_success, record_sync_error, save_sync_cursor,
    set_institution_active, upsert_linked_institution,
};
pub use endpoints::{
    delete_institution_endpoint, get_institution_endpoint, list_institutions_endpoint,
    sync_holdings_endpoint, sync_transactions_endpoint, toggle_active_endpoint,
    update_balances_endpoint, update_link_token_endpoint, upgrade_for_investments_endpoint,
};
pub use view::{InstitutionView, get_institution_views};

#[cfg(test)]
pub use core::test_utils;
