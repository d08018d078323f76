//! Keeping the local copy of each Plaid item up to date.

mod investments;
mod refresh;
mod transactions;

pub use investments::{HoldingsSync, sync_holdings, sync_investment_transactions};
pub(crate) use refresh::snapshot_net_worth;
pub use refresh::{RefreshSummary, refresh_institution, update_balances};
pub use transactions::{
    MAX_BACKFILL_DAYS, SyncSummary, backfill_transactions, sync_institution_transactions,
};
