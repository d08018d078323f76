//! Plaid webhooks: verifying, storing and acting on them.

mod core;
mod endpoints;
mod process;

pub use core::{
    StoredWebhook, WebhookId, WebhookPayload, create_webhook_table, get_recent_webhooks,
    mark_webhook_processed, record_webhook_error, save_webhook,
};
pub use endpoints::{WEBHOOK_SECRET_HEADER, is_valid_secret, plaid_webhook_endpoint};
pub use process::process_webhook;
