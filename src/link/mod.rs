//! Plaid Link: creating link tokens and saving newly linked items.

mod endpoints;
mod flow;

pub use endpoints::{create_link_token_endpoint, exchange_public_token_endpoint};
pub use flow::{ExchangeRequest, create_link_token, link_institution};
