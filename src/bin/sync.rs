use std::{error::Error, process::exit, sync::Mutex};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fintrack::{
    Config, InstitutionId, MAX_BACKFILL_DAYS, PlaidClient, backfill_transactions,
    get_all_institutions, get_recent_webhooks, initialize_db, local_today,
    record_net_worth_snapshot, refresh_institution, seed_default_categories, transaction_counts,
};

/// How many recent webhooks `check` lists.
const RECENT_WEBHOOK_COUNT: u32 = 10;

/// Maintenance commands for a fintrack database.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The canonical name of the local timezone, e.g. "Pacific/Auckland".
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull new transactions, holdings and balances from Plaid
    Sync {
        /// The institution to sync
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        institution_id: Option<InstitutionId>,
        /// Sync every active linked institution
        #[arg(long)]
        all: bool,
    },
    /// Fetch older transactions by date range
    Backfill {
        /// How many days of history to fetch
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_BACKFILL_DAYS))]
        days: i64,
        /// Only backfill this institution instead of every active linked one
        #[arg(long)]
        institution_id: Option<InstitutionId>,
    },
    /// Print transaction counts per institution and account, and the latest webhooks
    Check,
    /// Record today's net worth
    Snapshot,
    /// Create any missing default spending categories
    SeedCategories,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Err(error) = run(args).await {
        eprintln!("Error: {error}");
        exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let conn = Connection::open(&args.db_path)?;
    initialize_db(&conn)?;
    let today = local_today(&args.timezone)?;

    match args.command {
        Command::Sync {
            institution_id,
            all: _,
        } => {
            let config = Config::from_env()?;
            let plaid = PlaidClient::new(config.plaid.clone())?;
            let targets = target_institutions(institution_id, &conn)?;
            let db_connection = Mutex::new(conn);
            let mut failures = 0;

            for (id, name) in targets {
                println!("Syncing {name} ({id})...");
                match refresh_institution(&plaid, &db_connection, id, &config.sync, today).await {
                    Ok(summary) => println!(
                        "  {} added, {} modified, {} removed, {} backfilled",
                        summary.transactions.added,
                        summary.transactions.modified,
                        summary.transactions.removed,
                        summary.transactions.backfilled
                    ),
                    Err(error) => {
                        failures += 1;
                        println!("  failed: {error}");
                    }
                }
            }

            if failures > 0 {
                return Err(format!("{failures} institution(s) failed to sync").into());
            }
        }
        Command::Backfill {
            days,
            institution_id,
        } => {
            let config = Config::from_env()?;
            let plaid = PlaidClient::new(config.plaid.clone())?;
            let targets = target_institutions(institution_id, &conn)?;
            let db_connection = Mutex::new(conn);

            for (id, name) in targets {
                let saved = backfill_transactions(
                    &plaid,
                    &db_connection,
                    id,
                    days,
                    &config.sync,
                    today,
                )
                .await?;
                println!("{name} ({id}): saved {saved} transactions from the last {days} days");
            }
        }
        Command::Check => {
            for institution in transaction_counts(&conn)? {
                println!(
                    "{} ({}): {} transactions",
                    institution.institution_name, institution.institution_id, institution.total
                );
                for account in institution.accounts {
                    println!(
                        "  {} ({}): {}",
                        account.account_name, account.account_id, account.count
                    );
                }
            }

            println!("\nRecent webhooks:");
            for webhook in get_recent_webhooks(RECENT_WEBHOOK_COUNT, &conn)? {
                let status = match (&webhook.error, webhook.processed) {
                    (Some(error), _) => format!("error: {error}"),
                    (None, true) => "processed".to_owned(),
                    (None, false) => "pending".to_owned(),
                };
                println!(
                    "  {} {}/{} item={} {}",
                    webhook.created_at,
                    webhook.webhook_type.as_deref().unwrap_or("?"),
                    webhook.webhook_code.as_deref().unwrap_or("?"),
                    webhook.item_id.as_deref().unwrap_or("?"),
                    status
                );
            }
        }
        Command::Snapshot => {
            let snapshot = record_net_worth_snapshot(today, &conn)?;
            println!(
                "Net worth on {}: {:.2} (assets {:.2}, liabilities {:.2})",
                snapshot.date, snapshot.net_worth, snapshot.total_assets, snapshot.total_liabilities
            );
        }
        Command::SeedCategories => {
            let created = seed_default_categories(&conn)?;
            println!("Created {created} spending categories");
        }
    }

    Ok(())
}

/// The institution named by `institution_id`, or every active linked
/// institution when it is `None`.
fn target_institutions(
    institution_id: Option<InstitutionId>,
    connection: &Connection,
) -> Result<Vec<(InstitutionId, String)>, Box<dyn Error>> {
    let institutions = get_all_institutions(connection)?;

    let targets: Vec<_> = match institution_id {
        Some(id) => institutions
            .into_iter()
            .filter(|institution| institution.id == id)
            .map(|institution| (institution.id, institution.name))
            .collect(),
        None => institutions
            .into_iter()
            .filter(|institution| institution.is_active && !institution.is_manual)
            .map(|institution| (institution.id, institution.name))
            .collect(),
    };

    if targets.is_empty() {
        return Err(match institution_id {
            Some(id) => format!("no institution with ID {id}").into(),
            None => "there are no active linked institutions".into(),
        });
    }

    Ok(targets)
}
