use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tradinta::config::Config;
use tradinta::jobs::{recompute_manufacturer_ratings, verify_ledger};
use tradinta::models::CreateShortlinkRequest;
use tradinta::redirect::links::create_shortlink;
use tradinta::storage::{self, Storage};

#[derive(Parser)]
#[command(name = "tradinta-admin")]
#[command(about = "Tradinta operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute every ledger event hash and report mismatches
    VerifyLedger {
        /// Only check this user's events
        #[arg(long)]
        user: Option<String>,
    },
    /// Recompute manufacturer ratings from their products
    RecomputeRatings,
    /// Create a shortlink
    CreateShortlink {
        /// Absolute http(s) URL or site-relative path
        destination: String,
        #[arg(long)]
        partner: Option<String>,
        #[arg(long)]
        campaign: Option<String>,
        /// Use this code instead of a generated one
        #[arg(long)]
        code: Option<String>,
    },
    /// Read a runtime setting
    GetSetting { key: String },
    /// Write a runtime setting
    SetSetting { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    if config.service_account.is_none() {
        bail!("SERVICE_ACCOUNT_KEY is missing or unusable");
    }

    let storage = storage::open(&config).await;

    match cli.command {
        Commands::VerifyLedger { user } => {
            let audit = verify_ledger(storage.as_ref(), user.as_deref()).await?;
            println!("Checked {} ledger events", audit.checked);
            if audit.is_clean() {
                println!("✓ All event hashes match");
            } else {
                for event_id in &audit.tampered {
                    println!("⚠ Hash mismatch: {}", event_id);
                }
                for event_id in &audit.unreadable {
                    println!("⚠ Unreadable metadata: {}", event_id);
                }
                bail!(
                    "{} tampered and {} unreadable events",
                    audit.tampered.len(),
                    audit.unreadable.len()
                );
            }
        }
        Commands::RecomputeRatings => {
            let report = recompute_manufacturer_ratings(storage.as_ref()).await?;
            println!(
                "✓ Recomputed {} manufacturers ({} updated)",
                report.manufacturers, report.updated
            );
        }
        Commands::CreateShortlink {
            destination,
            partner,
            campaign,
            code,
        } => {
            let request = CreateShortlinkRequest {
                destination_url: destination,
                partner_id: partner,
                campaign,
                custom_code: code,
            };
            let created = create_shortlink(storage.as_ref(), request).await?;
            println!("✓ Created shortlink /l/{}", created.id);
        }
        Commands::GetSetting { key } => match storage.get_setting(&key).await? {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{} is not set", key),
        },
        Commands::SetSetting { key, value } => {
            storage.put_setting(&key, &value).await?;
            println!("✓ Set {} = {}", key, value);
        }
    }

    Ok(())
}
