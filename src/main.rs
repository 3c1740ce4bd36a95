/* src/main.rs */

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use fancy_log::{LogLevel, log, set_log_level};
use simple_nsupdate::{DnsRecord, NsUpdater, RecordType, Settings};
use std::env;

#[derive(Parser)]
#[command(name = "simple-nsupdate", version, about = "Signed RFC 2136 updates for one zone")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List records of one type at a name
    Get {
        name: String,
        #[arg(value_name = "TYPE")]
        rtype: RecordType,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a record
    Create {
        name: String,
        #[arg(value_name = "TYPE")]
        rtype: RecordType,
        value: String,
        /// Defaults to the zone TTL
        #[arg(long)]
        ttl: Option<u32>,
    },
    /// Remove exactly one record
    Delete {
        name: String,
        #[arg(value_name = "TYPE")]
        rtype: RecordType,
        value: String,
    },
    /// Swap one value for another in a single transaction
    Replace {
        name: String,
        #[arg(value_name = "TYPE")]
        rtype: RecordType,
        old: String,
        new: String,
        #[arg(long)]
        ttl: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Initialization ---
    dotenv().ok();
    let level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let log_level = match level.as_str() {
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    };
    set_log_level(log_level);
    let cli = Cli::parse();

    // --- Load Config ---
    let context = match Settings::load().and_then(Settings::into_context) {
        Ok(ctx) => ctx,
        Err(e) => {
            log(LogLevel::Error, &format!("Failed to load config: {}", e));
            return Err(e.into());
        }
    };
    log(
        LogLevel::Debug,
        &format!(
            "Zone {} via {} ({}, key {})",
            context.zone(),
            context.server(),
            context.protocol(),
            context.key().name()
        ),
    );
    let updater = NsUpdater::new(context);

    // --- Run Command ---
    match cli.command {
        Command::Get { name, rtype, json } => {
            let records = updater.get(&name, rtype).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!("{}", record);
                }
            }
        }
        Command::Create {
            name,
            rtype,
            value,
            ttl,
        } => {
            let record = DnsRecord::new(&name, rtype, &value, ttl)?;
            updater.create(&record).await?;
        }
        Command::Delete { name, rtype, value } => {
            let record = DnsRecord::new(&name, rtype, &value, None)?;
            updater.delete(&record).await?;
        }
        Command::Replace {
            name,
            rtype,
            old,
            new,
            ttl,
        } => {
            let old = DnsRecord::new(&name, rtype, &old, None)?;
            let new = DnsRecord::new(&name, rtype, &new, ttl)?;
            updater.replace(&old, &new).await?;
        }
    }

    Ok(())
}
