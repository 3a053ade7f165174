use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use slx_audit::VerifyResult;
use slx_db::PgStore;

mod commands;

use commands::post::PostMode;

#[derive(Parser)]
#[command(name = "slx")]
#[command(about = "Sales ledger reconciliation and posting CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> site...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Load a JSON feed file (sales, movements, payments, fees) into the store
    Ingest {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Feed file path
        feed: String,
    },

    /// Post every unposted order dated in [from, to]
    Post {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// First order date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last order date (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Also append every ledger call to a hash-chained JSONL file
        #[arg(long = "audit-jsonl")]
        audit_jsonl: Option<PathBuf>,
    },

    /// Re-post orders whose tracked state is FAILED
    RetryFailed {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long = "audit-jsonl")]
        audit_jsonl: Option<PathBuf>,
    },

    /// Print the tracked posting state of an order
    OrderStatus {
        order_code: String,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when sales have already been posted unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB that already holds posted sales.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a JSONL audit log
    Verify {
        path: PathBuf,
    },

    /// Print the DB audit rows of one order as JSON lines
    Show {
        order_code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Best-effort: a missing .env.local is not an error.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = commands::connect_db_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = slx_db::status(&pool).await?;
                    println!("db_ok={} has_sales_table={}", s.ok, s.has_sales_table);
                }
                DbCmd::Migrate { yes } => {
                    let n = slx_db::count_posted_sales(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: database holds {} posted sale(s). Re-run with: `slx db migrate --yes`",
                            n
                        );
                    }
                    slx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = slx_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
        Commands::Ingest { config_paths, feed } => {
            commands::ingest::run_ingest(&config_paths, &feed).await?;
        }
        Commands::Post {
            config_paths,
            from,
            to,
            audit_jsonl,
        } => {
            commands::post::run_post(&config_paths, from, to, audit_jsonl, PostMode::Range).await?;
        }
        Commands::RetryFailed {
            config_paths,
            from,
            to,
            audit_jsonl,
        } => {
            commands::post::run_post(&config_paths, from, to, audit_jsonl, PostMode::RetryFailed)
                .await?;
        }
        Commands::OrderStatus { order_code } => {
            let store = PgStore::new(commands::connect_db_from_env().await?);
            let state = store.tracked_state(&order_code).await?;
            println!(
                "order_code={} state={}",
                order_code,
                state.as_deref().unwrap_or("UNTRACKED")
            );
        }
        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match slx_audit::verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("hash_chain=valid lines={}", lines);
                }
                VerifyResult::Broken { line, reason } => {
                    anyhow::bail!("hash_chain=broken line={} reason={}", line, reason);
                }
            },
            AuditCmd::Show { order_code } => {
                let store = PgStore::new(commands::connect_db_from_env().await?);
                for rec in store.audit_for_order(&order_code).await? {
                    println!("{}", serde_json::to_string(&rec)?);
                }
            }
        },
    }

    Ok(())
}
