//! CLI smoke entry point.
//!
//! # Responsibility
//! - Resolve a store configuration and open the selected backend.
//! - Run the account scenario end to end through a unit of work.
//!
//! # Invariants
//! - Output is deterministic for a given backend.

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use specstore_core::spec::filter;
use specstore_core::{
    core_version, default_log_level, init_logging, open_session, Backend, Field, Fields, Model,
    Money, NativeSession, Repository, StoreConfig,
};
use std::path::PathBuf;

/// Specstore - storage-agnostic repositories
#[derive(Parser)]
#[command(name = "specstore")]
#[command(about = "Runs the account scenario against a configured backend")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend override: relational, document, key_value or memory
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Absolute directory for rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level used when `--log-dir` or `log.dir` is set
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    id: String,
    username: String,
    email: String,
    balance: Money,
}

impl Model for Account {
    const NAME: &'static str = "users";
    const FIELDS: &'static [Field] = &[
        Field::text("id"),
        Field::text("username"),
        Field::text("email"),
        Field::integer("balance"),
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = StoreConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(backend) = cli.backend {
        config = override_backend(config, backend);
    }

    let log_dir = cli.log_dir.or_else(|| config.log.dir.clone().map(PathBuf::from));
    if let Some(dir) = log_dir {
        let level = cli
            .log_level
            .or_else(|| config.log.level.clone())
            .unwrap_or_else(|| default_log_level().to_string());
        init_logging(&level, &dir).map_err(|err| anyhow::anyhow!("starting logger: {err}"))?;
    }

    println!("specstore_core version={}", core_version());
    println!("backend={}", config.backend);

    let session = open_session(&config).context("opening session")?;
    let account = run_account_scenario(&session)?;
    println!(
        "account id={} username={} balance={}",
        account.id, account.username, account.balance
    );
    Ok(())
}

/// Switches backend, filling in-memory parameters the file did not provide.
fn override_backend(config: StoreConfig, backend: Backend) -> StoreConfig {
    let defaults = StoreConfig::in_memory(backend);
    StoreConfig {
        backend,
        relational: specstore_core::config::RelationalConfig {
            path: config.relational.path.or(defaults.relational.path),
        },
        document: specstore_core::config::DocumentConfig {
            database: config.document.database.or(defaults.document.database),
        },
        ..config
    }
}

/// Creates `u1` with a zero balance, then credits 1.00 in a second unit of work.
fn run_account_scenario(session: &NativeSession) -> anyhow::Result<Account> {
    session.ensure_model::<Account>()?;

    session.unit_of_work::<Account>()?.run(|repo| {
        repo.save(&Account {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            balance: Money::ZERO,
        })?;
        repo.commit()
    })?;
    info!("event=scenario module=cli status=ok stage=create");

    session.unit_of_work::<Account>()?.run(|repo| {
        let mut account = repo.get(&[filter("id", "u1")])?;
        let credit: Fields = [("balance".to_string(), json!(100))].into_iter().collect();
        repo.update(Some(&mut account), &[], &credit)?;
        repo.commit()
    })?;
    info!("event=scenario module=cli status=ok stage=credit");

    Ok(session
        .repository::<Account>()?
        .get(&[filter("id", "u1")])?)
}
