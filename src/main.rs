use atm_core::application::orchestrator::{AtmTransactionOrchestrator, Collaborators};
use atm_core::application::registration::RegistrationService;
use atm_core::config::AtmConfig;
use atm_core::domain::clock::{ClockRef, SystemClock};
use atm_core::domain::ports::{Stores, TokenIssuerRef};
use atm_core::infrastructure::in_memory::InMemoryStore;
use atm_core::infrastructure::security::{Argon2PinHasher, JwtTokenIssuer, SessionOwnership};
use atm_core::interfaces::csv::command_reader::CommandReader;
use atm_core::interfaces::script::ScriptRunner;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// ATM command script (CSV)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Session token signing secret. Overrides ATM_TOKEN_SECRET.
    #[arg(long)]
    token_secret: Option<String>,
}

fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store =
                atm_core::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
            Ok(Stores::from_backend(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => Err(miette::miette!(
            "cannot open {}: built without the storage-rocksdb feature",
            path.display()
        )),
        None => Ok(Stores::from_backend(InMemoryStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AtmConfig::from_env().into_diagnostic()?;
    if let Some(secret) = cli.token_secret {
        config.token_secret = Some(secret);
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = Some(db_path);
    }

    let stores = open_stores(config.db_path.as_deref())?;
    let clock: ClockRef = Arc::new(SystemClock);
    let tokens: TokenIssuerRef = Arc::new(JwtTokenIssuer::new(
        config.token_secret().into_diagnostic()?,
        config.token_ttl_seconds,
        clock.clone(),
    ));
    let collaborators = Collaborators {
        hasher: Arc::new(Argon2PinHasher::new()),
        tokens: tokens.clone(),
        ownership: Arc::new(SessionOwnership),
        clock,
    };
    let registration = RegistrationService::new(
        stores.clone(),
        collaborators.hasher.clone(),
        collaborators.clock.clone(),
    );
    let atm = AtmTransactionOrchestrator::new(stores, collaborators)
        .with_conflict_retries(config.conflict_retries);
    let mut runner = ScriptRunner::new(atm, registration, tokens);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in reader.commands() {
        match row {
            Ok(row) => {
                let line = runner.execute(row).await;
                serde_json::to_writer(&mut out, &line).into_diagnostic()?;
                writeln!(out).into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }
    out.flush().into_diagnostic()?;

    Ok(())
}
