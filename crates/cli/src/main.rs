//! Atelier CLI - sign in and manage the shopping cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password can also come from ATELIER_PASSWORD)
//! atelier login -e layla@maison.example -p '...'
//!
//! # Show who is signed in
//! atelier whoami
//!
//! # Work with the cart
//! atelier cart add oud-royal --quantity 2
//! atelier cart update oud-royal 3
//! atelier cart remove oud-royal
//! atelier cart show
//! atelier cart clear
//!
//! # Sign out
//! atelier logout
//! ```
//!
//! # Environment Variables
//!
//! - `ATELIER_API_URL` - Storefront API base URL (required)
//! - `ATELIER_DATA_DIR` - Where session and cart state is kept (default `.atelier`)
//! - `ATELIER_REQUEST_TIMEOUT_SECS` - Per-request timeout (default 10)
//! - `SENTRY_DSN` - Enables error reporting when set

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_client::{ClientConfig, FileStorage, HttpApi, StoreOptions, Storefront};

mod commands;
mod error;

use error::CliError;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Atelier storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "ATELIER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the local cart
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage the shopping cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents and total
    Show,
    /// Add a product, summing with an existing line
    Add {
        /// Product identifier
        product: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1, allow_hyphen_values = true)]
        quantity: i64,
    },
    /// Set a line's quantity (0 removes it)
    Update {
        /// Product identifier
        product: String,

        /// New quantity
        #[arg(allow_hyphen_values = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Product identifier
        product: String,
    },
    /// Empty the cart
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_client=info,atelier_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be up before the tracing layer that feeds it
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, &config).await {
        e.report();
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), CliError> {
    let api = HttpApi::new(config)?;
    let storage = Arc::new(FileStorage::open(&config.data_dir)?);
    let storefront = Storefront::new(api, storage, StoreOptions::from(config));

    let outcome = storefront.start().await;
    tracing::debug!(?outcome, "Session bootstrap finished");

    match cli.command {
        Commands::Login { email, password } => {
            commands::session::login(&storefront, &email, password).await?;
        }
        Commands::Logout => commands::session::logout(&storefront).await,
        Commands::Whoami => commands::session::whoami(&storefront),
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront).await?,
            CartAction::Add { product, quantity } => {
                commands::cart::add(&storefront, &product, quantity).await?;
            }
            CartAction::Update { product, quantity } => {
                commands::cart::update(&storefront, &product, quantity).await?;
            }
            CartAction::Remove { product } => commands::cart::remove(&storefront, &product).await?,
            CartAction::Clear => commands::cart::clear(&storefront).await?,
        },
    }
    Ok(())
}
