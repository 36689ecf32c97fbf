//! Board Coupon CLI - Play-side operations from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in with the parameters an external login page would append
//! bc-cli login "https://game.test/index.html?lineUserId=U123&lineDisplayName=Mika"
//!
//! # Resolve identity and run the registration gate
//! bc-cli check
//!
//! # Register the logged-in user
//! bc-cli register --nickname Mika --county 臺北市
//!
//! # Browse shops and board cells
//! bc-cli shops --category 美食
//! bc-cli cell 0 1 2
//!
//! # Coupon lifecycle
//! bc-cli coupon save 美味咖啡廳
//! bc-cli coupon list
//! bc-cli coupon verify COUPON_1714000000000_ab12cd34
//! ```
//!
//! # Commands
//!
//! - `login`, `check`, `status`, `register`, `profile`, `reset` - Account
//! - `shops`, `cell` - Catalog and board
//! - `coupon` - Save, list, verify and abandon coupons
//!
//! Local state lives in a JSON file (`--store`, default `board-coupon.json`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use board_coupon_client::ClientConfig;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "bc-cli")]
#[command(author, version, about = "Board Coupon terminal client")]
struct Cli {
    /// Local state file
    #[arg(long, global = true, default_value = "board-coupon.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in from a page URL carrying login query parameters
    Login {
        /// Page URL with `lineUserId` (and optionally `lineDisplayName`,
        /// `linePictureUrl`)
        url: String,
    },
    /// Resolve identity and enforce registration
    Check,
    /// Show locally stored state
    Status,
    /// Register the logged-in user
    Register {
        /// In-game nickname
        #[arg(short, long)]
        nickname: String,

        /// County of residence
        #[arg(short, long)]
        county: String,

        /// Free-text status message
        #[arg(short, long, default_value = "")]
        status_message: String,
    },
    /// Change profile fields
    Profile {
        #[arg(long)]
        nickname: Option<String>,

        #[arg(long)]
        county: Option<String>,

        #[arg(long)]
        level: Option<u32>,

        #[arg(long)]
        coins: Option<u64>,
    },
    /// List shops
    Shops {
        /// Only shops in this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Show board cell configuration
    Cell {
        /// Cell indices
        #[arg(required = true)]
        indices: Vec<u32>,
    },
    /// Manage coupons
    Coupon {
        #[command(subcommand)]
        action: CouponAction,
    },
    /// Delete all local data
    Reset,
}

#[derive(Subcommand)]
enum CouponAction {
    /// Save a coupon for a shop
    Save {
        /// Shop name as listed by `shops`
        shop: String,
    },
    /// List coupons
    List,
    /// Redeem a coupon
    Verify {
        /// Coupon id
        coupon_id: String,
    },
    /// Give up a coupon
    Abandon {
        /// Coupon id
        coupon_id: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
///
/// Warnings are expected whenever the backend is offline, so they are kept as
/// breadcrumbs only.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration first (needed for Sentry init)
    let config = ClientConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "board_coupon_cli=info,board_coupon_client=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), commands::CommandError> {
    let session = commands::open_session(config, &cli.store)?;

    match cli.command {
        Commands::Login { url } => commands::account::login(&session, &url)?,
        Commands::Check => commands::account::check(&session).await,
        Commands::Status => commands::account::status(&session),
        Commands::Register {
            nickname,
            county,
            status_message,
        } => commands::account::register(&session, nickname, county, status_message).await?,
        Commands::Profile {
            nickname,
            county,
            level,
            coins,
        } => commands::account::update_profile(&session, nickname, county, level, coins)?,
        Commands::Shops { category } => commands::board::shops(&session, category.as_deref()).await,
        Commands::Cell { indices } => commands::board::cells(&session, &indices).await,
        Commands::Coupon { action } => match action {
            CouponAction::Save { shop } => commands::coupon::save(&session, &shop).await?,
            CouponAction::List => commands::coupon::list(&session).await,
            CouponAction::Verify { coupon_id } => {
                commands::coupon::verify(&session, &coupon_id).await?;
            }
            CouponAction::Abandon { coupon_id } => {
                commands::coupon::abandon(&session, &coupon_id).await?;
            }
        },
        Commands::Reset => commands::account::reset(&session)?,
    }
    Ok(())
}
