//! # stickies-notion CLI
//!
//! Imports macOS Stickies notes into a Notion database, skipping notes that
//! were already imported.
//!
//! ## Usage
//!
//! ```bash
//! stickies-notion --config ./stickies-notion.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stickies-notion check` | Verify the token, database access and schema |
//! | `stickies-notion import` | Import notes from the detected source |
//! | `stickies-notion import --print-source` | Show which source would be read |
//!
//! ## Examples
//!
//! ```bash
//! # Credentials come from the environment or a .env file
//! export NOTION_TOKEN=secret_xxx NOTION_DB_ID=0123456789abcdef0123456789abcdef
//!
//! stickies-notion check
//! stickies-notion import --dry-run --limit 10
//! stickies-notion import --mode rtf-dir --tz Europe/Berlin
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stickies_notion::check::run_check;
use stickies_notion::config::{load_config, Overrides};
use stickies_notion::convert::select_converter;
use stickies_notion::ingest::{run_import, ImportOptions};
use stickies_notion::locator::{locate, print_sources, DefaultPaths, SourceMode};
use stickies_notion::notion::NotionClient;

/// Import macOS Stickies into a Notion database.
///
/// Notion credentials are read from `NOTION_TOKEN` and `NOTION_DB_ID`
/// (a `.env` file in the working directory is loaded first).
#[derive(Parser)]
#[command(
    name = "stickies-notion",
    about = "Import macOS Stickies notes into a Notion database without duplicates",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional.
    #[arg(long, global = true, default_value = "./stickies-notion.toml")]
    config: PathBuf,

    /// Debug logging on stderr. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify Notion connectivity and the database schema.
    Check,

    /// Import notes into the Notion database.
    ///
    /// Each note is fingerprinted from its text and color; notes whose
    /// fingerprint already exists in the database are skipped, so the
    /// command can be re-run safely.
    Import {
        /// Source mode: `auto`, `db` (legacy database), or `rtf-dir`
        /// (`.rtfd` bundles).
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Legacy database file.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Directory of `.rtfd` bundles.
        #[arg(long)]
        rtf_dir: Option<PathBuf>,

        /// Saved-state descriptor holding bundle colors.
        #[arg(long)]
        state_path: Option<PathBuf>,

        /// Classify notes and print the plan without creating pages.
        #[arg(long)]
        dry_run: bool,

        /// Process only the first N notes.
        #[arg(long)]
        limit: Option<usize>,

        /// IANA timezone for naive timestamps (e.g. `America/Chicago`).
        #[arg(long)]
        tz: Option<String>,

        /// Print the resolved source and exit.
        #[arg(long)]
        print_source: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = match &cli.command {
        Commands::Import {
            db_path,
            rtf_dir,
            state_path,
            tz,
            ..
        } => Overrides {
            timezone: tz.clone(),
            db_path: db_path.clone(),
            rtf_dir: rtf_dir.clone(),
            state_path: state_path.clone(),
        },
        Commands::Check => Overrides::default(),
    };
    let cfg = load_config(&cli.config, &overrides)?;

    match cli.command {
        Commands::Check => {
            let client = NotionClient::from_config(&cfg.notion)?;
            run_check(&client).await?;
        }
        Commands::Import {
            mode,
            dry_run,
            limit,
            print_source,
            ..
        } => {
            let mode = SourceMode::parse(&mode)?;
            let defaults = DefaultPaths::system();

            if print_source {
                let found = locate(mode, &cfg.sources, &defaults)?;
                print_sources(&found);
                return Ok(());
            }

            let client = NotionClient::from_config(&cfg.notion)?;
            let converter = select_converter(&cfg.converter).await?;
            let options = ImportOptions {
                mode,
                dry_run,
                limit,
            };
            run_import(&cfg, &options, &defaults, &client, converter.as_ref()).await?;
        }
    }

    Ok(())
}
