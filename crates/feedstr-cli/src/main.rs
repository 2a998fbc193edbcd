use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use feedstr_cli::cli::config::load_feed_file;
use feedstr_cli::cli::{init_tracing, run_feed, run_feeds, run_note, run_thread, CliConfig, OutputFormat};
use feedstr_core::nostr::{NostrRelayPool, RelayPool};

#[derive(Parser)]
#[command(name = "feedstr")]
#[command(about = "Rule-based nostr feeds from the command line")]
struct Cli {
    /// Path to JSON config file (relays, pubkey, engine settings)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// User whose follow list drives the feed (npub or hex)
    #[arg(long, short = 'p', global = true)]
    pubkey: Option<String>,

    /// Relay URL; may be given multiple times
    #[arg(long = "relay", short = 'r', global = true)]
    relays: Vec<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a feed from a saved definition file
    Feed {
        /// Feed definition JSON ({"version":1,"name":...,"rules":[...]})
        #[arg(long, short = 'f')]
        feed: PathBuf,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// List the user's saved feeds
    Feeds,

    /// Show the ancestors of a note
    Thread {
        /// Note id (hex or note1...)
        note_id: String,
    },

    /// Show a note with replies, likes and reposts
    Note {
        /// Note id (hex or note1...)
        note_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut config = CliConfig::resolve(cli.config.as_deref())?;
    config.apply_overrides(cli.pubkey, cli.relays);
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let pool: Arc<dyn RelayPool> =
        Arc::new(NostrRelayPool::connect(&config.relays, None, config.engine.eose_timeout()).await?);

    let output = match cli.command {
        Commands::Feed { feed, pages } => {
            let feed = load_feed_file(&feed)?;
            run_feed(pool, &config, feed, pages, format).await?
        }
        Commands::Feeds => run_feeds(pool, &config, format).await?,
        Commands::Thread { note_id } => run_thread(pool, &config, &note_id, format).await?,
        Commands::Note { note_id } => run_note(pool, &config, &note_id, format).await?,
    };

    println!("{}", output);
    Ok(())
}
