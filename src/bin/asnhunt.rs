#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use asnhunt::sources::CancelToken;
use asnhunt::*;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Level;

mod commands;

use commands::collect::CollectArgs;
use commands::compare::CompareArgs;
use commands::config::ConfigArgs;
use commands::prefixes::PrefixesArgs;
use commands::search::SearchArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.asnhunt/asnhunt.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty, csv, txt
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the ASNs registered to an organization
    Search(SearchArgs),

    /// Find an organization's ASNs and collect every prefix they announce
    Collect(CollectArgs),

    /// Collect the prefixes announced by the given ASNs
    Prefixes(PrefixesArgs),

    /// Compare two saved snapshots
    Compare(CompareArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Cancel `cancel` on the first Ctrl-C so that no new requests are issued;
/// a second Ctrl-C exits immediately
fn install_interrupt_handler(cancel: CancelToken) {
    let interrupts = AtomicUsize::new(0);
    let installed = ctrlc::set_handler(move || {
        if interrupts.fetch_add(1, Ordering::SeqCst) > 0 {
            std::process::exit(130);
        }
        eprintln!("\ninterrupted, waiting for requests in flight (Ctrl-C again to quit now)");
        cancel.cancel();
    });
    if let Err(e) = installed {
        eprintln!("WARNING: unable to install Ctrl-C handler: {}", e);
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match HunterConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level TRACE or higher.
            .with_max_level(Level::DEBUG)
            .init();
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let output_format = cli.format;
    match cli.command {
        Commands::Search(args) => commands::search::run(&config, args, output_format, cancel),
        Commands::Collect(args) => commands::collect::run(&config, args, output_format, cancel),
        Commands::Prefixes(args) => commands::prefixes::run(&config, args, output_format, cancel),
        Commands::Compare(args) => commands::compare::run(args, output_format),
        Commands::Config(args) => commands::config::run(&config, args, output_format),
    }
}
