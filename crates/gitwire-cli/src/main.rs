//! Gitwire CLI - inspect and speak the git smart protocol.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use crate::config::Config;

/// Gitwire - git wire protocol toolkit
#[derive(Parser, Debug)]
#[command(name = "gitwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a repository address and print its canonical URL
    Url {
        /// Address in any form git accepts
        address: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dump the pkt-lines of a captured stream
    PktDump {
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Decode the ACK/NAK lines of a captured upload-pack response
    Acks {
        /// Input file (default: stdin)
        file: Option<PathBuf>,
        /// The request was made with multi_ack or multi_ack_detailed
        #[arg(long)]
        multi_ack: bool,
    },

    /// List references in a remote repository
    LsRemote {
        /// Repository address
        address: String,
    },

    /// Fetch a packfile from a remote repository
    Fetch {
        /// Repository address
        address: String,
        /// References to fetch (default: all)
        refs: Vec<String>,
        /// Where to write the packfile
        #[arg(short, long, default_value = "fetched.pack")]
        output: PathBuf,
    },

    /// Show version information
    Version,
}

fn open_input(file: Option<PathBuf>) -> io::Result<Box<dyn Read>> {
    match file {
        Some(path) => Ok(Box::new(File::open(path)?)),
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gitwire={log_level},gitwire_transport={log_level},gitwire_protocol={log_level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let mut out = io::stdout().lock();
    let result = match cli.command {
        Commands::Url { address, json } => commands::url(&address, json, &mut out),
        Commands::PktDump { file } => open_input(file)
            .map_err(Into::into)
            .and_then(|input| commands::pkt_dump(input, &mut out)),
        Commands::Acks { file, multi_ack } => open_input(file)
            .map_err(Into::into)
            .and_then(|input| commands::acks(input, multi_ack, &mut out)),
        Commands::LsRemote { address } => commands::ls_remote(&address, &config, &mut out),
        Commands::Fetch {
            address,
            refs,
            output,
        } => commands::fetch(&address, &refs, &output, &config, &mut out),
        Commands::Version => {
            writeln!(out, "gitwire {}", env!("CARGO_PKG_VERSION")).map_err(Into::into)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
