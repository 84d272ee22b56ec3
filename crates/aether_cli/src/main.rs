//! Aether CLI
//!
//! Runs an aether server and talks to one from the shell.
//!
//! # Commands
//!
//! - `serve` - Run a server
//! - `assign` - Replace the subtree at a URL's dimension
//! - `clear` - Clear the subtree at a URL's dimension
//! - `synch` - Wait for the server to apply everything queued so far
//! - `watch` - Join at a URL's dimension and print every change

mod commands;
mod json;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Aether server and client tools.
#[derive(Parser)]
#[command(name = "aether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:6969")]
        bind: SocketAddr,

        /// Wire format (binary, text)
        #[arg(short, long, default_value = "binary")]
        format: String,

        /// Folded operations after which the accumulation is applied
        #[arg(short, long, default_value = "64")]
        cap: usize,

        /// Keep sessions alive after non-fatal errors
        #[arg(short, long)]
        tolerant: bool,

        /// Participant limit
        #[arg(long, default_value = "65536")]
        max_participants: usize,

        /// Seconds between statistics log lines
        #[arg(long, default_value = "30")]
        stats_interval: u64,
    },

    /// Replace the subtree at the URL's dimension
    Assign {
        /// Server URL, e.g. aep://localhost/house:kitchen
        url: String,

        /// New value as JSON
        value: String,

        /// Return once queued instead of waiting for the write to apply
        #[arg(long)]
        no_wait: bool,
    },

    /// Clear the subtree at the URL's dimension
    Clear {
        /// Server URL
        url: String,

        /// Return once queued instead of waiting for the write to apply
        #[arg(long)]
        no_wait: bool,
    },

    /// Wait for the server to apply everything queued so far
    Synch {
        /// Server URL
        url: String,
    },

    /// Join at the URL's dimension and print every change
    Watch {
        /// Server URL
        url: String,

        /// Stop after this many changes
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            format,
            cap,
            tolerant,
            max_participants,
            stats_interval,
        } => {
            let options = commands::serve::ServeOptions {
                bind,
                format: format.parse()?,
                cap,
                tolerant,
                max_participants,
                stats_interval,
            };
            commands::serve::run(&options)?;
        }
        Commands::Assign {
            url,
            value,
            no_wait,
        } => {
            let value = json::value_from_str(&value)?;
            commands::write::assign(&url, value, !no_wait)?;
        }
        Commands::Clear { url, no_wait } => {
            commands::write::clear(&url, !no_wait)?;
        }
        Commands::Synch { url } => {
            commands::synch::run(&url)?;
        }
        Commands::Watch { url, count, format } => {
            commands::watch::run(&url, count, &format)?;
        }
        Commands::Version => {
            println!("Aether CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Default port {}", aether_protocol::DEFAULT_PORT);
        }
    }

    Ok(())
}
