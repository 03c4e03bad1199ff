use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;

use wormhole::DEFAULT_RELAY_ADDR;

#[derive(Parser)]
#[command(name = "wormhole")]
#[command(about = "Secure file and text transfer through a dumb TCP relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file or text
    Send {
        /// Path to the file to send
        path: Option<String>,

        /// Send this text instead of a file
        #[arg(short, long, conflicts_with = "path")]
        text: Option<String>,

        /// Pairing code (generated if omitted)
        #[arg(short, long)]
        code: Option<String>,

        /// Relay address, e.g. tcp://host:9000
        #[arg(short, long, default_value = DEFAULT_RELAY_ADDR)]
        relay: String,
    },
    /// Receive a file or text
    Receive {
        /// Pairing code from the sender (prompted if omitted)
        #[arg(short, long)]
        code: Option<String>,

        /// Output directory for received files
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Relay address, e.g. tcp://host:9000
        #[arg(short, long, default_value = DEFAULT_RELAY_ADDR)]
        relay: String,
    },
    /// Run the relay server
    Relay {
        /// Port to listen on (default: 9000, or CLI_RELAY_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Pairing timeout, e.g. 60s (default: 60s, or CLI_RELAY_TIMEOUT)
        #[arg(short, long)]
        timeout: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Configure logging based on verbose flag
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::info!("Verbose logging enabled");
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    match cli.command {
        Commands::Send {
            path,
            text,
            code,
            relay,
        } => {
            wormhole::commands::send::run(&relay, code, path, text).await?;
        }
        Commands::Receive { code, out, relay } => {
            wormhole::commands::receive::run(&relay, code, &out).await?;
        }
        Commands::Relay { port, timeout } => {
            wormhole::commands::relay::run(port, timeout).await?;
        }
    }

    Ok(())
}
