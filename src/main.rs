//! scormrelay CLI - relays SCORM 1.2 sessions across an origin boundary.
//!
//! This is the main binary entry point. See the `scormrelay` library for
//! the core functionality.

use anyhow::Result;
use mimalloc::MiMalloc;
use scormrelay::commands;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

const DEFAULT_WRAPPER_URL: &str = "https://client.example/scormremote/launch?attempt=1";
const DEFAULT_DATA_SOURCE: &str =
    "https://moodle.example/pluginfile.php/481/mod_scormremote/content/0/index.html";

// CLI
#[derive(Parser)]
#[command(name = "scormrelay")]
#[command(version)]
#[command(about = "Cross-origin SCORM 1.2 relay, simulated end to end")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full relay session against a fixture LMS
    Simulate {
        /// Fixture file: a JSON object of element-to-value strings
        #[arg(long)]
        fixture: PathBuf,
        /// Where completion POSTs go (log-only when omitted)
        #[arg(long)]
        completion_url: Option<Url>,
        /// Script file driving the content-side API
        #[arg(long)]
        script: Option<PathBuf>,
        /// Wrapper page URL on the client origin
        #[arg(long, default_value = DEFAULT_WRAPPER_URL)]
        wrapper_url: Url,
        /// Package entry point on the serving origin
        #[arg(long, default_value = DEFAULT_DATA_SOURCE)]
        data_source: Url,
    },
    /// Harvest and print the data model a session would hand to content
    Harvest {
        /// Fixture file: a JSON object of element-to-value strings
        #[arg(long)]
        fixture: PathBuf,
        /// Wrapper page URL on the client origin
        #[arg(long, default_value = DEFAULT_WRAPPER_URL)]
        wrapper_url: Url,
        /// Package entry point on the serving origin
        #[arg(long, default_value = DEFAULT_DATA_SOURCE)]
        data_source: Url,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            fixture,
            completion_url,
            script,
            wrapper_url,
            data_source,
        } => {
            commands::simulate::run(commands::SessionArgs {
                fixture,
                completion_url,
                script,
                wrapper_url,
                data_source,
            })?;
        }
        Commands::Harvest {
            fixture,
            wrapper_url,
            data_source,
        } => {
            commands::harvest::run(&fixture, &wrapper_url, &data_source)?;
        }
    }

    Ok(())
}
