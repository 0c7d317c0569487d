// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use reelgrab_runtime::cli::{self, discover_cmd::DiscoverOptions, output};
use reelgrab_runtime::config::DiscoveryConfig;
use reelgrab_runtime::discovery::UrlKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reelgrab",
    about = "Reelgrab: recover images and streamed videos from social-commerce feeds",
    version,
    after_help = "Run 'reelgrab <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and save the media behind a feed or post URL
    Discover {
        /// Feed (profile) or single-post URL
        url: String,
        /// Maximum number of feed items to process
        #[arg(long)]
        max_items: Option<usize>,
        /// What the URL points at
        #[arg(long, value_enum, default_value_t = UrlKind::Profile)]
        kind: UrlKind,
        /// Leading feed cards to skip
        #[arg(long)]
        skip: Option<usize>,
        /// Output directory (default: ~/Downloads/reelgrab)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Time budget in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Report manifest URLs without remuxing them
        #[arg(long)]
        no_remux: bool,
    },
    /// Remux one streaming manifest into an MP4 file
    Remux {
        /// Manifest URL
        manifest_url: String,
        /// Output file
        output: PathBuf,
    },
    /// Run the HTTP download API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,
        /// Parent directory for task files (default: system temp dir)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all commands can check them
    if cli.json {
        std::env::set_var(output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_ENV, "1");
    }
    cli::init_tracing(cli.verbose, cli.log_json);

    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "reelgrab", &mut std::io::stdout());
        return Ok(());
    }

    let config = DiscoveryConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Discover {
            url,
            max_items,
            kind,
            skip,
            output,
            timeout,
            no_remux,
        } => {
            let options = DiscoverOptions {
                url,
                max_items,
                kind,
                skip,
                output,
                timeout_secs: timeout,
                no_remux,
            };
            cli::discover_cmd::run(options, config).await
        }
        Commands::Remux {
            manifest_url,
            output,
        } => cli::remux_cmd::run(&manifest_url, &output, &config).await,
        Commands::Serve {
            host,
            port,
            work_dir,
        } => cli::serve_cmd::run(&host, port, work_dir, config).await,
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::Completions { .. } => Ok(()),
    }
}
