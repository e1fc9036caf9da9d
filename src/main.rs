mod api;
mod cli;
mod commands;
mod config;
mod export;
mod models;
mod output;
mod resolve;

use anyhow::Result;
use clap::Parser;
use log::warn;

use api::auth::TokenSource;
use cli::args::{Cli, Commands};
use cli::context::RunContext;
use commands::patients::PatientSearch;
use config::Settings;

fn main() -> Result<()> {
    setup_broken_pipe_handling();
    let cli = Cli::parse();
    // .env may set HCHB_LOG, so load it before the logger
    let dotenv = config::load_dotenv();
    init_logging(cli.verbose);
    if let Err(e) = dotenv {
        warn!("Failed to load .env file: {}", e);
    }

    let settings = Settings::from_env()?;
    let ctx = RunContext::from_args(
        cli.json,
        cli.no_color,
        cli.utc,
        cli.output_dir.as_deref(),
        settings,
    )?;

    let token = cli.token.as_deref();
    match &cli.command {
        Commands::Patients {
            filters,
            page_size,
            max_pages,
            include_inactive,
            no_export,
        } => {
            let search = PatientSearch {
                query: filters.to_query(),
                page_size: *page_size,
                max_pages: *max_pages,
                include_inactive: *include_inactive,
                no_export: *no_export,
            };
            let mut client = commands::connect(&ctx, token)?;
            commands::patients::run(&mut client, &search, &ctx)?;
        }

        Commands::Patient { id, no_export } => {
            let mut client = commands::connect(&ctx, token)?;
            commands::patient::run(&mut client, id, *no_export, &ctx)?;
        }

        Commands::Payor {
            patient_id,
            no_export,
        } => {
            let mut client = commands::connect(&ctx, token)?;
            commands::payor::run(&mut client, patient_id.as_deref(), *no_export, &ctx)?;
        }

        // Only talks to the token endpoint, so no base URL is needed
        Commands::Token => {
            let mut tokens = api::resolve_token_source(token, &ctx.settings)?;
            println!("{}", tokens.token()?);
        }
    }

    Ok(())
}

/// Initialize logging based on the `--verbose` flag or `HCHB_LOG` env var.
///
/// - `HCHB_LOG` env var: full filter control (e.g. `HCHB_LOG=hchb_export::api=trace`)
/// - `--verbose`: sets `hchb_export` crate to `Debug` level
/// - Otherwise: `Warn` level only (effectively silent)
fn init_logging(verbose: bool) {
    let env_var = std::env::var("HCHB_LOG").ok();

    let mut builder = env_logger::Builder::new();
    builder.format_target(true);
    builder.format_module_path(false);

    if let Some(ref filter) = env_var {
        builder.parse_filters(filter);
    } else if verbose {
        builder.filter_module("hchb_export", log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Warn);
    }

    builder.init();
}

/// Handle broken pipe gracefully instead of panicking.
///
/// When output is piped to a process that exits early (e.g., `hchb-export patients --json | head -1`),
/// Rust's `println!` panics because the runtime sets SIGPIPE to SIG_IGN. This function:
/// - On Unix: resets SIGPIPE to default behavior so the OS terminates the process cleanly
/// - On all platforms: installs a panic hook that exits silently on stdout pipe failures,
///   as a fallback (and the primary handler on Windows where there's no SIGPIPE)
fn setup_broken_pipe_handling() {
    #[cfg(unix)]
    unsafe {
        // SIGPIPE = 13, SIG_DFL = 0 (POSIX constants, stable across all Unix platforms)
        unsafe extern "C" {
            fn signal(sig: i32, handler: usize) -> usize;
        }
        signal(13, 0);
    }

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info
            .payload()
            .downcast_ref::<String>()
            .map(|s| s.as_str())
            .or_else(|| info.payload().downcast_ref::<&str>().copied())
            .unwrap_or("");

        if msg.contains("failed printing to stdout") {
            std::process::exit(0);
        }

        default_hook(info);
    }));
}
