// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::Session;
use potluck::{EXIT_GENERIC, InstallOptions};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v raises the default level
    let default_level = match cli.global.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

/// Exit code of the library error behind `e`, if there is one
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<potluck::Error>()
        .map_or(EXIT_GENERIC, potluck::Error::exit_code)
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        println!("potluck v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'potluck --help' for usage information");
        return Ok(());
    };
    let session = Session::load(&cli.global)?;

    match command {
        Commands::Install {
            recipes,
            force,
            skip_test,
            strict_test,
            jobs,
            fail_fast,
            keep_builddir,
            progress,
        } => {
            let opts = InstallOptions {
                force,
                skip_test,
                strict_test,
                fail_fast,
            };
            commands::cmd_install(session, &recipes, opts, jobs, keep_builddir, progress)
        }
        Commands::Test { recipe } => commands::cmd_test(session, &recipe),
        Commands::Uninstall { name } => commands::cmd_uninstall(session, &name),
        Commands::Fetch { recipes, progress } => commands::cmd_fetch(session, &recipes, progress),
        Commands::Check { recipes, deps } => commands::cmd_check(session, &recipes, deps),
        Commands::List { available } => commands::cmd_list(session, available),
        Commands::Info { recipe, files } => commands::cmd_info(session, &recipe, files),
        Commands::Init => commands::cmd_init(session),
    }
}
