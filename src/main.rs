//! fmpm - NVIDIA Fabric Manager partition manager
//!
//! A command-line tool for listing, activating and deactivating GPU
//! partitions through the Fabric Manager.

use clap::Parser;
use fmpm::cli::args::{generate_completions, print_help, Cli, Commands, OutputFormat};
use fmpm::commands;
use fmpm::config::{Config, ConfigBuilder};
use fmpm::error::{AppError, FabricError};
use fmpm::fabric;
use fmpm::status::ErrorCategory;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Run the appropriate command
    let result = run(&cli);

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let Some(command) = cli.resolved_command() else {
        print_help()?;
        return Ok(());
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if !command.needs_fabric() {
        return run_local(&command, cli.format.unwrap_or_default(), &mut out);
    }

    let config = ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_verbose(cli.verbose.then_some(true))
        .with_format(cli.format)
        .with_hostname(cli.hostname.clone())
        .with_unix_domain_socket(cli.unix_domain_socket.clone())
        .with_timeout(cli.timeout)
        .build()?;

    if config.general.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    fabric::init()?;
    let result = run_with_fabric(&command, &config, &mut out);
    if let Err(e) = fabric::shutdown() {
        log::warn!("failed to shutdown FabricManager: {}", e);
    }
    result
}

fn run_local<W: std::io::Write>(
    command: &Commands,
    format: OutputFormat,
    out: &mut W,
) -> Result<(), AppError> {
    match command {
        Commands::Version => commands::run_version(format, out),
        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn run_with_fabric<W: std::io::Write>(
    command: &Commands,
    config: &Config,
    out: &mut W,
) -> Result<(), AppError> {
    let library = fabric::global()?;
    let session = commands::connect(&library, &config.connection)?;

    let result = commands::execute(&session, command, config.general.format, out);

    if let Err(e) = session.disconnect() {
        log::warn!("failed to disconnect from FabricManager: {}", e);
    }
    result
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Fabric(FabricError::LibraryNotFound(_)) => {
            eprintln!();
            eprintln!("Hint: Make sure the NVIDIA Fabric Manager is installed.");
            eprintln!("      On Linux, install the nvidia-fabricmanager package.");
        }
        AppError::Connect { .. } => {
            eprintln!();
            eprintln!("Hint: Check that nvidia-fabricmanager is running and reachable.");
            eprintln!("      Use --hostname or --unix-domain-socket to select it.");
        }
        _ if err.fm_error().map(|e| e.category()) == Some(ErrorCategory::Partition) => {
            eprintln!();
            eprintln!("Hint: Run 'fmpm list' to see partition IDs and their state.");
        }
        _ => {}
    }
}
