use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};

use notevault::{App, Cli, Config, NoteVault};

pub fn initialize_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let vault = match NoteVault::open(&config) {
        Ok(vault) => Arc::new(vault),
        Err(e) => {
            error!("Failed to open note vault: {}", e);
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    vault.set_error_handler(Arc::new(|id: &str, err: &notevault::VaultError| {
        eprintln!("Auto-save of note {} failed: {}", id, err);
    }));

    let app = App::new(Arc::clone(&vault), config, cli.config, cli.verbose);
    let outcome = app.run(cli.command).await;

    if let Err(e) = vault.shutdown() {
        error!("Failed to flush pending writes: {}", e);
    }
    info!("Application shutting down");

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
