//! Fleet Agent - Entry Point
//!
//! Unattended endpoint agent: polls the control server for deployment
//! commands, downloads and runs installers, and reports the outcome.

use std::env;

use fleetagent::app::options::AppOptions;
use fleetagent::app::run::run;
use fleetagent::logs::{init_logging, LogOptions};
use fleetagent::storage::identity::assert_registered;
use fleetagent::storage::layout::StorageLayout;
use fleetagent::storage::settings::Settings;
use fleetagent::utils::{parse_cli_args, version_info};

use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli_args = parse_cli_args(env::args().skip(1));

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("home") {
        Some(home) => StorageLayout::new(home),
        None => StorageLayout::from_env(),
    };

    // Check the agent has been registered
    let identity = match assert_registered(&layout.identity_file()).await {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("Agent is not registered: {}", e);
            std::process::exit(1);
        }
    };

    // Retrieve the settings file
    let settings = match layout.settings_file().read_json::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = settings.validate() {
        eprintln!("Invalid settings: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);
    info!(
        version = %version.version,
        git_hash = %version.git_hash,
        "Running Fleet Agent with options: {:?}",
        options
    );

    if let Err(e) = run(options, identity, await_shutdown_signal()).await {
        error!("Failed to run the agent: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to listen for SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to listen for SIGINT");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
