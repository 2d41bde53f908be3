// Head Unit Bridge - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Head Unit Bridge
//!
//! A session daemon that runs phone-side features (notification
//! mirroring, map projection) only while a car head unit and its
//! security service are both connected.
//!
//! This is the main entry point for the daemon.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod application;
mod bus;
mod connectivity;
mod features;
mod models;
mod permissions;
mod presence;
mod services;
mod storage;

use application::Application;
use models::AppConfig;
use storage::DataStore;

/// Human-readable application name.
pub const APP_NAME: &str = "Head Unit Bridge";

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print version information and exit.
fn print_version() {
    println!("{} {}", APP_NAME, VERSION);
    println!("Copyright (C) 2026 Christos A. Daggas");
    println!("License: MIT");
    println!();
    println!("Runs phone features while a car head unit is connected.");
}

/// Print help information and exit.
fn print_help() {
    println!(
        "Usage: {} [OPTIONS]",
        env::args().next().unwrap_or_else(|| "headunit-bridge".to_string())
    );
    println!();
    println!("Runs phone features while a car head unit is connected.");
    println!();
    println!("Options:");
    println!("  -h, --help             Show this help message and exit");
    println!("  -v, --version          Show version information and exit");
    println!("  -d, --debug            Enable debug logging");
    println!("  -c, --config-dir DIR   Read settings from DIR");
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG               Set log level (trace, debug, info, warn, error)");
    println!();
    println!("Report bugs to: https://github.com/christosdaggas/headunit-bridge/issues");
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut debug_mode = false;
    let mut config_dir: Option<PathBuf> = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-d" | "--debug" => {
                debug_mode = true;
            }
            "-c" | "--config-dir" => match iter.next() {
                Some(dir) => config_dir = Some(PathBuf::from(dir)),
                None => {
                    eprintln!("Option {} requires a directory", arg);
                    return ExitCode::FAILURE;
                }
            },
            _ => {
                eprintln!("Unknown option: {}", arg);
                eprintln!("Try '--help' for more information.");
                return ExitCode::FAILURE;
            }
        }
    }

    let config_dir = config_dir.unwrap_or_else(DataStore::default_config_dir);

    // Logging comes up before the store so its load messages are kept.
    let configured_level = AppConfig::load_from_file(&config_dir.join("settings.toml"))
        .map(|c| c.log_level)
        .unwrap_or_else(|_| "info".to_string());
    let log_level = if debug_mode {
        tracing::Level::DEBUG
    } else {
        configured_level.parse().unwrap_or(tracing::Level::INFO)
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(DataStore::with_config_dir(config_dir));
    match runtime.block_on(Application::new(store).run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
