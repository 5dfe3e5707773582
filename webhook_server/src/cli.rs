//! Thin command-line entry points.
//!
//! `webhook_server process` runs one dispatcher pass and exits, `webhook_server schedule` runs
//! one scheduler sweep and exits. Anything else prints the help text. With no arguments the
//! binary runs as the long-lived server.

use std::{env, env::VarError};

use chrono::Utc;
use log::*;
use webhook_engine::{events::EventProducers, DispatchApi, SchedulerApi, SqliteDatabase};

use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCommand {
    /// Run one dispatcher pass over the due notifications, then exit.
    ProcessNow,
    /// Run one scheduler sweep, then exit.
    ScheduleNow,
    Help,
}

/// Returns `None` when no arguments were given, i.e. the binary should run as a server.
pub fn parse_command_line_args() -> Option<CliCommand> {
    let arg = env::args().nth(1)?;
    let command = match arg.as_str() {
        "process" => CliCommand::ProcessNow,
        "schedule" => CliCommand::ScheduleNow,
        _ => CliCommand::Help,
    };
    Some(command)
}

/// Runs a one-off batch command, returning a process exit code.
pub async fn run_once(command: CliCommand, config: &ServerConfig) -> i32 {
    if command == CliCommand::Help {
        display_help();
        return 0;
    }
    let db = match SqliteDatabase::new_with_url(&config.database_url, 5).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Could not open the gateway database: {e}");
            return 1;
        },
    };
    let now = Utc::now();
    match command {
        CliCommand::ProcessNow => {
            let api = DispatchApi::new(db, EventProducers::default());
            match api.process_due(now).await {
                Ok(summary) => {
                    println!("Dispatch pass complete. {summary}");
                    0
                },
                Err(e) => {
                    eprintln!("Dispatch pass failed: {e}");
                    1
                },
            }
        },
        CliCommand::ScheduleNow => {
            let api = SchedulerApi::new(db);
            match api.run_sweep(now).await {
                Ok(summary) => {
                    println!("Scheduler sweep complete. {summary}");
                    0
                },
                Err(e) => {
                    eprintln!("Scheduler sweep failed: {e}");
                    1
                },
            }
        },
        CliCommand::Help => 0,
    }
}

pub fn display_help() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
    display_envs();
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "PWG_HOST",
        "PWG_PORT",
        "PWG_DATABASE_URL",
        "PWG_MERCHANT_ACCOUNT",
        "PWG_HMAC_CHECKS",
        "PWG_WEBHOOK_USERNAME",
        "PWG_USE_X_FORWARDED_FOR",
        "PWG_USE_FORWARDED",
    ];

    info!("Printing environment variables");
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<28} {val:<15}");
    })
}
