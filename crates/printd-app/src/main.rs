// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printd — background print service for receipt and label printers.
//
// Entry point. Parses the command line, initialises logging, loads settings
// and either runs the service until Ctrl-C or answers a one-shot query.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use printd_core::config::ServiceConfig;
use printd_core::error::Result;
use printd_core::types::PrinterRole;
use printd_print::discovery::{filter_role, suggested_role};
use printd_print::{PrintBackend, SystemBackend};

use services::app_services::PrintService;
use services::data_dir;

/// printd command line.
#[derive(Parser, Debug)]
#[command(name = "printd", version, about = "Background print service for receipt and label printers")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `printd_print=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the service until interrupted (default).
    Serve,
    /// List system printers with suggested role, assigned role and availability.
    Printers {
        /// Only show printers whose names mark them for this role
        /// (`label` or `receipt`).
        #[arg(long)]
        role: Option<PrinterRole>,
    },
    /// Print the effective configuration as JSON.
    Config,
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directive) => tracing_subscriber::EnvFilter::new(directive),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "printd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.unwrap_or_else(data_dir::config_path);
    let config = ServiceConfig::load_or_init(&path)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, path).await,
        Command::Printers { role } => list_printers(&config, role).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn serve(config: ServiceConfig, path: PathBuf) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), settings = %path.display(), "printd starting");

    let mut service = PrintService::new(config);
    service.start().await?;
    info!(
        http = ?service.http_status(),
        socket = ?service.socket_status(),
        "listeners up"
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    service.stop().await;
    Ok(())
}

async fn list_printers(config: &ServiceConfig, role: Option<PrinterRole>) -> Result<()> {
    let backend = SystemBackend::from_config(config);
    let installed = backend.list_printers().await?;
    let names = match role {
        Some(role) => filter_role(&installed, role),
        None => installed.iter().map(String::as_str).collect(),
    };
    if names.is_empty() {
        match role {
            Some(role) => println!("no {role} printers installed ({} backend)", backend.name()),
            None => println!("no printers installed ({} backend)", backend.name()),
        }
        return Ok(());
    }

    for name in names {
        let availability = match backend.probe(name).await {
            Ok(handle) => handle.availability.to_string(),
            Err(e) => format!("unknown ({e})"),
        };
        let suggested = suggested_role(name).map_or("-", |role| role.as_str());
        let assigned = config.role_of(name).map_or("-", |role| role.as_str());
        println!("{name:<32} suggested={suggested:<8} assigned={assigned:<8} {availability}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::parse_from(["printd"]);
        assert_eq!(cli.command, None);
        assert!(cli.config.is_none());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["printd", "printers", "--config", "/tmp/s.json", "--log", "debug"]);
        assert_eq!(cli.command, Some(Command::Printers { role: None }));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.json")));
        assert_eq!(cli.log.as_deref(), Some("debug"));
    }

    #[test]
    fn printers_can_be_filtered_by_role() {
        let cli = Cli::parse_from(["printd", "printers", "--role", "ticket"]);
        assert_eq!(cli.command, Some(Command::Printers { role: Some(PrinterRole::Receipt) }));
        assert!(Cli::try_parse_from(["printd", "printers", "--role", "laser"]).is_err());
    }

    #[tokio::test]
    async fn config_command_writes_defaults_for_a_new_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let cli = Cli::parse_from(["printd", "config", "--config", path.to_str().expect("utf8")]);
        run(cli).await.expect("run");
        assert!(path.exists());
    }
}
