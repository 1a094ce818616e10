//! Forward CLI
//!
//! Share a server running on localhost with a public URL.

use std::io::{self, Write};
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing::{error, info};

use forward_cli::api::HttpControlApi;
use forward_cli::cli::Cli;
use forward_cli::console::Console;
use forward_cli::error::Exit;
use forward_cli::prompt::TerminalPrompt;
use forward_cli::supervisor::{ClientSupervisor, INTERRUPTED, SupervisorSettings};
use forward_cli::transport::SshTransport;
use forward_core::config::option_file_path;
use forward_core::tracing_init::init_tracing;
use forward_core::{DebugLogSink, LogSink};
use forward_crypto::ConfigStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mode = cli.debug_mode();
    let debug_log = Arc::new(DebugLogSink::new(LogSink::select(mode, cli.log_file.clone())));
    init_tracing(debug_log.sink(), mode)?;
    info!(version = forward_core::VERSION, client = %forward_core::client_string(), "Starting forward");

    let option_file = Some(option_file_path(&std::env::current_dir()?)).filter(|p| p.is_file());
    if cli.wants_usage(option_file.as_deref()) {
        Cli::command().print_help()?;
        writeln!(io::stdout())?;
        return Ok(());
    }

    let console = Console::stdout();
    let request = match cli.resolve(option_file.as_deref()) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Invalid options");
            console.line(&e.to_string());
            std::process::exit(Exit::Failure.code());
        }
    };

    let config_dir = cli
        .config_dir
        .clone()
        .or_else(ConfigStore::default_dir)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    let settings = SupervisorSettings {
        ssh_port: cli.ssh_port,
        ssh_user: cli.ssh_user.clone(),
        ..SupervisorSettings::new(config_dir)
    };

    let api = Arc::new(HttpControlApi::new(&cli.api_url)?);
    let supervisor = ClientSupervisor::new(
        settings,
        api,
        Arc::new(TerminalPrompt),
        Arc::new(SshTransport),
        debug_log,
        console,
    );

    let teardown = supervisor.teardown();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let exit = teardown.run(INTERRUPTED, Exit::Success).await;
            std::process::exit(exit.code());
        }
    });

    let exit = supervisor.start(&request).await;
    std::process::exit(exit.code());
}
