//! # Transform Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada: `serve` levanta el servidor, `client` envía mensajes
//! a uno que ya está corriendo.

use clap::Parser;
use std::io;
use std::process::ExitCode;
use tracing::error;
use transform_server::client::{self, TcpClient};
use transform_server::config::{Cli, ClientConfig, Command, Config, ServerMode};
use transform_server::server;
use transform_server::shutdown::{spawn_signal_listener, SystemShutdownSignal};
use transform_server::telemetry;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(config) => serve(config),
        Command::Client(config) => run_client(config),
    }
}

fn serve(config: Config) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Configuración inválida: {}", e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = telemetry::initialise(&config) {
        eprintln!("Error al inicializar logs: {}", e);
        return ExitCode::FAILURE;
    }

    config.print_summary();

    let running = match server::start(&config) {
        Ok(running) => running,
        Err(e) => {
            error!(error = %e, "error al iniciar el servidor");
            eprintln!("Error fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("Escuchando en {}", running.local_addr());

    if let Err(e) = spawn_signal_listener(SystemShutdownSignal, running.shutdown_controller()) {
        error!(error = %e, "error al lanzar el listener de señales");
    }

    match running.wait() {
        Ok(report) => {
            println!();
            println!("Servidor detenido");
            println!("   Unidades atendidas: {}", report.liveness.accepted);
            println!("   Completadas:        {}", report.liveness.completed);
            println!("   Fallidas:           {}", report.liveness.failed);
            println!("   Drain:              {:?}", report.drain);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "servidor detenido con error");
            eprintln!("Error fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_client(config: ClientConfig) -> ExitCode {
    match client_session(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn client_session(config: &ClientConfig) -> Result<(), client::ClientError> {
    config.validate()?;
    match config.mode {
        ServerMode::Tcp => tcp_client(config),
        ServerMode::Udp => udp_client(config),
    }
}

fn tcp_client(config: &ClientConfig) -> Result<(), client::ClientError> {
    let mut tcp = TcpClient::connect(&config.address(), config.timeout())?;

    if config.messages.is_empty() {
        let stdin = io::stdin();
        client::run_console(&mut tcp, stdin.lock(), io::stdout(), &config.termination_token)?;
        return Ok(());
    }

    for reply in tcp.exchange_all(&config.messages, &config.termination_token)? {
        println!("Servidor: {}", reply);
    }
    Ok(())
}

fn udp_client(config: &ClientConfig) -> Result<(), client::ClientError> {
    let address = config.address();
    let messages = if config.messages.is_empty() {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        vec![line.trim_end().to_string()]
    } else {
        config.messages.clone()
    };

    for message in &messages {
        let reply = client::udp_request(&address, message, config.timeout())?;
        println!("Servidor: {}", reply);
    }
    Ok(())
}
