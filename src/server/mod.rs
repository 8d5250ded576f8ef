//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Este módulo implementa el servidor concurrente de petición/respuesta:
//! 1. Enlaza el endpoint (TCP o UDP)
//! 2. Acepta unidades de trabajo en un loop de un solo thread
//! 3. Lanza un Session Handler por unidad en su propio thread
//! 4. Se detiene de forma ordenada vía `ShutdownController`

pub mod dispatcher;
pub mod session;
pub mod tcp;
pub mod udp;

// Re-exportar para facilitar el uso
pub use dispatcher::{Acceptor, Dispatcher, RunningServer, ServerReport};
pub use session::{
    run_exchange, Session, SessionContext, SessionEnd, SessionSettings, SessionState,
    SessionSummary,
};
pub use tcp::TcpServer;
pub use udp::UdpServer;

use crate::config::{Config, ServerMode};
use crate::error::ServerError;

/// Enlaza el servidor según el modo configurado y corre su loop en un
/// thread de fondo
///
/// # Ejemplo
/// ```no_run
/// use transform_server::config::Config;
/// use transform_server::server;
///
/// let server = server::start(&Config::default()).expect("bind");
/// println!("escuchando en {}", server.local_addr());
/// let report = server.stop().expect("stop");
/// println!("unidades atendidas: {}", report.liveness.accepted);
/// ```
pub fn start(config: &Config) -> Result<RunningServer, ServerError> {
    match config.mode {
        ServerMode::Tcp => TcpServer::bind(config)?.spawn(),
        ServerMode::Udp => UdpServer::bind(config)?.spawn(),
    }
}
