//! # Configuración del Servidor
//! src/config.rs
//!
//! Este módulo define la configuración del servidor y del cliente con
//! soporte completo para argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./transform_server serve --mode tcp --port 4321 \
//!   --transform reverse \
//!   --exchange interactive \
//!   --termination-token terminar
//!
//! ./transform_server client --mode udp --port 6789 "hola mundo"
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! SERVER_MODE=udp SERVER_PORT=6789 SERVER_TRANSFORM=upper ./transform_server serve
//! ```

use crate::shutdown::DrainPolicy;
use crate::transform::TransformKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Puerto por defecto del servidor TCP
pub const DEFAULT_TCP_PORT: u16 = 4321;
/// Puerto por defecto del servidor UDP
pub const DEFAULT_UDP_PORT: u16 = 6789;
/// Mayor payload posible en un datagrama UDP sobre IPv4
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Punto de entrada de la línea de comandos
#[derive(Debug, Parser)]
#[command(name = "transform_server")]
#[command(about = "Servidor concurrente de petición/respuesta con transformaciones de payload")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia el servidor
    Serve(Config),
    /// Envía mensajes a un servidor en ejecución
    Client(ClientConfig),
}

/// Modo de transporte
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Orientado a conexión: un thread por conexión aceptada
    Tcp,
    /// Sin conexión: un thread por datagrama recibido
    Udp,
}

impl ServerMode {
    pub fn default_port(self) -> u16 {
        match self {
            ServerMode::Tcp => DEFAULT_TCP_PORT,
            ServerMode::Udp => DEFAULT_UDP_PORT,
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Tcp => f.write_str("tcp"),
            ServerMode::Udp => f.write_str("udp"),
        }
    }
}

/// Cantidad de intercambios por conexión TCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExchangeMode {
    /// Una petición, una respuesta, cierre
    OneShot,
    /// Peticiones sucesivas hasta el token de terminación
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DrainMode {
    /// Espera a las sesiones en curso (hasta `drain_timeout_ms`)
    Graceful,
    /// Sale de inmediato abandonando las sesiones en curso
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Una línea legible por evento
    Compact,
    /// JSON estructurado
    Json,
}

/// Errores de validación de la configuración
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backlog must be between 1 and {max}")]
    Backlog { max: u32 },
    #[error("termination token must not be empty")]
    EmptyTerminationToken,
    #[error("max datagram size must be between 1 and {max} bytes")]
    DatagramSize { max: usize },
    #[error("drain timeout must be > 0 for graceful shutdown")]
    DrainTimeout,
    #[error("client timeout must be > 0")]
    ClientTimeout,
}

/// Configuración del servidor
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Modo de transporte
    #[arg(long, value_enum, default_value = "tcp", env = "SERVER_MODE")]
    pub mode: ServerMode,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "SERVER_HOST")]
    pub host: String,

    /// Puerto en el que escucha (por defecto 4321 en TCP y 6789 en UDP)
    #[arg(short, long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Cola de conexiones pendientes (solo TCP)
    #[arg(long, default_value = "300", env = "SERVER_BACKLOG")]
    pub backlog: u32,

    /// Transformación aplicada a cada payload
    #[arg(short, long, value_enum, default_value = "reverse", env = "SERVER_TRANSFORM")]
    pub transform: TransformKind,

    /// Intercambios por conexión TCP
    #[arg(long, value_enum, default_value = "interactive", env = "SERVER_EXCHANGE")]
    pub exchange: ExchangeMode,

    /// Token (sin distinguir mayúsculas) que termina una sesión interactiva
    #[arg(long, default_value = "terminar", env = "SERVER_TERMINATION_TOKEN")]
    pub termination_token: String,

    /// Timeout por lectura/escritura en milisegundos (0 = sin timeout)
    #[arg(long = "io-timeout-ms", default_value = "30000", env = "SERVER_IO_TIMEOUT_MS")]
    pub io_timeout_ms: u64,

    // === Apagado ===

    /// Política de drain al apagar
    #[arg(long, value_enum, default_value = "graceful", env = "SERVER_DRAIN")]
    pub drain: DrainMode,

    /// Tiempo máximo de espera por sesiones en curso, en milisegundos
    #[arg(long = "drain-timeout-ms", default_value = "5000", env = "SERVER_DRAIN_TIMEOUT_MS")]
    pub drain_timeout_ms: u64,

    // === UDP ===

    /// Tamaño del buffer de recepción de datagramas
    #[arg(long = "max-datagram", default_value = "1000", env = "SERVER_MAX_DATAGRAM")]
    pub max_datagram: usize,

    // === Logging ===

    /// Filtro de logs (sintaxis de `EnvFilter`)
    #[arg(long = "log-filter", default_value = "info", env = "SERVER_LOG")]
    pub log_filter: String,

    #[arg(long = "log-format", value_enum, default_value = "compact", env = "SERVER_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Config {
    /// Puerto efectivo según el modo
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.mode.default_port())
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use transform_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:4321");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.effective_port())
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        match self.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        match self.drain {
            DrainMode::Graceful => {
                DrainPolicy::Graceful(Duration::from_millis(self.drain_timeout_ms))
            }
            DrainMode::Fast => DrainPolicy::Fast,
        }
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_backlog = i32::MAX as u32;
        if self.backlog == 0 || self.backlog > max_backlog {
            return Err(ConfigError::Backlog { max: max_backlog });
        }

        if self.termination_token.trim().is_empty() {
            return Err(ConfigError::EmptyTerminationToken);
        }

        if self.max_datagram == 0 || self.max_datagram > MAX_UDP_PAYLOAD {
            return Err(ConfigError::DatagramSize { max: MAX_UDP_PAYLOAD });
        }

        if self.drain == DrainMode::Graceful && self.drain_timeout_ms == 0 {
            return Err(ConfigError::DrainTimeout);
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("=================================");
        println!("  Servidor {} concurrente", self.mode.to_string().to_uppercase());
        println!("=================================");
        println!("   Dirección:      {}", self.address());
        println!("   Transformación: {}", self.transform);
        if self.mode == ServerMode::Tcp {
            println!("   Backlog:        {}", self.backlog);
            println!("   Intercambio:    {:?}", self.exchange);
            println!("   Terminación:    \"{}\"", self.termination_token);
        } else {
            println!("   Buffer UDP:     {} bytes", self.max_datagram);
        }
        match self.io_timeout() {
            Some(timeout) => println!("   Timeout I/O:    {} ms", timeout.as_millis()),
            None => println!("   Timeout I/O:    disabled"),
        }
        match self.drain_policy() {
            DrainPolicy::Graceful(timeout) => {
                println!("   Apagado:        graceful ({} ms)", timeout.as_millis())
            }
            DrainPolicy::Fast => println!("   Apagado:        fast"),
        }
        println!("   (Ctrl+C para detener)");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            mode: ServerMode::Tcp,
            host: "127.0.0.1".to_string(),
            port: None,
            backlog: 300,
            transform: TransformKind::Reverse,
            exchange: ExchangeMode::Interactive,
            termination_token: "terminar".to_string(),
            io_timeout_ms: 30_000,
            drain: DrainMode::Graceful,
            drain_timeout_ms: 5_000,
            max_datagram: 1000,
            log_filter: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

/// Configuración del cliente
#[derive(Debug, Clone, Args)]
pub struct ClientConfig {
    #[arg(long, value_enum, default_value = "tcp", env = "SERVER_MODE")]
    pub mode: ServerMode,

    /// Host del servidor
    #[arg(long, default_value = "127.0.0.1", env = "SERVER_HOST")]
    pub host: String,

    #[arg(short, long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Timeout de conexión y de espera de respuesta en milisegundos
    #[arg(long = "timeout-ms", default_value = "5000")]
    pub timeout_ms: u64,

    #[arg(long, default_value = "terminar")]
    pub termination_token: String,

    /// Mensajes a enviar; sin mensajes se leen de la consola
    pub messages: Vec<String>,
}

impl ClientConfig {
    pub fn address(&self) -> String {
        format!(
            "{}:{}",
            self.host,
            self.port.unwrap_or_else(|| self.mode.default_port())
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ClientTimeout);
        }
        if self.termination_token.trim().is_empty() {
            return Err(ConfigError::EmptyTerminationToken);
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Tcp,
            host: "127.0.0.1".to_string(),
            port: None,
            timeout_ms: 5_000,
            termination_token: "terminar".to_string(),
            messages: Vec::new(),
        }
    }
}
