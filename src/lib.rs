//! # Transform Server
//! src/lib.rs
//!
//! Servidor concurrente de petición/respuesta implementado sobre sockets
//! bloqueantes y un thread por unidad de trabajo, para demostrar conceptos
//! de sistemas operativos: concurrencia, sincronización y apagado ordenado.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `protocol`: Framing de mensajes TCP y decodificación de datagramas
//! - `transform`: Transformaciones aplicadas a cada payload
//! - `server`: Loop de aceptación (TCP/UDP) y Session Handlers
//! - `metrics`: Seguimiento de sesiones activas y completadas
//! - `shutdown`: Controlador de apagado y señales del sistema
//! - `client`: Clientes TCP/UDP para hablar con el servidor
//! - `telemetry`: Inicialización de logs estructurados
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use transform_server::config::Config;
//! use transform_server::server;
//!
//! let config = Config::default();
//! let running = server::start(&config).expect("Error al iniciar servidor");
//! let report = running.stop().expect("Error al detener servidor");
//! println!("{}", report.to_json());
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod transform;
