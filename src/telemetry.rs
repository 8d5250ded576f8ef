//! # Telemetría
//! src/telemetry.rs
//!
//! Inicializa el subscriber global de `tracing` según la configuración.
//! Los logs van a stderr para no mezclarse con la salida del reporte.

use crate::config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use std::io::{self, IsTerminal};
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Se obtiene al inicializar la telemetría
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Instala el subscriber global la primera vez que se llama
///
/// Las llamadas siguientes no tocan el estado global y retornan un handle
/// nuevo.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            // Los threads de sesión llevan nombre "session-<seq>"
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// Corre `f` con un subscriber local que guarda los logs en memoria
///
/// Solo captura eventos del thread que llama.
#[cfg(test)]
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        let config = Config {
            log_filter: "transform_server=loud".to_string(),
            ..Config::default()
        };
        // No instala nada: el filtro falla antes
        assert!(matches!(
            install_subscriber(&config),
            Err(TelemetryError::Filter(_))
        ));
    }

    #[test]
    fn test_initialise_is_idempotent() {
        let config = Config::default();
        assert!(initialise(&config).is_ok());
        assert!(initialise(&config).is_ok());
    }
}
