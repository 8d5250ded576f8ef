//! # Señales de Apagado
//! src/shutdown/signal.rs
//!
//! Conecta las señales del sistema operativo con el `ShutdownController`.
//! Un thread dedicado espera la primera señal y pide el apagado.

use super::{ShutdownController, SHUTDOWN_TARGET};
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io;
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

/// Abstracción sobre el mecanismo que notifica el apagado
pub trait ShutdownSignal: Send {
    /// Bloquea hasta que se deba apagar
    fn wait(&self) -> Result<(), ShutdownError>;
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
}

/// Espera SIGINT, SIGTERM o SIGQUIT
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])
            .map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(target: SHUTDOWN_TARGET, signal, "señal de apagado recibida");
        }
        Ok(())
    }
}

/// Lanza un thread que pide el apagado cuando llega la señal
///
/// Si no se pueden instalar los handlers se registra un warning y el
/// servidor sigue corriendo (solo se podrá detener por otro medio).
pub fn spawn_signal_listener<S>(
    signal: S,
    controller: ShutdownController,
) -> io::Result<thread::JoinHandle<()>>
where
    S: ShutdownSignal + 'static,
{
    thread::Builder::new()
        .name("shutdown-signal".to_string())
        .spawn(move || match signal.wait() {
            Ok(()) => {
                controller.request_shutdown();
            }
            Err(error) => {
                warn!(
                    target: SHUTDOWN_TARGET,
                    error = %error,
                    "listener de señales no disponible"
                );
            }
        })
}
