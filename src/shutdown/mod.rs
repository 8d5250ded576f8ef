//! # Control de Apagado
//! src/shutdown/mod.rs
//!
//! El `ShutdownController` coordina la terminación ordenada:
//! 1. Marca el flag de apagado (una sola vez, false → true)
//! 2. Despierta la espera bloqueante del dispatcher
//! 3. Permite esperar el drain de las sesiones en curso
//!
//! Se crea junto con el endpoint y se pasa explícitamente a quien necesite
//! pedir el apagado (listener de señales, tests, `RunningServer`).

pub mod signal;

pub use signal::{spawn_signal_listener, ShutdownError, ShutdownSignal, SystemShutdownSignal};

use crate::metrics::LivenessTracker;
use serde::Serialize;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Qué hacer con las sesiones en curso al apagar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Esperar hasta que terminen, con un tiempo máximo
    Graceful(Duration),
    /// No esperar: las sesiones en curso se abandonan
    Fast,
}

/// Resultado del drain al final del apagado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrainOutcome {
    Completed,
    TimedOut { active: u64 },
    Skipped { active: u64 },
}

/// Cómo despertar la espera bloqueante del dispatcher
#[derive(Debug, Clone, Copy)]
pub enum WakeTarget {
    /// Abrir (y cerrar) una conexión contra el listener
    Stream(SocketAddr),
    /// Enviar un datagrama vacío al socket
    Datagram(SocketAddr),
}

impl WakeTarget {
    fn wake(self) -> io::Result<()> {
        match self {
            WakeTarget::Stream(addr) => {
                TcpStream::connect_timeout(&reachable(addr), WAKE_TIMEOUT).map(drop)
            }
            WakeTarget::Datagram(addr) => {
                let target = reachable(addr);
                let local: SocketAddr = match target {
                    SocketAddr::V4(_) => (Ipv4Addr::LOCALHOST, 0).into(),
                    SocketAddr::V6(_) => (Ipv6Addr::LOCALHOST, 0).into(),
                };
                let socket = UdpSocket::bind(local)?;
                socket.send_to(&[], target).map(drop)
            }
        }
    }
}

/// Una dirección "unspecified" (0.0.0.0 / ::) no es conectable: se usa loopback
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST, addr.port()).into(),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST, addr.port()).into(),
        _ => addr,
    }
}

struct ShutdownInner {
    requested: AtomicBool,
    wake: WakeTarget,
    tracker: Arc<LivenessTracker>,
}

/// Controlador de apagado compartible entre threads
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

impl ShutdownController {
    pub(crate) fn new(wake: WakeTarget, tracker: Arc<LivenessTracker>) -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                requested: AtomicBool::new(false),
                wake,
                tracker,
            }),
        }
    }

    /// Pide el apagado del servidor
    ///
    /// Idempotente: solo la primera llamada marca el flag y despierta al
    /// dispatcher (retorna `true`); las siguientes no tienen efecto.
    pub fn request_shutdown(&self) -> bool {
        if self
            .inner
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(target: SHUTDOWN_TARGET, "apagado ya solicitado");
            return false;
        }

        info!(
            target: SHUTDOWN_TARGET,
            active = self.inner.tracker.active_count(),
            "apagado solicitado"
        );

        // Si el wake falla el dispatcher verá el flag recién en la próxima
        // unidad de trabajo (TCP) o en el siguiente poll (UDP)
        if let Err(error) = self.inner.wake.wake() {
            warn!(
                target: SHUTDOWN_TARGET,
                wake = ?self.inner.wake,
                error = %error,
                "error al despertar al dispatcher"
            );
        }
        true
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Bloquea hasta que no queden sesiones activas o expire `timeout`
    pub fn await_drain(&self, timeout: Duration) -> bool {
        self.inner.tracker.wait_for_drain(timeout)
    }

    /// Aplica la política de drain y reporta el resultado
    pub fn drain(&self, policy: DrainPolicy) -> DrainOutcome {
        match policy {
            DrainPolicy::Graceful(timeout) => {
                info!(
                    target: SHUTDOWN_TARGET,
                    active = self.inner.tracker.active_count(),
                    timeout_ms = timeout.as_millis() as u64,
                    "esperando sesiones en curso"
                );
                if self.await_drain(timeout) {
                    DrainOutcome::Completed
                } else {
                    DrainOutcome::TimedOut {
                        active: self.inner.tracker.active_count(),
                    }
                }
            }
            DrainPolicy::Fast => DrainOutcome::Skipped {
                active: self.inner.tracker.active_count(),
            },
        }
    }
}
