//! # Dispatcher Concurrente
//! src/server/dispatcher.rs
//!
//! Loop de aceptación genérico sobre el modo de transporte. Por cada
//! unidad de trabajo:
//! 1. Asigna un número de secuencia y la cuenta como aceptada
//! 2. Toma un slot de sesión activa
//! 3. Lanza un thread dedicado con el Session Handler
//!
//! El loop nunca espera a una sesión: exactamente una espera bloqueante
//! (accept / recv) está pendiente en cada momento.

use super::session::{Session, SessionContext, SessionSettings};
use crate::config::{Config, ServerMode};
use crate::error::ServerError;
use crate::metrics::{ActiveGuard, LivenessSnapshot, LivenessTracker};
use crate::shutdown::{DrainOutcome, DrainPolicy, ShutdownController, WakeTarget};
use serde::Serialize;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Endpoint enlazado que produce unidades de trabajo
pub trait Acceptor: Send + 'static {
    type Unit: Session;

    /// Espera bloqueante por la siguiente unidad de trabajo
    ///
    /// `Ok(None)` significa que la espera expiró sin trabajo; el dispatcher
    /// revisa el flag de apagado y vuelve a esperar.
    fn next_unit(&mut self) -> io::Result<Option<Self::Unit>>;

    fn local_addr(&self) -> SocketAddr;

    fn mode(&self) -> ServerMode;

    fn wake_target(&self) -> WakeTarget;
}

/// Resuelve host:port a la primera dirección disponible
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ServerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    addrs.next().ok_or_else(|| ServerError::ResolveEmpty {
        host: host.to_string(),
        port,
    })
}

/// Reporte final del servidor
#[derive(Debug, Clone, Serialize)]
pub struct ServerReport {
    pub mode: ServerMode,
    pub local_addr: SocketAddr,
    pub drain: DrainOutcome,
    pub liveness: LivenessSnapshot,
}

impl ServerReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Servidor enlazado, listo para correr su loop de aceptación
pub struct Dispatcher<A: Acceptor> {
    acceptor: A,
    settings: Arc<SessionSettings>,
    tracker: Arc<LivenessTracker>,
    shutdown: ShutdownController,
    drain_policy: DrainPolicy,
}

impl<A: Acceptor> Dispatcher<A> {
    pub(crate) fn new(acceptor: A, config: &Config) -> Self {
        let tracker = Arc::new(LivenessTracker::new());
        let shutdown = ShutdownController::new(acceptor.wake_target(), Arc::clone(&tracker));

        Self {
            acceptor,
            settings: Arc::new(SessionSettings::from_config(config)),
            tracker,
            shutdown,
            drain_policy: config.drain_policy(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn tracker(&self) -> Arc<LivenessTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Corre el loop de aceptación hasta que se pida el apagado
    ///
    /// Al salir libera el endpoint, aplica la política de drain y retorna
    /// el reporte final.
    pub fn run(self) -> Result<ServerReport, ServerError> {
        if self.shutdown.is_shutdown_requested() {
            return Err(ServerError::ShutdownInProgress);
        }

        let Dispatcher {
            mut acceptor,
            settings,
            tracker,
            shutdown,
            drain_policy,
        } = self;

        let mode = acceptor.mode();
        let local_addr = acceptor.local_addr();
        info!(
            target: DISPATCH_TARGET,
            %mode,
            %local_addr,
            transform = settings.transform.name(),
            "dispatcher aceptando unidades de trabajo"
        );

        // Tipo del último error de accept y cuántas veces se repitió seguido
        let mut last_error = None::<(io::ErrorKind, u64)>;
        loop {
            if shutdown.is_shutdown_requested() {
                break;
            }

            match acceptor.next_unit() {
                Ok(Some(unit)) => {
                    last_error = None;
                    if shutdown.is_shutdown_requested() {
                        debug!(
                            target: DISPATCH_TARGET,
                            peer = %unit.peer(),
                            "unidad recibida después de pedir el apagado; descartada"
                        );
                        break;
                    }
                    dispatch(unit, &settings, &tracker);
                }
                Ok(None) => {}
                Err(_) if shutdown.is_shutdown_requested() => break,
                Err(error) => {
                    let kind = error.kind();
                    let repeated = match last_error {
                        Some((last, count)) if last == kind => count + 1,
                        _ => 0,
                    };
                    last_error = Some((kind, repeated));
                    log_accept_error(&error, repeated);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        // Liberar el endpoint antes de esperar a las sesiones
        drop(acceptor);
        info!(
            target: DISPATCH_TARGET,
            %local_addr,
            accepted = tracker.total_accepted(),
            "endpoint liberado"
        );

        let drain = shutdown.drain(drain_policy);
        let report = ServerReport {
            mode,
            local_addr,
            drain,
            liveness: tracker.snapshot(),
        };
        info!(target: DISPATCH_TARGET, report = %report.to_json(), "servidor detenido");
        Ok(report)
    }

    /// Corre el loop en un thread propio
    pub fn spawn(self) -> Result<RunningServer, ServerError> {
        let local_addr = self.local_addr();
        let tracker = self.tracker();
        let shutdown = self.shutdown_controller();

        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || self.run())
            .map_err(ServerError::Spawn)?;

        Ok(RunningServer {
            local_addr,
            tracker,
            shutdown,
            handle: Some(handle),
        })
    }
}

/// El primer error de una racha va a warn; las repeticiones del mismo tipo
/// van a debug con su conteo
fn log_accept_error(error: &io::Error, repeated: u64) {
    if repeated == 0 {
        warn!(
            target: DISPATCH_TARGET,
            error = %error,
            "error transitorio al aceptar"
        );
    } else {
        debug!(
            target: DISPATCH_TARGET,
            error = %error,
            repeated,
            "error transitorio al aceptar (repetido)"
        );
    }
}

/// Crea el Session Handler y lo lanza en un thread dedicado
fn dispatch<U: Session>(unit: U, settings: &Arc<SessionSettings>, tracker: &Arc<LivenessTracker>) {
    let seq = tracker.on_accept();
    let guard = tracker.enter();
    let ctx = SessionContext {
        seq,
        peer: unit.peer(),
        settings: Arc::clone(settings),
    };

    debug!(
        target: DISPATCH_TARGET,
        seq,
        peer = %ctx.peer,
        active = guard.active_at_start(),
        "unidad aceptada; lanzando sesión"
    );

    // Si el spawn falla el closure (y el guard) se sueltan: la sesión
    // cuenta como fallida
    let spawned = thread::Builder::new()
        .name(format!("session-{}", seq))
        .spawn(move || run_session(unit, ctx, guard));

    if let Err(error) = spawned {
        warn!(
            target: DISPATCH_TARGET,
            seq,
            error = %error,
            "error al lanzar el thread de sesión"
        );
    }
}

fn run_session<U: Session>(unit: U, ctx: SessionContext, mut guard: ActiveGuard) {
    let span = info_span!(target: SESSION_TARGET, "session", seq = ctx.seq, peer = %ctx.peer);
    let _entered = span.enter();

    match unit.process(&ctx) {
        Ok(summary) => {
            guard.complete();
            info!(
                target: SESSION_TARGET,
                exchanges = summary.exchanges,
                end = ?summary.end,
                "sesión completada"
            );
        }
        Err(error) if error.is_peer_closed() => {
            info!(target: SESSION_TARGET, error = %error, "el cliente se desconectó");
        }
        Err(error) if error.is_malformed() => {
            warn!(target: SESSION_TARGET, error = %error, "payload malformado descartado");
        }
        Err(error) => {
            warn!(target: SESSION_TARGET, error = %error, "sesión fallida");
        }
    }
}

/// Servidor corriendo en un thread de fondo
pub struct RunningServer {
    local_addr: SocketAddr,
    tracker: Arc<LivenessTracker>,
    shutdown: ShutdownController,
    handle: Option<thread::JoinHandle<Result<ServerReport, ServerError>>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tracker(&self) -> Arc<LivenessTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Espera a que el dispatcher termine (por una petición de apagado externa)
    pub fn wait(mut self) -> Result<ServerReport, ServerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ServerError::ThreadPanic)?,
            None => Err(ServerError::ShutdownInProgress),
        }
    }

    /// Pide el apagado y espera el reporte final
    pub fn stop(self) -> Result<ServerReport, ServerError> {
        self.shutdown.request_shutdown();
        self.wait()
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown.request_shutdown();
        }
    }
}
