//! # Liveness Tracker
//! src/metrics/liveness.rs
//!
//! Contadores de sesiones aceptadas, activas y terminadas. Todas las
//! operaciones son atómicas; el `Mutex` solo protege la espera por drain
//! (nunca la actualización de un contador).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

const LIVENESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::liveness");

/// Resultado final de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed,
    Failed,
}

/// Tracker de liveness thread-safe
#[derive(Debug)]
pub struct LivenessTracker {
    /// Unidades de trabajo aceptadas (también es el último número de secuencia)
    accepted: AtomicU64,

    /// Sesiones en ejecución
    active: AtomicU64,

    completed: AtomicU64,
    failed: AtomicU64,

    /// Máximo de sesiones simultáneas observado
    peak_active: AtomicU64,

    drain_lock: Mutex<()>,
    drained: Condvar,
    start_time: Instant,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            active: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            peak_active: AtomicU64::new(0),
            drain_lock: Mutex::new(()),
            drained: Condvar::new(),
            start_time: Instant::now(),
        }
    }

    /// Registra una unidad aceptada y retorna su número de secuencia (desde 1)
    pub fn on_accept(&self) -> u64 {
        self.accepted.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Marca el inicio de una sesión; retorna el nuevo conteo de activas
    pub fn on_handler_start(&self) -> u64 {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);
        active
    }

    /// Marca el fin de una sesión; retorna el nuevo conteo de activas
    ///
    /// El decremento satura en cero: un fin sin inicio se registra como
    /// anomalía en vez de producir un conteo negativo.
    pub fn on_handler_end(&self, outcome: HandlerOutcome) -> u64 {
        match outcome {
            HandlerOutcome::Completed => self.completed.fetch_add(1, Ordering::SeqCst),
            HandlerOutcome::Failed => self.failed.fetch_add(1, Ordering::SeqCst),
        };

        let previous = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        let active = match previous {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!(
                    target: LIVENESS_TARGET,
                    "fin de sesión sin inicio correspondiente; el conteo de activas queda en cero"
                );
                0
            }
        };

        if active == 0 {
            let _guard = self
                .drain_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.drained.notify_all();
        }

        active
    }

    /// Toma un slot de sesión activa que se libera al soltar el guard
    pub fn enter(self: &Arc<Self>) -> ActiveGuard {
        let active_at_start = self.on_handler_start();
        ActiveGuard {
            tracker: Arc::clone(self),
            outcome: HandlerOutcome::Failed,
            active_at_start,
        }
    }

    pub fn total_accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> u64 {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Bloquea hasta que no queden sesiones activas o expire `timeout`
    ///
    /// Retorna `true` si se alcanzó el drain completo.
    pub fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .drain_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while self.active_count() > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .drained
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
        true
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        LivenessSnapshot {
            accepted: self.total_accepted(),
            active: self.active_count(),
            completed: self.completed_count(),
            failed: self.failed_count(),
            peak_active: self.peak_active(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Snapshot en formato JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot de sesión activa
///
/// Al soltarse decrementa el conteo de activas en cualquier camino de
/// salida, incluso si la sesión hace panic. El resultado por defecto es
/// `Failed` hasta que se llame a [`ActiveGuard::complete`].
#[derive(Debug)]
pub struct ActiveGuard {
    tracker: Arc<LivenessTracker>,
    outcome: HandlerOutcome,
    active_at_start: u64,
}

impl ActiveGuard {
    pub fn complete(&mut self) {
        self.outcome = HandlerOutcome::Completed;
    }

    /// Sesiones activas en el momento de tomar el slot (incluyendo esta)
    pub fn active_at_start(&self) -> u64 {
        self.active_at_start
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.tracker.on_handler_end(self.outcome);
    }
}

/// Snapshot de liveness (para reportes y uso externo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivenessSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub peak_active: u64,
    pub uptime_secs: u64,
}
