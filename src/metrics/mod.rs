//! # Liveness del Servidor
//! src/metrics/mod.rs
//!
//! Este módulo mantiene los contadores de observabilidad del servidor:
//! - Unidades de trabajo aceptadas (y su número de secuencia)
//! - Sesiones activas, completadas y fallidas
//! - Pico de sesiones simultáneas
//! - Espera por drain durante el apagado

pub mod liveness;

pub use liveness::{ActiveGuard, HandlerOutcome, LivenessSnapshot, LivenessTracker};
