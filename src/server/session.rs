//! # Session Handler
//! src/server/session.rs
//!
//! Una sesión es dueña de exactamente una unidad de trabajo (conexión o
//! datagrama): lee el payload, aplica la transformación y responde al
//! mismo peer.
//!
//! ## Máquina de estados (TCP interactivo)
//!
//! ```text
//! AwaitRequest → Transform → Reply → (AwaitRequest | Closed)
//! ```
//!
//! Se pasa a `Closed` por fallo de lectura, fallo de escritura o cuando el
//! payload coincide con el token de terminación (después de responderlo).

use crate::config::{Config, ExchangeMode};
use crate::error::SessionError;
use crate::protocol::{read_frame, write_frame, FrameError};
use crate::transform::Transform;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Parámetros compartidos por todas las sesiones de un servidor
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub transform: Transform,
    pub exchange: ExchangeMode,
    pub termination_token: String,
    pub io_timeout: Option<Duration>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transform: config.transform.transform(),
            exchange: config.exchange,
            termination_token: config.termination_token.trim().to_string(),
            io_timeout: config.io_timeout(),
        }
    }

    /// Compara contra el token sin distinguir mayúsculas
    pub fn is_termination(&self, payload: &str) -> bool {
        payload.trim().to_lowercase() == self.termination_token.to_lowercase()
    }
}

/// Contexto de una sesión concreta
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Número de secuencia asignado por el dispatcher
    pub seq: u64,
    pub peer: SocketAddr,
    pub settings: Arc<SessionSettings>,
}

/// Estados de un intercambio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitRequest,
    Transform,
    Reply,
    Closed,
}

/// Motivo por el que una sesión terminó bien
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Modo one-shot: una respuesta enviada
    Replied,
    /// El cliente envió el token de terminación
    Terminated,
    /// El cliente cerró la conexión entre peticiones
    PeerDisconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub exchanges: u64,
    pub end: SessionEnd,
}

/// Unidad de trabajo procesable por un thread de sesión
pub trait Session: Send + 'static {
    fn peer(&self) -> SocketAddr;

    /// Procesa la unidad completa y libera sus recursos al terminar
    fn process(self, ctx: &SessionContext) -> Result<SessionSummary, SessionError>;
}

/// Ejecuta la máquina de estados sobre un stream ya configurado
pub fn run_exchange<S: Read + Write>(
    stream: &mut S,
    settings: &SessionSettings,
) -> Result<SessionSummary, SessionError> {
    let mut state = SessionState::AwaitRequest;
    let mut request = String::new();
    let mut reply = String::new();
    let mut exchanges = 0;
    let mut end = SessionEnd::Replied;

    while state != SessionState::Closed {
        state = match state {
            SessionState::AwaitRequest => match read_frame(stream) {
                Ok(payload) => {
                    request = payload;
                    SessionState::Transform
                }
                // Un cierre limpio entre peticiones no es un fallo
                Err(FrameError::PeerClosed) if exchanges > 0 => {
                    end = SessionEnd::PeerDisconnected;
                    SessionState::Closed
                }
                Err(e) => return Err(SessionError::PayloadRead(e)),
            },
            SessionState::Transform => {
                reply = settings.transform.apply(&request);
                SessionState::Reply
            }
            SessionState::Reply => {
                write_frame(stream, &reply).map_err(SessionError::PayloadWrite)?;
                exchanges += 1;

                if settings.exchange == ExchangeMode::OneShot {
                    end = SessionEnd::Replied;
                    SessionState::Closed
                } else if settings.is_termination(&request) {
                    end = SessionEnd::Terminated;
                    SessionState::Closed
                } else {
                    SessionState::AwaitRequest
                }
            }
            SessionState::Closed => SessionState::Closed,
        };
    }

    Ok(SessionSummary { exchanges, end })
}
