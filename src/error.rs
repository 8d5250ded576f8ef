//! # Errores del Servidor
//! src/error.rs
//!
//! Taxonomía de errores:
//! - `ServerError`: fallos del servidor completo (solo `Bind` es fatal en el arranque)
//! - `SessionError`: fallos locales a una sesión; nunca llegan al dispatcher
//!
//! Los errores transitorios del `accept` no son un tipo: el dispatcher los
//! registra y sigue aceptando.

use crate::config::ConfigError;
use crate::protocol::FrameError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to resolve address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    /// Puerto en uso o sin permisos
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server is shutting down")]
    ShutdownInProgress,
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("dispatcher thread panicked")]
    ThreadPanic,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// `true` si el puerto ya está en uso
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            ServerError::Bind { source, .. } => source.kind() == io::ErrorKind::AddrInUse,
            _ => false,
        }
    }
}

/// Errores de una sesión individual
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read request payload: {0}")]
    PayloadRead(#[source] FrameError),
    #[error("failed to write reply payload: {0}")]
    PayloadWrite(#[source] FrameError),
}

impl SessionError {
    /// Desconexión del peer (benigna) frente a un fallo real de I/O
    pub fn is_peer_closed(&self) -> bool {
        match self {
            SessionError::PayloadRead(e) | SessionError::PayloadWrite(e) => e.is_peer_closed(),
        }
    }

    /// Payload rechazado por su contenido (no por la red)
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            SessionError::PayloadRead(FrameError::Malformed(_) | FrameError::Truncated { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_closed_classification() {
        assert!(SessionError::PayloadRead(FrameError::PeerClosed).is_peer_closed());
        assert!(SessionError::PayloadWrite(FrameError::PeerClosed).is_peer_closed());
        assert!(!SessionError::PayloadRead(FrameError::TimedOut).is_peer_closed());
    }

    #[test]
    fn test_malformed_classification() {
        let malformed = SessionError::PayloadRead(FrameError::Malformed("bad".to_string()));
        assert!(malformed.is_malformed());
        assert!(!malformed.is_peer_closed());

        let truncated = SessionError::PayloadRead(FrameError::Truncated {
            expected: 4,
            received: 1,
        });
        assert!(truncated.is_malformed());
    }

    #[test]
    fn test_addr_in_use() {
        let error = ServerError::Bind {
            addr: "127.0.0.1:4321".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(error.is_addr_in_use());
        assert!(error.to_string().contains("127.0.0.1:4321"));
        assert!(!ServerError::ShutdownInProgress.is_addr_in_use());
    }
}
