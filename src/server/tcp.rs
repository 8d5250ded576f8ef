//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Implementacion del modo orientado a conexión: cada conexión aceptada
//! se procesa en su propio thread. El listener se crea con `socket2` para
//! poder fijar el backlog de conexiones pendientes.

use super::dispatcher::{resolve, Acceptor, Dispatcher, DISPATCH_TARGET};
use super::session::{run_exchange, Session, SessionContext, SessionSummary};
use crate::config::{Config, ServerMode};
use crate::error::{ServerError, SessionError};
use crate::protocol::FrameError;
use crate::shutdown::WakeTarget;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use tracing::debug;

/// Servidor TCP: dispatcher sobre un `TcpAcceptor`
pub type TcpServer = Dispatcher<TcpAcceptor>;

impl TcpServer {
    /// Enlaza el listener según la configuración
    ///
    /// Falla con `ServerError::Bind` si el puerto está en uso o no hay
    /// permisos.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = resolve(&config.host, config.effective_port())?;
        let acceptor = TcpAcceptor::bind(addr, config.backlog)?;
        Ok(Dispatcher::new(acceptor, config))
    }
}

/// Listener TCP dueño del endpoint
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, ServerError> {
        let bind_error = |source: io::Error| ServerError::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_error)?;
        // SO_REUSEADDR permite reiniciar sobre conexiones en TIME_WAIT; un
        // listener activo en el mismo puerto sigue dando AddrInUse
        #[cfg(unix)]
        socket.set_reuse_address(true).map_err(bind_error)?;
        socket.bind(&addr.into()).map_err(bind_error)?;
        let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
        socket.listen(backlog).map_err(bind_error)?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr().map_err(bind_error)?;
        Ok(Self {
            listener,
            local_addr,
        })
    }
}

impl Acceptor for TcpAcceptor {
    type Unit = TcpUnit;

    fn next_unit(&mut self) -> io::Result<Option<TcpUnit>> {
        let (stream, peer) = self.listener.accept()?;
        Ok(Some(TcpUnit { stream, peer }))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn mode(&self) -> ServerMode {
        ServerMode::Tcp
    }

    fn wake_target(&self) -> WakeTarget {
        WakeTarget::Stream(self.local_addr)
    }
}

/// Una conexión aceptada
#[derive(Debug)]
pub struct TcpUnit {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Session for TcpUnit {
    fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn process(mut self, ctx: &SessionContext) -> Result<SessionSummary, SessionError> {
        let timeout = ctx.settings.io_timeout;
        self.stream
            .set_read_timeout(timeout)
            .map_err(|e| SessionError::PayloadRead(FrameError::from_io(e)))?;
        self.stream
            .set_write_timeout(timeout)
            .map_err(|e| SessionError::PayloadWrite(FrameError::from_io(e)))?;

        let result = run_exchange(&mut self.stream, &ctx.settings);

        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            if error.kind() != io::ErrorKind::NotConnected {
                debug!(
                    target: DISPATCH_TARGET,
                    seq = ctx.seq,
                    error = %error,
                    "error al cerrar el socket"
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeMode;
    use crate::protocol::{read_frame, write_frame};
    use crate::server::session::{SessionEnd, SessionSettings};
    use crate::transform::TransformKind;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn ephemeral_config() -> Config {
        Config {
            port: Some(0),
            ..Config::default()
        }
    }

    fn accept_one(listener: &TcpListener) -> TcpUnit {
        let (stream, peer) = listener.accept().unwrap();
        TcpUnit { stream, peer }
    }

    fn context(
        peer: SocketAddr,
        exchange: ExchangeMode,
        io_timeout: Option<Duration>,
    ) -> SessionContext {
        SessionContext {
            seq: 1,
            peer,
            settings: Arc::new(SessionSettings {
                transform: TransformKind::Reverse.transform(),
                exchange,
                termination_token: "terminar".to_string(),
                io_timeout,
            }),
        }
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let server = TcpServer::bind(&ephemeral_config()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.local_addr().ip().is_loopback());
    }

    #[test]
    fn test_bind_port_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = Config {
            port: Some(taken.local_addr().unwrap().port()),
            ..Config::default()
        };

        let error = TcpServer::bind(&config).err().unwrap();
        assert!(error.is_addr_in_use(), "unexpected error: {}", error);
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let config = Config {
            backlog: 0,
            ..ephemeral_config()
        };
        assert!(matches!(TcpServer::bind(&config), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_bind_unresolvable_host() {
        let config = Config {
            host: "host.invalid".to_string(),
            ..ephemeral_config()
        };
        assert!(matches!(
            TcpServer::bind(&config),
            Err(ServerError::Resolve { .. }) | Err(ServerError::ResolveEmpty { .. })
        ));
    }

    #[test]
    fn test_process_one_shot() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            write_frame(&mut stream, "hello").unwrap();
            let reply = read_frame(&mut stream).unwrap();
            // El servidor cierra después de la respuesta
            let after = read_frame(&mut stream);
            (reply, after.unwrap_err().is_peer_closed())
        });

        let unit = accept_one(&listener);
        let ctx = context(unit.peer(), ExchangeMode::OneShot, None);
        let summary = unit.process(&ctx).unwrap();

        assert_eq!(summary.end, SessionEnd::Replied);
        let (reply, closed) = client.join().unwrap();
        assert_eq!(reply, "olleh");
        assert!(closed);
    }

    #[test]
    fn test_process_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Cliente que conecta y no envía nada
        let client = TcpStream::connect(addr).unwrap();

        let unit = accept_one(&listener);
        let ctx = context(
            unit.peer(),
            ExchangeMode::Interactive,
            Some(Duration::from_millis(100)),
        );
        let error = unit.process(&ctx).unwrap_err();

        assert!(matches!(error, SessionError::PayloadRead(FrameError::TimedOut)));
        drop(client);
    }
}
