//! # Servidor UDP Concurrente
//! src/server/udp.rs
//!
//! Modo sin conexión: cada datagrama recibido es una unidad de trabajo que
//! se procesa en su propio thread. La respuesta sale por el mismo socket
//! hacia la dirección y puerto de origen del datagrama.

use super::dispatcher::{resolve, Acceptor, Dispatcher};
use super::session::{Session, SessionContext, SessionEnd, SessionSummary};
use crate::config::{Config, ServerMode};
use crate::error::{ServerError, SessionError};
use crate::protocol::{decode_datagram, FrameError};
use crate::shutdown::WakeTarget;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// Cada cuánto el loop revisa el flag de apagado sin tráfico
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Servidor UDP: dispatcher sobre un `UdpAcceptor`
pub type UdpServer = Dispatcher<UdpAcceptor>;

impl UdpServer {
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = resolve(&config.host, config.effective_port())?;
        let acceptor = UdpAcceptor::bind(addr, config.max_datagram)?;
        Ok(Dispatcher::new(acceptor, config))
    }
}

/// Socket UDP dueño del endpoint
///
/// Las sesiones comparten el socket (vía `Arc`) solo para enviar su
/// respuesta.
#[derive(Debug)]
pub struct UdpAcceptor {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    buffer: Vec<u8>,
    max_datagram: usize,
}

impl UdpAcceptor {
    pub fn bind(addr: SocketAddr, max_datagram: usize) -> Result<Self, ServerError> {
        let bind_error = |source: io::Error| ServerError::Bind { addr, source };

        let socket = UdpSocket::bind(addr).map_err(bind_error)?;
        socket
            .set_read_timeout(Some(SHUTDOWN_POLL))
            .map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            // Un byte extra para detectar datagramas que no caben
            buffer: vec![0u8; max_datagram + 1],
            max_datagram,
        })
    }
}

impl Acceptor for UdpAcceptor {
    type Unit = Datagram;

    fn next_unit(&mut self) -> io::Result<Option<Datagram>> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((len, peer)) => {
                let truncated = len > self.max_datagram;
                let payload = self.buffer[..len.min(self.max_datagram)].to_vec();
                Ok(Some(Datagram {
                    payload,
                    truncated,
                    peer,
                    socket: Arc::clone(&self.socket),
                }))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn mode(&self) -> ServerMode {
        ServerMode::Udp
    }

    fn wake_target(&self) -> WakeTarget {
        WakeTarget::Datagram(self.local_addr)
    }
}

/// Un datagrama recibido junto con su camino de respuesta
#[derive(Debug)]
pub struct Datagram {
    payload: Vec<u8>,
    truncated: bool,
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
}

impl Session for Datagram {
    fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn process(self, ctx: &SessionContext) -> Result<SessionSummary, SessionError> {
        let request =
            decode_datagram(&self.payload, self.truncated).map_err(SessionError::PayloadRead)?;
        let reply = ctx.settings.transform.apply(&request);

        self.socket
            .send_to(reply.as_bytes(), self.peer)
            .map_err(|e| SessionError::PayloadWrite(FrameError::from_io(e)))?;

        Ok(SessionSummary {
            exchanges: 1,
            end: SessionEnd::Replied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeMode;
    use crate::server::session::SessionSettings;
    use crate::transform::TransformKind;

    fn context(peer: SocketAddr) -> SessionContext {
        SessionContext {
            seq: 7,
            peer,
            settings: Arc::new(SessionSettings {
                transform: TransformKind::Upper.transform(),
                exchange: ExchangeMode::OneShot,
                termination_token: "terminar".to_string(),
                io_timeout: None,
            }),
        }
    }

    fn client_socket() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        socket
    }

    #[test]
    fn test_bind_port_in_use() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = Config {
            mode: ServerMode::Udp,
            port: Some(taken.local_addr().unwrap().port()),
            ..Config::default()
        };

        let error = UdpServer::bind(&config).err().unwrap();
        assert!(error.is_addr_in_use(), "unexpected error: {}", error);
    }

    #[test]
    fn test_next_unit_times_out_without_traffic() {
        let mut acceptor = UdpAcceptor::bind("127.0.0.1:0".parse().unwrap(), 64).unwrap();
        assert!(acceptor.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_datagram_reply_goes_to_source() {
        let mut acceptor = UdpAcceptor::bind("127.0.0.1:0".parse().unwrap(), 64).unwrap();
        let client = client_socket();
        client.send_to(b"abc", acceptor.local_addr()).unwrap();

        let unit = acceptor.next_unit().unwrap().unwrap();
        assert_eq!(unit.peer(), client.local_addr().unwrap());
        let ctx = context(unit.peer());
        unit.process(&ctx).unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ABC");
        assert_eq!(from, acceptor.local_addr());
    }

    #[test]
    fn test_oversized_datagram_is_malformed() {
        let mut acceptor = UdpAcceptor::bind("127.0.0.1:0".parse().unwrap(), 4).unwrap();
        let client = client_socket();
        client.send_to(b"too long", acceptor.local_addr()).unwrap();

        let unit = acceptor.next_unit().unwrap().unwrap();
        assert!(unit.truncated);
        let ctx = context(unit.peer());
        let error = unit.process(&ctx).unwrap_err();
        assert!(error.is_malformed());
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut acceptor = UdpAcceptor::bind("127.0.0.1:0".parse().unwrap(), 64).unwrap();
        let client = client_socket();
        client.send_to(&[0xFF, 0xFE], acceptor.local_addr()).unwrap();

        let unit = acceptor.next_unit().unwrap().unwrap();
        let ctx = context(unit.peer());
        assert!(unit.process(&ctx).unwrap_err().is_malformed());
    }
}
