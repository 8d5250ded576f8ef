//! # Cliente
//! src/client/mod.rs
//!
//! Clientes para ambos modos del servidor:
//! - `TcpClient`: conexión persistente, un frame por petición
//! - `udp_request`: un datagrama de ida, uno de vuelta
//! - `run_console`: sesión interactiva leyendo líneas de la consola

use crate::config::ConfigError;
use crate::protocol::{read_frame, write_frame, FrameError};
use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("reply is not valid UTF-8")]
    Malformed,
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),
}

fn resolve(addr: &str) -> Result<SocketAddr, ClientError> {
    let connect_error = |source: io::Error| ClientError::Connect {
        addr: addr.to_string(),
        source,
    };
    addr.to_socket_addrs()
        .map_err(connect_error)?
        .next()
        .ok_or_else(|| connect_error(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}

/// Cliente TCP de frames
#[derive(Debug)]
pub struct TcpClient {
    stream: TcpStream,
}

impl TcpClient {
    /// Conecta con timeout; el mismo timeout aplica a lecturas y escrituras
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        let target = resolve(addr)?;
        let stream =
            TcpStream::connect_timeout(&target, timeout).map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self { stream })
    }

    /// Envía un payload y espera la respuesta
    pub fn request(&mut self, payload: &str) -> Result<String, ClientError> {
        write_frame(&mut self.stream, payload)?;
        Ok(read_frame(&mut self.stream)?)
    }

    /// Envía cada mensaje en orden y devuelve las respuestas
    ///
    /// Se detiene después del token de terminación, si aparece.
    pub fn exchange_all<S: AsRef<str>>(
        &mut self,
        messages: &[S],
        termination_token: &str,
    ) -> Result<Vec<String>, ClientError> {
        let mut replies = Vec::with_capacity(messages.len());
        for message in messages {
            let message = message.as_ref();
            replies.push(self.request(message)?);
            if is_token(message, termination_token) {
                break;
            }
        }
        Ok(replies)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }
}

fn is_token(message: &str, token: &str) -> bool {
    message.trim().to_lowercase() == token.trim().to_lowercase()
}

/// Envía un datagrama y espera la respuesta
pub fn udp_request(addr: &str, payload: &str, timeout: Duration) -> Result<String, ClientError> {
    let target = resolve(addr)?;
    let local: SocketAddr = if target.is_ipv4() {
        "0.0.0.0:0".parse().map_err(|_| ClientError::Malformed)?
    } else {
        "[::]:0".parse().map_err(|_| ClientError::Malformed)?
    };

    let socket = UdpSocket::bind(local)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.send_to(payload.as_bytes(), target)?;

    let mut buffer = vec![0u8; crate::config::MAX_UDP_PAYLOAD];
    let (len, _) = socket.recv_from(&mut buffer)?;
    String::from_utf8(buffer[..len].to_vec()).map_err(|_| ClientError::Malformed)
}

/// Sesión interactiva: cada línea leída se envía y se imprime la respuesta
///
/// Termina al enviar el token de terminación o al llegar EOF en la entrada.
/// Retorna la cantidad de mensajes intercambiados.
pub fn run_console<R: BufRead, W: Write>(
    client: &mut TcpClient,
    input: R,
    mut output: W,
    termination_token: &str,
) -> Result<usize, ClientError> {
    let mut exchanged = 0;
    writeln!(output, "Escriba mensajes (\"{}\" para terminar):", termination_token)?;

    for line in input.lines() {
        let line = line?;
        let reply = client.request(&line)?;
        exchanged += 1;
        writeln!(output, "Servidor: {}", reply)?;

        if is_token(&line, termination_token) {
            break;
        }
    }
    Ok(exchanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;

    /// Servidor de eco mínimo para ejercitar el cliente
    fn echo_server(exchanges: usize) -> (SocketAddr, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            for _ in 0..exchanges {
                let request = read_frame(&mut stream).unwrap();
                write_frame(&mut stream, &format!("eco:{}", request)).unwrap();
                seen.push(request);
            }
            seen
        });
        (addr, handle)
    }

    #[test]
    fn test_exchange_all_stops_at_token() {
        let (addr, server) = echo_server(2);
        let mut client = TcpClient::connect(&addr.to_string(), Duration::from_secs(2)).unwrap();

        let replies = client
            .exchange_all(&["hola", "TERMINAR", "nunca"], "terminar")
            .unwrap();

        assert_eq!(replies, vec!["eco:hola", "eco:TERMINAR"]);
        assert_eq!(server.join().unwrap(), vec!["hola", "TERMINAR"]);
    }

    #[test]
    fn test_console_session() {
        let (addr, server) = echo_server(2);
        let mut client = TcpClient::connect(&addr.to_string(), Duration::from_secs(2)).unwrap();

        let input = Cursor::new("primera\nterminar\nignorada\n");
        let mut output = Vec::new();
        let exchanged = run_console(&mut client, input, &mut output, "terminar").unwrap();

        assert_eq!(exchanged, 2);
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Escriba mensajes (\"terminar\" para terminar):"));
        assert!(text.contains("Servidor: eco:primera"));
        assert!(text.contains("Servidor: eco:terminar"));
        assert!(!text.contains("ignorada"));
        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let result = TcpClient::connect(&addr.to_string(), Duration::from_millis(500));
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[test]
    fn test_udp_request_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let responder = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (n, peer) = server.recv_from(&mut buf).unwrap();
            let reversed: String = String::from_utf8_lossy(&buf[..n]).chars().rev().collect();
            server.send_to(reversed.as_bytes(), peer).unwrap();
        });

        let reply = udp_request(&addr.to_string(), "hello", Duration::from_secs(2)).unwrap();
        assert_eq!(reply, "olleh");
        responder.join().unwrap();
    }

    #[test]
    fn test_udp_request_timeout() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();

        let result = udp_request(&addr.to_string(), "hello", Duration::from_millis(100));
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
