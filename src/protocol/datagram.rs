//! # Payloads de Datagramas
//! src/protocol/datagram.rs
//!
//! Un datagrama es UTF-8 plano. Se recorta el espacio en blanco de los
//! extremos, así clientes que envían la línea leída de consola (con `\n`)
//! obtienen la misma respuesta que los que no.

use super::framing::FrameError;

/// Decodifica el payload de un datagrama recibido
///
/// `truncated` indica que el datagrama no cupo en el buffer de recepción;
/// en ese caso el payload está incompleto y se rechaza.
pub fn decode_datagram(bytes: &[u8], truncated: bool) -> Result<String, FrameError> {
    if truncated {
        return Err(FrameError::Malformed(format!(
            "datagram larger than the {} byte receive buffer",
            bytes.len()
        )));
    }

    std::str::from_utf8(bytes)
        .map(|text| text.trim().to_string())
        .map_err(|e| FrameError::Malformed(format!("invalid UTF-8 in datagram: {}", e)))
}
