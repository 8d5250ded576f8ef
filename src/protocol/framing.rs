//! # Frames de Longitud Prefijada
//! src/protocol/framing.rs
//!
//! Lectura y escritura de frames `u16` big-endian + modified UTF-8.
//!
//! Diferencias del modified UTF-8 respecto a UTF-8 estándar:
//! - El carácter NUL se codifica en dos bytes (`C0 80`)
//! - Los caracteres fuera del BMP se codifican como dos surrogates
//!   UTF-16 de 3 bytes cada uno (6 bytes en total)

use std::io::{self, Read, Write};
use thiserror::Error;

/// Tamaño máximo del texto codificado dentro de un frame
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Errores de framing, clasificados por tipo de fallo
#[derive(Debug, Error)]
pub enum FrameError {
    /// El peer cerró la conexión limpiamente antes de un nuevo frame
    #[error("peer closed the connection")]
    PeerClosed,
    /// La conexión terminó en medio de un frame
    #[error("connection closed mid-frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },
    #[error("i/o timed out")]
    TimedOut,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    TooLong { len: usize, max: usize },
    #[error("i/o failure: {0}")]
    Io(#[source] io::Error),
}

impl FrameError {
    /// Clasifica un error de I/O según su `ErrorKind`
    pub fn from_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => FrameError::PeerClosed,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => FrameError::TimedOut,
            _ => FrameError::Io(error),
        }
    }

    pub fn is_peer_closed(&self) -> bool {
        matches!(self, FrameError::PeerClosed)
    }
}

/// Escribe un frame completo y hace flush
///
/// # Ejemplo
/// ```
/// use transform_server::protocol::{read_frame, write_frame};
///
/// let mut wire = Vec::new();
/// write_frame(&mut wire, "hola").unwrap();
/// assert_eq!(wire, b"\x00\x04hola");
///
/// let text = read_frame(&mut wire.as_slice()).unwrap();
/// assert_eq!(text, "hola");
/// ```
pub fn write_frame<W: Write>(writer: &mut W, text: &str) -> Result<(), FrameError> {
    let encoded = encode_modified_utf8(text);
    if encoded.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLong {
            len: encoded.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(2 + encoded.len());
    frame.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
    frame.extend_from_slice(&encoded);

    writer.write_all(&frame).map_err(FrameError::from_io)?;
    writer.flush().map_err(FrameError::from_io)
}

/// Lee un frame completo
///
/// Un EOF antes del primer byte es `PeerClosed`; un EOF después es
/// `Truncated`.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<String, FrameError> {
    let mut header = [0u8; 2];
    let received = read_full(reader, &mut header)?;
    if received == 0 {
        return Err(FrameError::PeerClosed);
    }
    if received < header.len() {
        return Err(FrameError::Truncated {
            expected: header.len(),
            received,
        });
    }

    let len = u16::from_be_bytes(header) as usize;
    let mut body = vec![0u8; len];
    let received = read_full(reader, &mut body)?;
    if received < len {
        return Err(FrameError::Truncated {
            expected: len,
            received,
        });
    }

    decode_modified_utf8(&body)
}

/// Lee hasta llenar `buf` o hasta EOF; retorna los bytes leídos
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::from_io(e)),
        }
    }
    Ok(filled)
}

pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, FrameError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 < 0x80 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push(((b0 as u16 & 0x1F) << 6) | (b1 as u16 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push(
                ((b0 as u16 & 0x0F) << 12) | ((b1 as u16 & 0x3F) << 6) | (b2 as u16 & 0x3F),
            );
            i += 3;
        } else {
            return Err(FrameError::Malformed(format!(
                "invalid lead byte 0x{:02x} at offset {}",
                b0, i
            )));
        }
    }

    String::from_utf16(&units)
        .map_err(|_| FrameError::Malformed("unpaired surrogate in payload".to_string()))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u8, FrameError> {
    match bytes.get(index) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b),
        Some(&b) => Err(FrameError::Malformed(format!(
            "invalid continuation byte 0x{:02x} at offset {}",
            b, index
        ))),
        None => Err(FrameError::Malformed(
            "multi-byte sequence cut at end of payload".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(text: &str) -> String {
        let mut wire = Vec::new();
        write_frame(&mut wire, text).unwrap();
        read_frame(&mut Cursor::new(wire)).unwrap()
    }

    // ==================== Encoding ====================

    #[test]
    fn test_ascii_frame_layout() {
        let mut wire = Vec::new();
        write_frame(&mut wire, "terminar").unwrap();
        assert_eq!(&wire[..2], &[0x00, 0x08]);
        assert_eq!(&wire[2..], b"terminar");
    }

    #[test]
    fn test_nul_uses_two_bytes() {
        assert_eq!(encode_modified_utf8("\0"), vec![0xC0, 0x80]);
        assert_eq!(roundtrip("a\0b"), "a\0b");
    }

    #[test]
    fn test_supplementary_char_uses_surrogates() {
        // U+1F600 => D83D DE00 => 6 bytes
        let encoded = encode_modified_utf8("😀");
        assert_eq!(encoded, vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]);
        assert_eq!(roundtrip("hola 😀"), "hola 😀");
    }

    #[test]
    fn test_two_byte_chars() {
        assert_eq!(encode_modified_utf8("ç"), "ç".as_bytes());
        assert_eq!(roundtrip("Confirmação"), "Confirmação");
    }

    #[test]
    fn test_empty_frame() {
        let mut wire = Vec::new();
        write_frame(&mut wire, "").unwrap();
        assert_eq!(wire, vec![0, 0]);
        assert_eq!(roundtrip(""), "");
    }

    #[test]
    fn test_too_long_payload() {
        let text = "a".repeat(MAX_FRAME_LEN + 1);
        let mut wire = Vec::new();
        let result = write_frame(&mut wire, &text);
        assert!(matches!(result, Err(FrameError::TooLong { .. })));
        assert!(wire.is_empty());
    }

    #[test]
    fn test_max_length_payload() {
        let text = "a".repeat(MAX_FRAME_LEN);
        assert_eq!(roundtrip(&text).len(), MAX_FRAME_LEN);
    }

    // ==================== Decoding errors ====================

    #[test]
    fn test_eof_before_header_is_peer_closed() {
        let result = read_frame(&mut Cursor::new(Vec::<u8>::new()));
        assert!(matches!(result, Err(FrameError::PeerClosed)));
    }

    #[test]
    fn test_partial_header_is_truncated() {
        let result = read_frame(&mut Cursor::new(vec![0x00]));
        assert!(matches!(
            result,
            Err(FrameError::Truncated { expected: 2, received: 1 })
        ));
    }

    #[test]
    fn test_partial_body_is_truncated() {
        let result = read_frame(&mut Cursor::new(b"\x00\x05ab".to_vec()));
        assert!(matches!(
            result,
            Err(FrameError::Truncated { expected: 5, received: 2 })
        ));
    }

    #[test]
    fn test_invalid_lead_byte() {
        let result = decode_modified_utf8(&[0x61, 0xFF]);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_cut_multibyte_sequence() {
        let result = decode_modified_utf8(&[0xE0, 0x80]);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_lone_surrogate_rejected() {
        let result = decode_modified_utf8(&[0xED, 0xA0, 0xBD]);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_sequential_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, "uno").unwrap();
        write_frame(&mut wire, "dos").unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_frame(&mut cursor).unwrap(), "uno");
        assert_eq!(read_frame(&mut cursor).unwrap(), "dos");
        assert!(read_frame(&mut cursor).unwrap_err().is_peer_closed());
    }

    // ==================== Error classification ====================

    #[test]
    fn test_io_error_classification() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(FrameError::from_io(reset).is_peer_closed());

        let timeout = io::Error::from(io::ErrorKind::WouldBlock);
        assert!(matches!(FrameError::from_io(timeout), FrameError::TimedOut));

        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(FrameError::from_io(other), FrameError::Io(_)));
    }
}
