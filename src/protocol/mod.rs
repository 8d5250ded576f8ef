//! # Protocolo de Red
//! src/protocol/mod.rs
//!
//! Formato de los payloads en ambos modos del servidor.
//!
//! ### Modo TCP (orientado a conexión)
//!
//! Cada mensaje viaja como un frame compatible con `writeUTF`/`readUTF`
//! de Java: longitud en 2 bytes big-endian seguida del texto en
//! *modified UTF-8*.
//!
//! ```text
//! +--------+--------+---------------------------+
//! | len hi | len lo | texto (len bytes)         |
//! +--------+--------+---------------------------+
//! ```
//!
//! ### Modo UDP (sin conexión)
//!
//! Un datagrama de entrada con texto UTF-8, un datagrama de salida hacia
//! la dirección y puerto de origen.

pub mod datagram;
pub mod framing;

pub use datagram::decode_datagram;
pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_LEN};
