//! # Transformaciones de Payload
//! src/transform/mod.rs
//!
//! Cada transformación es una función pura `&str -> String` sin estado
//! interno. El servidor no sabe qué hace la transformación: solo la aplica
//! al payload recibido y devuelve el resultado al mismo peer.
//!
//! ## Transformaciones disponibles
//!
//! | Nombre    | Entrada   | Salida                               |
//! |-----------|-----------|--------------------------------------|
//! | `echo`    | `"xyz"`   | `"xyz"`                              |
//! | `reverse` | `"hello"` | `"olleh"`                            |
//! | `upper`   | `"abc"`   | `"ABC"`                              |
//! | `lower`   | `"ABC"`   | `"abc"`                              |
//! | `sha256`  | `"abc"`   | `"ba7816bf..."` (hex, 64 caracteres) |
//! | `ack`     | cualquier | `"Mensaje recibido por el servidor"` |

use clap::ValueEnum;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Firma de una función de transformación
pub type TransformFn = fn(&str) -> String;

/// Transformación con nombre, lista para compartir entre threads
///
/// Es `Copy`: cada sesión recibe su propia copia sin `Arc`.
#[derive(Clone, Copy)]
pub struct Transform {
    name: &'static str,
    func: TransformFn,
}

impl Transform {
    /// Crea una transformación a partir de una función pura
    ///
    /// # Ejemplo
    /// ```
    /// use transform_server::transform::Transform;
    ///
    /// fn twice(input: &str) -> String {
    ///     input.repeat(2)
    /// }
    ///
    /// let transform = Transform::new("twice", twice);
    /// assert_eq!(transform.apply("ab"), "abab");
    /// ```
    pub const fn new(name: &'static str, func: TransformFn) -> Self {
        Self { name, func }
    }

    /// Aplica la transformación al payload
    pub fn apply(&self, payload: &str) -> String {
        (self.func)(payload)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// Transformaciones seleccionables desde la configuración
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Devuelve el payload sin cambios
    Echo,
    /// Invierte el texto (por caracteres, no por bytes)
    Reverse,
    /// Convierte a mayúsculas
    Upper,
    /// Convierte a minúsculas
    Lower,
    /// Digest SHA-256 en hexadecimal
    Sha256,
    /// Confirmación fija, ignora el contenido del payload
    Ack,
}

impl TransformKind {
    pub fn transform(self) -> Transform {
        match self {
            TransformKind::Echo => Transform::new("echo", echo),
            TransformKind::Reverse => Transform::new("reverse", reverse),
            TransformKind::Upper => Transform::new("upper", upper),
            TransformKind::Lower => Transform::new("lower", lower),
            TransformKind::Sha256 => Transform::new("sha256", sha256_hex),
            TransformKind::Ack => Transform::new("ack", ack),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.transform().name())
    }
}

pub fn echo(input: &str) -> String {
    input.to_string()
}

/// Invierte el texto manejando correctamente caracteres UTF-8
pub fn reverse(input: &str) -> String {
    input.chars().rev().collect()
}

pub fn upper(input: &str) -> String {
    input.to_uppercase()
}

pub fn lower(input: &str) -> String {
    input.to_lowercase()
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Respuesta de la transformación `ack`
pub const ACK_REPLY: &str = "Mensaje recibido por el servidor";

pub fn ack(_input: &str) -> String {
    ACK_REPLY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TransformKind::Reverse, "hello", "olleh")]
    #[case(TransformKind::Upper, "abc", "ABC")]
    #[case(TransformKind::Echo, "xyz", "xyz")]
    #[case(TransformKind::Lower, "MiXeD", "mixed")]
    fn test_transform_kinds(
        #[case] kind: TransformKind,
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(kind.transform().apply(input), expected);
    }

    #[test]
    fn test_reverse_utf8() {
        assert_eq!(reverse("ação"), "oãça");
        assert_eq!(reverse("hello world"), "dlrow olleh");
    }

    #[test]
    fn test_reverse_empty() {
        assert_eq!(reverse(""), "");
    }

    #[test]
    fn test_upper_non_ascii() {
        assert_eq!(upper("straße"), "STRASSE");
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[rstest]
    #[case("hola")]
    #[case("")]
    #[case("terminar")]
    fn test_ack_ignores_payload(#[case] input: &str) {
        assert_eq!(TransformKind::Ack.transform().apply(input), ACK_REPLY);
    }

    #[test]
    fn test_transform_names() {
        assert_eq!(TransformKind::Reverse.transform().name(), "reverse");
        assert_eq!(TransformKind::Sha256.to_string(), "sha256");
        assert_eq!(TransformKind::Ack.to_string(), "ack");
    }

    #[test]
    fn test_custom_transform() {
        fn shout(input: &str) -> String {
            format!("{}!", input.to_uppercase())
        }

        let transform = Transform::new("shout", shout);
        assert_eq!(transform.apply("hola"), "HOLA!");
        assert!(format!("{:?}", transform).contains("shout"));
    }
}
