//! Payload serialization.
//!
//! A [`Serializer`] turns typed payloads into body bytes and back. The
//! default wire representation is MessagePack with named struct fields,
//! which keeps payloads self-describing across schema evolution.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Converts typed payloads to and from body bytes.
///
/// Implementations are stateless and cheap to copy; a serializer is
/// folded into each typed command at registration, so the pairing of
/// command and format is fixed up front.
pub trait Serializer: Clone + Send + Sync + 'static {
    /// Stable name identifying the format, e.g. `"msgpack"`.
    fn name(&self) -> &'static str;

    /// Serialize a payload into body bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a payload from body bytes.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// MessagePack serializer using named (map-style) struct encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

impl Serializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: u32,
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn msgpack_roundtrip() {
        let s = MsgPackSerializer;
        let value = Sample {
            id: 7,
            name: "player".into(),
            tags: vec!["a".into(), "b".into()],
        };
        let bytes = s.serialize(&value).unwrap();
        let back: Sample = s.deserialize(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn named_fields_survive_reordering() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Reordered {
            name: String,
            id: u32,
            #[serde(default)]
            tags: Vec<String>,
        }

        let s = MsgPackSerializer;
        let bytes = s
            .serialize(&Sample {
                id: 3,
                name: "x".into(),
                tags: vec![],
            })
            .unwrap();
        let back: Reordered = s.deserialize(&bytes).unwrap();
        assert_eq!(back.id, 3);
        assert_eq!(back.name, "x");
    }

    #[test]
    fn malformed_bytes_fail() {
        let s = MsgPackSerializer;
        let result: Result<Sample> = s.deserialize(&[0xC1, 0xFF, 0x00]);
        assert!(result.is_err());
    }
}
