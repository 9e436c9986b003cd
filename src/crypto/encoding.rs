//! Serde helpers for byte fields: hex strings for human-readable formats,
//! raw bytes for binary ones.

use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize_array<S: Serializer, const N: usize>(
    bytes: &[u8; N],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serialize_bytes(bytes, serializer)
}

pub fn deserialize_array<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
) -> Result<[u8; N], D::Error> {
    let v = deserialize_bytes(deserializer)?;
    v.try_into()
        .map_err(|v: Vec<u8>| de::Error::custom(format!("expected {} bytes, got {}", N, v.len())))
}

pub fn serialize_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.serialize_str(&hex::encode(bytes))
    } else {
        serializer.serialize_bytes(bytes)
    }
}

pub fn deserialize_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    if deserializer.is_human_readable() {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(de::Error::custom)
    } else {
        Vec::<u8>::deserialize(deserializer)
    }
}

/// `#[serde(with = "crate::crypto::encoding::hex_vec")]` for `Vec<u8>` fields.
pub mod hex_vec {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        super::serialize_bytes(bytes, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        super::deserialize_bytes(deserializer)
    }
}
