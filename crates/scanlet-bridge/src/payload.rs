//! Binary payload carried inside envelopes.
//!
//! In-process channels move the `Vec<u8>` itself (no copy). Framed stream
//! transports encode it as standard base64 inside the JSON frame.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Image payloads run to megabytes; never dump them into logs.
impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_contents() {
        let p = Payload::from(vec![0u8; 1024]);
        assert_eq!(format!("{:?}", p), "Payload(1024 bytes)");
    }

    #[test]
    fn serializes_as_base64() {
        let p = Payload::from(b"jpeg".as_slice());
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"anBlZw==\"");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = serde_json::from_str::<Payload>("\"not base64!\"");
        assert!(err.is_err());
    }

    #[test]
    fn decodes_base64() {
        let p: Payload = serde_json::from_str("\"AQID\"").unwrap();
        assert_eq!(p.as_slice(), &[1, 2, 3]);
    }
}
