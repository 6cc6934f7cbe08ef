//! The plaintext, structured form of a record on the client side.
//!
//! Four tagged variants share a common header. This is what gets serialized,
//! encrypted, and sent as a `Note.secret_data` blob — the server only ever
//! sees the ciphertext, never this type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields common to every record, regardless of variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub id: Uuid,
    pub name: String,
    pub created_at: i64,
    pub metadata: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub bank: String,
    pub number: String,
    pub expiry: String,
    pub cardholder: String,
    pub security_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binary {
    pub data: Vec<u8>,
}

/// A typed record: one of four shapes, each carrying the common [`Header`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypedRecord {
    #[serde(rename = "CREDENTIAL")]
    Credential { header: Header, fields: Credential },
    #[serde(rename = "TEXT")]
    Text { header: Header, fields: Text },
    #[serde(rename = "CARD")]
    Card { header: Header, fields: Card },
    #[serde(rename = "BINARY")]
    Binary { header: Header, fields: Binary },
}

impl TypedRecord {
    pub fn header(&self) -> &Header {
        match self {
            TypedRecord::Credential { header, .. }
            | TypedRecord::Text { header, .. }
            | TypedRecord::Card { header, .. }
            | TypedRecord::Binary { header, .. } => header,
        }
    }

    /// The wire type tag used in `Note.type`: one of `"CARD"`, `"CREDENTIAL"`,
    /// `"TEXT"`, `"BINARY"`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            TypedRecord::Credential { .. } => "CREDENTIAL",
            TypedRecord::Text { .. } => "TEXT",
            TypedRecord::Card { .. } => "CARD",
            TypedRecord::Binary { .. } => "BINARY",
        }
    }

    /// Serializes to the canonical byte string that gets encrypted before
    /// being sent as `Note.secret_data`.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parses bytes produced by [`to_bytes`] (after decryption).
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header { id: Uuid::new_v4(), name: "sample".into(), created_at: 1_700_000_000, metadata: vec![] }
    }

    #[test]
    fn credential_round_trips_through_json() {
        let record = TypedRecord::Credential {
            header: header(),
            fields: Credential { username: "alice".into(), password: "hunter2".into() },
        };
        let bytes = record.to_bytes().unwrap();
        let parsed = TypedRecord::from_bytes(&bytes).unwrap();
        assert_eq!(record, parsed);
    }

    #[test]
    fn text_round_trips_through_json() {
        let record = TypedRecord::Text { header: header(), fields: Text { body: "hello".into() } };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(TypedRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn card_round_trips_through_json() {
        let record = TypedRecord::Card {
            header: header(),
            fields: Card {
                bank: "First National".into(),
                number: "4111111111111111".into(),
                expiry: "12/30".into(),
                cardholder: "Alice Doe".into(),
                security_code: "123".into(),
            },
        };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(TypedRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn binary_round_trips_through_json() {
        let record =
            TypedRecord::Binary { header: header(), fields: Binary { data: vec![0, 1, 2, 255] } };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(TypedRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn type_tag_matches_wire_vocabulary() {
        let h = header();
        assert_eq!(
            TypedRecord::Credential { header: h.clone(), fields: Credential { username: "".into(), password: "".into() } }
                .type_tag(),
            "CREDENTIAL"
        );
        assert_eq!(TypedRecord::Text { header: h, fields: Text { body: "".into() } }.type_tag(), "TEXT");
    }

    #[test]
    fn from_bytes_rejects_unknown_type_tag() {
        let malformed = br#"{"type":"UNKNOWN","header":{},"fields":{}}"#;
        assert!(TypedRecord::from_bytes(malformed).is_err());
    }
}
