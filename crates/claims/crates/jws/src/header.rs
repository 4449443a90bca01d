use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use sdkit_jwk::{Algorithm, JWK};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Base64DecodeError;

/// JWS protected header.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Header {
    #[serde(rename = "alg")]
    pub algorithm: Algorithm,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<JWK>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "kid")]
    pub key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "typ")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "cty")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "crit")]
    pub critical: Option<Vec<String>>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde(flatten)]
    pub additional_parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidHeader {
    #[error(transparent)]
    Base64(#[from] Base64DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Header {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    /// Decode a JWS Protected Header.
    pub fn decode(base_64: &[u8]) -> Result<Self, InvalidHeader> {
        let header_json = BASE64_URL_SAFE_NO_PAD.decode(base_64)?;
        Ok(serde_json::from_slice(&header_json)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(json).into_bytes())
    }

    /// Returns the signing bytes for the given payload: the encoded header
    /// and the encoded payload separated by a period.
    pub fn encode_signing_bytes(&self, payload: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
        let mut result = self.encode()?;
        result.push(b'.');
        result.extend(BASE64_URL_SAFE_NO_PAD.encode(payload).into_bytes());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let header = Header {
            type_: Some("kb+jwt".to_owned()),
            ..Header::new(Algorithm::ES256)
        };

        let encoded = header.encode().unwrap();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(decoded, header);

        let json: serde_json::Value =
            serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(&encoded).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "alg": "ES256", "typ": "kb+jwt" }));
    }

    #[test]
    fn unknown_parameters_are_kept() {
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"ES384","x-custom":1}"#);
        let header = Header::decode(encoded.as_bytes()).unwrap();
        assert_eq!(header.algorithm, Algorithm::ES384);
        assert_eq!(header.additional_parameters["x-custom"], 1);
    }
}
