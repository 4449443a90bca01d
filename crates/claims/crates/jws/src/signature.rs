use sdkit_claims_core::SignatureError;
use sdkit_jwk::{Algorithm, JWK};
use serde::Serialize;
use std::borrow::Cow;

use crate::{Header, JwsBuf};

/// Bytes signed as a JWS payload, with the `typ` header they call for.
pub trait JwsPayload {
    fn typ(&self) -> Option<&str> {
        None
    }

    fn payload_bytes(&self) -> Cow<[u8]>;
}

impl<P: ?Sized + JwsPayload> JwsPayload for &P {
    fn typ(&self) -> Option<&str> {
        P::typ(*self)
    }

    fn payload_bytes(&self) -> Cow<[u8]> {
        P::payload_bytes(*self)
    }
}

impl JwsPayload for Vec<u8> {
    fn payload_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(self)
    }
}

impl JwsPayload for String {
    fn payload_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

/// JSON payload, serialized ahead of signing.
#[derive(Debug, Clone)]
pub struct JsonPayload {
    typ: Option<String>,
    bytes: Vec<u8>,
}

impl JsonPayload {
    pub fn new<T: ?Sized + Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(|bytes| Self { typ: None, bytes })
    }

    /// Sets the `typ` header parameter used when signing this payload.
    pub fn with_typ(self, typ: impl Into<String>) -> Self {
        Self {
            typ: Some(typ.into()),
            ..self
        }
    }
}

impl JwsPayload for JsonPayload {
    fn typ(&self) -> Option<&str> {
        self.typ.as_deref()
    }

    fn payload_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(&self.bytes)
    }
}

/// What a signer puts in the JWS header.
pub struct JwsSignerInfo {
    pub key_id: Option<String>,
    pub algorithm: Algorithm,
}

/// Signing capability.
///
/// The key material may live elsewhere (remote service, hardware module):
/// only `fetch_info` and `sign_bytes` are required.
pub trait JwsSigner {
    #[allow(async_fn_in_trait)]
    async fn fetch_info(&self) -> Result<JwsSignerInfo, SignatureError>;

    #[allow(async_fn_in_trait)]
    async fn sign_bytes(&self, signing_bytes: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Signs `payload` into a compact JWS.
    #[allow(async_fn_in_trait)]
    async fn sign(&self, payload: impl JwsPayload) -> Result<JwsBuf, SignatureError> {
        let JwsSignerInfo { key_id, algorithm } = self.fetch_info().await?;

        let header = Header {
            key_id,
            type_: payload.typ().map(str::to_owned),
            ..Header::new(algorithm)
        };

        let signing_bytes = header
            .encode_signing_bytes(&payload.payload_bytes())
            .map_err(SignatureError::other)?;
        let signature = self.sign_bytes(&signing_bytes).await?;

        JwsBuf::from_signing_bytes_and_signature(signing_bytes, &signature)
            .map_err(SignatureError::other)
    }
}

impl<T: JwsSigner> JwsSigner for &T {
    async fn fetch_info(&self) -> Result<JwsSignerInfo, SignatureError> {
        T::fetch_info(*self).await
    }

    async fn sign_bytes(&self, signing_bytes: &[u8]) -> Result<Vec<u8>, SignatureError> {
        T::sign_bytes(*self, signing_bytes).await
    }
}

impl JwsSigner for JWK {
    async fn fetch_info(&self) -> Result<JwsSignerInfo, SignatureError> {
        let algorithm = self
            .get_algorithm()
            .ok_or(SignatureError::MissingAlgorithm)?;

        Ok(JwsSignerInfo {
            key_id: self.key_id.clone(),
            algorithm,
        })
    }

    async fn sign_bytes(&self, signing_bytes: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let algorithm = self
            .get_algorithm()
            .ok_or(SignatureError::MissingAlgorithm)?;
        crate::sign_bytes(algorithm, signing_bytes, self)
    }
}
