//! JSON Web Signature ([RFC 7515]) in compact serialization.
//!
//! Only the elliptic curve algorithms used by SD-JWT issuers and holders are
//! implemented here (`ES256`, `ES384`), each behind its own curve feature.
//!
//! [RFC 7515]: <https://datatracker.ietf.org/doc/html/rfc7515>
use sdkit_claims_core::SignatureError;
use sdkit_jwk::{Algorithm, ECParams, Params, JWK};
use serde::de::DeserializeOwned;

pub mod utils;

mod compact;
pub use compact::*;

mod header;
pub use header::*;

mod signature;
pub use signature::*;

mod verification;
pub use verification::*;

/// Decoded JWS.
///
/// Keeps the original signing bytes so the signature can be checked without
/// re-encoding the header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedJws<T = Vec<u8>> {
    pub signing_bytes: Vec<u8>,
    pub header: Header,
    pub payload: T,
    pub signature: Vec<u8>,
}

impl<T> DecodedJws<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DecodedJws<U> {
        DecodedJws {
            signing_bytes: self.signing_bytes,
            header: self.header,
            payload: f(self.payload),
            signature: self.signature,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<DecodedJws<U>, E> {
        Ok(DecodedJws {
            signing_bytes: self.signing_bytes,
            header: self.header,
            payload: f(self.payload)?,
            signature: self.signature,
        })
    }

    /// Re-encodes this JWS using its original signing bytes.
    pub fn into_encoded(self) -> Result<JwsBuf, InvalidJws<Vec<u8>>> {
        JwsBuf::from_signing_bytes_and_signature(self.signing_bytes, &self.signature)
    }
}

impl DecodedJws<Vec<u8>> {
    /// Deserializes the payload as JSON.
    pub fn decode_json<U: DeserializeOwned>(self) -> Result<DecodedJws<U>, serde_json::Error> {
        self.try_map(|bytes| serde_json::from_slice(&bytes))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid header: {0}")]
    Header(InvalidHeader),

    #[error("invalid payload: {0}")]
    Payload(Base64DecodeError),

    #[error("invalid signature: {0}")]
    Signature(Base64DecodeError),
}

fn ec_params(key: &JWK) -> Result<&ECParams, SignatureError> {
    match &key.params {
        Params::EC(params) => Ok(params),
        _ => Err(SignatureError::UnsupportedAlgorithm(
            "non-EC key".to_owned(),
        )),
    }
}

fn check_key_curve(algorithm: Algorithm, params: &ECParams) -> Result<(), SignatureError> {
    if algorithm.curve().is_some() && algorithm.curve() != params.curve.as_deref() {
        return Err(SignatureError::AlgorithmMismatch);
    }

    Ok(())
}

/// Signs `data` with the given private key, returning the raw (`r || s`)
/// signature.
pub fn sign_bytes(algorithm: Algorithm, data: &[u8], key: &JWK) -> Result<Vec<u8>, SignatureError> {
    let params = ec_params(key)?;
    check_key_curve(algorithm, params)?;

    match algorithm {
        #[cfg(feature = "secp256r1")]
        Algorithm::ES256 => {
            use p256::ecdsa::signature::Signer;
            let secret_key = p256::SecretKey::try_from(params)
                .map_err(|_| SignatureError::InvalidSecretKey)?;
            let signing_key = p256::ecdsa::SigningKey::from(secret_key);
            let signature: p256::ecdsa::Signature = signing_key
                .try_sign(data)
                .map_err(SignatureError::other)?;
            Ok(signature.to_bytes().to_vec())
        }
        #[cfg(feature = "secp384r1")]
        Algorithm::ES384 => {
            use p384::ecdsa::signature::Signer;
            let secret_key = p384::SecretKey::try_from(params)
                .map_err(|_| SignatureError::InvalidSecretKey)?;
            let signing_key = p384::ecdsa::SigningKey::from(secret_key);
            let signature: p384::ecdsa::Signature = signing_key
                .try_sign(data)
                .map_err(SignatureError::other)?;
            Ok(signature.to_bytes().to_vec())
        }
        other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Verifies a raw (`r || s`) signature of `data` with the given public key.
///
/// A malformed or non-matching signature yields `Ok(false)`. Errors are
/// reserved for unusable keys and unsupported algorithms.
pub fn verify_bytes(
    algorithm: Algorithm,
    data: &[u8],
    key: &JWK,
    signature: &[u8],
) -> Result<bool, SignatureError> {
    let params = ec_params(key)?;
    check_key_curve(algorithm, params)?;

    match algorithm {
        #[cfg(feature = "secp256r1")]
        Algorithm::ES256 => {
            use p256::ecdsa::signature::Verifier;
            let public_key = p256::PublicKey::try_from(params)
                .map_err(|_| SignatureError::InvalidPublicKey)?;
            let verifying_key = p256::ecdsa::VerifyingKey::from(public_key);
            let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(data, &signature).is_ok())
        }
        #[cfg(feature = "secp384r1")]
        Algorithm::ES384 => {
            use p384::ecdsa::signature::Verifier;
            let public_key = p384::PublicKey::try_from(params)
                .map_err(|_| SignatureError::InvalidPublicKey)?;
            let verifying_key = p384::ecdsa::VerifyingKey::from(public_key);
            let Ok(signature) = p384::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            Ok(verifying_key.verify(data, &signature).is_ok())
        }
        other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    }
}
