use sdkit_claims_core::SignatureError;
use sdkit_jwk::{Algorithm, JWK};

use crate::DecodedJws;

/// JWS signature verifier.
///
/// Checks a raw signature against signing bytes using a resolved public key.
pub trait JwsVerifier {
    #[allow(async_fn_in_trait)]
    async fn verify_bytes(
        &self,
        algorithm: Algorithm,
        signing_bytes: &[u8],
        signature: &[u8],
        key: &JWK,
    ) -> Result<bool, SignatureError>;
}

impl<'a, T: JwsVerifier> JwsVerifier for &'a T {
    async fn verify_bytes(
        &self,
        algorithm: Algorithm,
        signing_bytes: &[u8],
        signature: &[u8],
        key: &JWK,
    ) -> Result<bool, SignatureError> {
        T::verify_bytes(*self, algorithm, signing_bytes, signature, key).await
    }
}

/// Built-in ECDSA verifier, backed by the enabled curve features.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaVerifier;

impl JwsVerifier for EcdsaVerifier {
    async fn verify_bytes(
        &self,
        algorithm: Algorithm,
        signing_bytes: &[u8],
        signature: &[u8],
        key: &JWK,
    ) -> Result<bool, SignatureError> {
        crate::verify_bytes(algorithm, signing_bytes, key, signature)
    }
}

impl<T> DecodedJws<T> {
    /// Verifies the signature of this JWS with the given key.
    ///
    /// Returns `Ok(false)` if the signature does not match. If the key pins
    /// an algorithm, it must be the one of the header. A header with a `crit`
    /// parameter is rejected.
    pub async fn verify_with<V: JwsVerifier>(
        &self,
        verifier: V,
        key: &JWK,
    ) -> Result<bool, SignatureError> {
        if let Some(critical) = &self.header.critical {
            log::debug!("unsupported critical header parameters {critical:?}");
            return Err(SignatureError::UnsupportedCriticalParameters(critical.clone()));
        }

        if let Some(alg) = key.algorithm {
            if alg != self.header.algorithm {
                log::debug!(
                    "key algorithm `{alg}` does not match header algorithm `{}`",
                    self.header.algorithm
                );
                return Err(SignatureError::AlgorithmMismatch);
            }
        }

        verifier
            .verify_bytes(
                self.header.algorithm,
                &self.signing_bytes,
                &self.signature,
                key,
            )
            .await
    }
}
