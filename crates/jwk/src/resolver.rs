use std::{borrow::Cow, collections::BTreeMap};

use crate::JWK;

/// Key resolution error.
#[derive(Debug, thiserror::Error)]
pub enum KeyResolutionError {
    /// No key is known for the given issuer or key identifier.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The resolver failed to fetch the key.
    #[error("key resolution failed: {0}")]
    Other(String),
}

impl KeyResolutionError {
    pub fn other(e: impl std::fmt::Display) -> Self {
        Self::Other(e.to_string())
    }
}

/// JWK resolver.
///
/// Any type that can fetch the public JWK of an issuer. Implementations may
/// perform network I/O (fetching issuer metadata, resolving a DID, etc.).
pub trait JWKResolver {
    /// Fetches the public key of the given issuer.
    ///
    /// Both the issuer (`iss` claim) and the key identifier (`kid` header
    /// parameter) are optional since the key may be known in advance.
    #[allow(async_fn_in_trait)]
    async fn fetch_public_jwk(
        &self,
        issuer: Option<&str>,
        key_id: Option<&str>,
    ) -> Result<Cow<JWK>, KeyResolutionError>;
}

impl<'a, T: JWKResolver> JWKResolver for &'a T {
    async fn fetch_public_jwk(
        &self,
        issuer: Option<&str>,
        key_id: Option<&str>,
    ) -> Result<Cow<JWK>, KeyResolutionError> {
        T::fetch_public_jwk(*self, issuer, key_id).await
    }
}

impl JWKResolver for JWK {
    async fn fetch_public_jwk(
        &self,
        _issuer: Option<&str>,
        _key_id: Option<&str>,
    ) -> Result<Cow<JWK>, KeyResolutionError> {
        Ok(Cow::Owned(self.to_public()))
    }
}

/// Static issuer key set.
///
/// Maps issuer identifiers to their public keys. When an issuer has more than
/// one key, the `kid` of the signed token selects it.
#[derive(Debug, Default, Clone)]
pub struct IssuerKeys {
    keys: BTreeMap<String, Vec<JWK>>,
}

impl IssuerKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key for the given issuer. Private key material is
    /// stripped.
    pub fn insert(&mut self, issuer: impl Into<String>, jwk: &JWK) {
        self.keys
            .entry(issuer.into())
            .or_default()
            .push(jwk.to_public())
    }

    pub fn with(mut self, issuer: impl Into<String>, jwk: &JWK) -> Self {
        self.insert(issuer, jwk);
        self
    }

    pub fn get(&self, issuer: &str, key_id: Option<&str>) -> Option<&JWK> {
        let keys = self.keys.get(issuer)?;
        match key_id {
            Some(kid) => keys
                .iter()
                .find(|jwk| jwk.key_id.as_deref() == Some(kid)),
            None => match keys.as_slice() {
                [jwk] => Some(jwk),
                _ => None,
            },
        }
    }
}

impl JWKResolver for IssuerKeys {
    async fn fetch_public_jwk(
        &self,
        issuer: Option<&str>,
        key_id: Option<&str>,
    ) -> Result<Cow<JWK>, KeyResolutionError> {
        let issuer =
            issuer.ok_or_else(|| KeyResolutionError::NotFound("missing issuer".to_owned()))?;

        self.get(issuer, key_id)
            .map(Cow::Borrowed)
            .ok_or_else(|| KeyResolutionError::NotFound(issuer.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Base64urlUInt, ECParams, Params};

    fn key(kid: &str, x: u8) -> JWK {
        JWK::from(Params::EC(ECParams {
            curve: Some("P-256".to_owned()),
            x_coordinate: Some(Base64urlUInt(vec![x])),
            y_coordinate: Some(Base64urlUInt(vec![x])),
            ecc_private_key: Some(Base64urlUInt(vec![1])),
        }))
        .with_key_id(kid)
    }

    #[async_std::test]
    async fn issuer_keys() {
        let keys = IssuerKeys::new()
            .with("https://issuer.example", &key("a", 1))
            .with("https://issuer.example", &key("b", 2))
            .with("https://other.example", &key("c", 3));

        let jwk = keys
            .fetch_public_jwk(Some("https://issuer.example"), Some("b"))
            .await
            .unwrap();
        assert_eq!(jwk.key_id.as_deref(), Some("b"));
        assert!(jwk.is_public());

        let jwk = keys
            .fetch_public_jwk(Some("https://other.example"), None)
            .await
            .unwrap();
        assert_eq!(jwk.key_id.as_deref(), Some("c"));

        // Ambiguous: two keys, no `kid`.
        assert!(matches!(
            keys.fetch_public_jwk(Some("https://issuer.example"), None)
                .await,
            Err(KeyResolutionError::NotFound(_))
        ));

        assert!(matches!(
            keys.fetch_public_jwk(None, None).await,
            Err(KeyResolutionError::NotFound(_))
        ));
    }
}
