use std::collections::BTreeSet;

use chrono::Utc;
use sdkit_claims_core::{NumericDate, SignatureError};
use sdkit_core::JsonPointer;
use sdkit_jws::{JsonPayload, JwsSigner};

use crate::{
    DecodedDisclosure, Disclosure, KeyBindingClaims, RevealError, SdJwt, SdJwtKbBuf, KB_JWT_TYP,
};

/// Presentation error.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    /// The stored SD-JWT could not be revealed.
    #[error(transparent)]
    Reveal(#[from] RevealError),

    /// Key binding JWT signature failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Key binding JWT serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Key binding parameters, scoping a presentation to one verifier and one
/// challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindingParams {
    /// Intended verifier (`aud` claim).
    pub audience: String,

    /// Verifier challenge (`nonce` claim).
    pub nonce: String,

    /// Issuance time (`iat` claim). Defaults to the current time.
    pub issued_at: Option<NumericDate>,
}

impl KeyBindingParams {
    pub fn new(audience: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            nonce: nonce.into(),
            issued_at: None,
        }
    }

    pub fn with_issued_at(mut self, issued_at: NumericDate) -> Self {
        self.issued_at = Some(issued_at);
        self
    }
}

/// SD-JWT holder.
///
/// Builds presentations out of stored SD-JWTs. The signer is the holder key
/// bound to the SD-JWTs through their `cnf` claim, and is only used for key
/// binding.
#[derive(Debug, Clone)]
pub struct Holder<S> {
    signer: S,
}

impl<S: JwsSigner> Holder<S> {
    pub fn new(signer: S) -> Self {
        Self { signer }
    }

    /// Presents the given SD-JWT, revealing only the disclosures accepted by
    /// `select`.
    ///
    /// The disclosures of the concealed ancestors of a selected disclosure
    /// are presented as well. Disclosures keep their original order. With
    /// `key_binding` parameters, a key binding JWT over the presented SD-JWT
    /// is appended.
    pub async fn present(
        &self,
        sd_jwt: &SdJwt,
        mut select: impl FnMut(&JsonPointer, &DecodedDisclosure) -> bool,
        key_binding: Option<KeyBindingParams>,
    ) -> Result<SdJwtKbBuf, PresentError> {
        let revealed = sd_jwt.decode_reveal_any()?;

        let mut selected = Vec::new();
        for (pointer, disclosure) in &revealed.disclosures {
            if select(pointer.as_json_pointer(), disclosure) {
                selected.push(pointer.as_json_pointer())
            }
        }

        let mut kept: BTreeSet<&Disclosure> = BTreeSet::new();
        for (pointer, disclosure) in &revealed.disclosures {
            if selected
                .iter()
                .any(|s| *s == pointer.as_json_pointer() || pointer.is_ancestor_of(s))
            {
                kept.insert(&*disclosure.encoded);
            }
        }

        let mut bytes = sd_jwt.jwt().as_bytes().to_vec();
        bytes.push(b'~');
        for d in sd_jwt.disclosures().filter(|d| kept.contains(d)) {
            bytes.extend_from_slice(d.as_bytes());
            bytes.push(b'~');
        }

        log::trace!(
            "presenting {} of {} disclosures",
            kept.len(),
            revealed.disclosures.len()
        );

        if let Some(params) = key_binding {
            let sd_alg = revealed.sd_alg.unwrap_or_default();
            let claims = KeyBindingClaims {
                audience: params.audience,
                nonce: params.nonce,
                issued_at: params.issued_at.unwrap_or_else(|| Utc::now().into()),
                sd_hash: sd_alg.hash_bytes(&bytes),
                expiration_time: None,
                not_before: None,
            };

            let kb_jwt = self
                .signer
                .sign(JsonPayload::new(&claims)?.with_typ(KB_JWT_TYP))
                .await?;

            bytes.extend(kb_jwt.into_bytes());
        }

        Ok(unsafe {
            // SAFETY: an SD-JWT optionally followed by a compact JWS.
            SdJwtKbBuf::new_unchecked(bytes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{json_pointer, Issuer, SdAlg};
    use pretty_assertions::assert_eq;
    use sdkit_jwk::JWK;
    use serde_json::json;
    use std::sync::LazyLock;

    static ISSUER_KEY: LazyLock<JWK> = LazyLock::new(JWK::generate_p256);
    static HOLDER_KEY: LazyLock<JWK> = LazyLock::new(JWK::generate_p384);

    async fn issue() -> crate::IssuedSdJwt {
        Issuer::new(&*ISSUER_KEY)
            .issue(
                &json!({
                    "name": "Alice",
                    "address": { "country": "JP", "region": "Minato" },
                    "phones": ["1", "2"]
                }),
                &[
                    json_pointer!("/address"),
                    json_pointer!("/address/region"),
                    json_pointer!("/phones/1"),
                ],
                Some(&*HOLDER_KEY),
            )
            .await
            .unwrap()
    }

    #[async_std::test]
    async fn present_nothing() {
        let issued = issue().await;
        let presentation = Holder::new(&*HOLDER_KEY)
            .present(&issued.sd_jwt, |_, _| false, None)
            .await
            .unwrap();

        assert_eq!(presentation.sd_jwt().disclosures().count(), 0);
        assert!(presentation.key_binding_jwt().is_none());
        assert_eq!(
            presentation.as_str(),
            format!("{}~", issued.sd_jwt.jwt())
        );
    }

    #[async_std::test]
    async fn present_with_ancestors() {
        let issued = issue().await;
        let presentation = Holder::new(&*HOLDER_KEY)
            .present(
                &issued.sd_jwt,
                |pointer, _| pointer == json_pointer!("/address/region"),
                None,
            )
            .await
            .unwrap();

        let revealed = presentation.sd_jwt().decode_reveal_any().unwrap();
        let pointers: Vec<_> = revealed.disclosures.keys().map(|p| p.as_str()).collect();
        assert_eq!(pointers, ["/address", "/address/region"]);

        // Original issuance order is kept.
        let expected: Vec<_> = issued
            .sd_jwt
            .disclosures()
            .filter(|d| revealed.disclosures.values().any(|r| &*r.encoded == *d))
            .collect();
        let presented: Vec<_> = presentation.sd_jwt().disclosures().collect();
        assert_eq!(presented, expected);
    }

    #[async_std::test]
    async fn key_binding() {
        let issued = issue().await;
        let presentation = Holder::new(&*HOLDER_KEY)
            .present(
                &issued.sd_jwt,
                |pointer, _| pointer == json_pointer!("/phones/1"),
                Some(
                    KeyBindingParams::new("https://verifier.example", "abc123")
                        .with_issued_at(NumericDate::from_seconds(1700000000)),
                ),
            )
            .await
            .unwrap();

        let kb_jwt = presentation
            .key_binding_jwt()
            .unwrap()
            .decode()
            .unwrap()
            .decode_json::<KeyBindingClaims>()
            .unwrap();

        assert_eq!(kb_jwt.header.type_.as_deref(), Some(KB_JWT_TYP));
        assert_eq!(kb_jwt.header.algorithm, sdkit_jwk::Algorithm::ES384);
        assert_eq!(
            kb_jwt.payload,
            KeyBindingClaims {
                audience: "https://verifier.example".to_owned(),
                nonce: "abc123".to_owned(),
                issued_at: NumericDate::from_seconds(1700000000),
                sd_hash: SdAlg::Sha256.hash_bytes(presentation.sd_jwt().as_bytes()),
                expiration_time: None,
                not_before: None,
            }
        );

        assert!(kb_jwt
            .verify_with(sdkit_jws::EcdsaVerifier, &HOLDER_KEY.to_public())
            .await
            .unwrap());
    }
}
