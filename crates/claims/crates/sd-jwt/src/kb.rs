use sdkit_claims_core::NumericDate;
use sdkit_core::BytesBuf;
use sdkit_jws::Jws;
use serde::{Deserialize, Serialize};

use crate::{compact::compact_str, InvalidSdJwt, PartsRef, SdJwt, SdJwtBuf};

/// JWS `typ` header value of key binding JWTs.
pub const KB_JWT_TYP: &str = "kb+jwt";

/// SD-JWT presentation in compact form, with an optional key binding JWT.
///
/// # Grammar
///
/// ```abnf
/// KB-JWT = JWT
/// SD-JWT-KB = SD-JWT [KB-JWT]
/// ```
///
/// Everything up to and including the last `~` is an [`SdJwt`]: the exact
/// bytes hashed into the `sd_hash` claim of the key binding JWT.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SdJwtKb([u8]);

impl SdJwtKb {
    /// Parses the given `input` as an SD-JWT presentation.
    pub fn new<T: ?Sized + AsRef<[u8]>>(input: &T) -> Result<&Self, InvalidSdJwt<&T>> {
        let bytes = input.as_ref();
        if Self::validate(bytes) {
            Ok(unsafe { Self::new_unchecked(bytes) })
        } else {
            Err(InvalidSdJwt(input))
        }
    }

    /// Checks that the given input is an SD-JWT optionally followed by a key
    /// binding JWT.
    pub const fn validate(bytes: &[u8]) -> bool {
        match last_separator(bytes) {
            Some(i) => {
                let (sd_jwt, _) = bytes.split_at(i + 1);
                SdJwt::validate(sd_jwt)
                    && (i + 1 == bytes.len() || Jws::validate_range(bytes, i + 1, bytes.len()))
            }
            None => false,
        }
    }

    /// Creates a new presentation from the given `input` without validation.
    ///
    /// # Safety
    ///
    /// The input value **must** be a valid SD-JWT presentation.
    pub const unsafe fn new_unchecked(input: &[u8]) -> &Self {
        std::mem::transmute(input)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        unsafe {
            // SAFETY: SD-JWT presentations are ASCII strings.
            std::str::from_utf8_unchecked(&self.0)
        }
    }

    fn sd_jwt_end(&self) -> usize {
        last_separator(&self.0).map(|i| i + 1).unwrap_or(self.0.len())
    }

    /// Returns the SD-JWT part of the presentation, including the trailing
    /// `~`.
    pub fn sd_jwt(&self) -> &SdJwt {
        unsafe {
            // SAFETY: validated on construction.
            SdJwt::new_unchecked(&self.0[..self.sd_jwt_end()])
        }
    }

    /// Returns the key binding JWT, if any.
    pub fn key_binding_jwt(&self) -> Option<&Jws> {
        let start = self.sd_jwt_end();
        (start < self.0.len()).then(|| unsafe {
            // SAFETY: validated on construction.
            Jws::new_unchecked(&self.0[start..])
        })
    }

    /// Returns references to each part of this presentation.
    pub fn parts(&self) -> PartsRef {
        PartsRef {
            key_binding_jwt: self.key_binding_jwt(),
            ..self.sd_jwt().parts()
        }
    }
}

const fn last_separator(bytes: &[u8]) -> Option<usize> {
    let mut i = bytes.len();
    while i > 0 {
        i -= 1;
        if bytes[i] == b'~' {
            return Some(i);
        }
    }

    None
}

/// Owned SD-JWT presentation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdJwtKbBuf(Vec<u8>);

impl SdJwtKbBuf {
    pub fn new<B: BytesBuf>(bytes: B) -> Result<Self, InvalidSdJwt<B>> {
        if SdJwtKb::validate(bytes.as_ref()) {
            Ok(Self(bytes.into()))
        } else {
            Err(InvalidSdJwt(bytes))
        }
    }

    /// Creates a new owned presentation without validating the input bytes.
    ///
    /// # Safety
    ///
    /// The input `bytes` **must** represent an SD-JWT presentation.
    pub unsafe fn new_unchecked(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_sd_jwt_kb(&self) -> &SdJwtKb {
        unsafe { SdJwtKb::new_unchecked(&self.0) }
    }

    pub fn into_string(self) -> String {
        unsafe {
            // SAFETY: SD-JWT presentations are ASCII strings.
            String::from_utf8_unchecked(self.0)
        }
    }
}

compact_str!(SdJwtKb, SdJwtKbBuf, as_sd_jwt_kb);

impl From<SdJwtBuf> for SdJwtKbBuf {
    fn from(value: SdJwtBuf) -> Self {
        Self(value.into_string().into_bytes())
    }
}

/// Key binding JWT claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBindingClaims {
    /// Intended verifier.
    #[serde(rename = "aud")]
    pub audience: String,

    /// Verifier challenge.
    pub nonce: String,

    /// Issuance time of the key binding JWT.
    #[serde(rename = "iat")]
    pub issued_at: NumericDate,

    /// Digest of the presented SD-JWT, computed with the `_sd_alg` of the
    /// issuer-signed JWT.
    pub sd_hash: String,

    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<NumericDate>,

    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<NumericDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const JWT: &str = "eyJhbGciOiJFUzI1NiJ9.e30.c2ln";
    const DISCLOSURE: &str = "WyJzYWx0IiwgImEiLCAxXQ";

    #[test]
    fn without_key_binding() {
        let input = format!("{JWT}~{DISCLOSURE}~");
        let kb = SdJwtKb::new(&input).unwrap();
        assert_eq!(kb.sd_jwt().as_str(), input);
        assert!(kb.key_binding_jwt().is_none());

        let parts = kb.parts();
        assert_eq!(parts.jwt.as_str(), JWT);
        assert_eq!(parts.disclosures.len(), 1);
        assert_eq!(parts.to_string(), input);
    }

    #[test]
    fn with_key_binding() {
        let input = format!("{JWT}~{DISCLOSURE}~{JWT}");
        let kb = SdJwtKb::new(&input).unwrap();
        assert_eq!(kb.sd_jwt().as_str(), format!("{JWT}~{DISCLOSURE}~"));
        assert_eq!(kb.key_binding_jwt().unwrap().as_str(), JWT);
        assert_eq!(kb.parts().to_string(), input);
    }

    #[test]
    fn invalid() {
        for input in [
            JWT.to_owned(),
            format!("{JWT}~{DISCLOSURE}"),
            format!("{JWT}~~"),
            format!("{JWT}~{DISCLOSURE}~not-a-jwt"),
            format!("{JWT}~{DISCLOSURE}~{JWT}~x.y"),
            String::new(),
        ] {
            assert!(SdJwtKb::new(&input).is_err(), "{input}");
        }
    }

    #[test]
    fn claims_serialization() {
        let claims = KeyBindingClaims {
            audience: "https://verifier.example".to_owned(),
            nonce: "abc123".to_owned(),
            issued_at: NumericDate::from_seconds(1700000000),
            sd_hash: "hash".to_owned(),
            expiration_time: None,
            not_before: None,
        };

        assert_eq!(
            serde_json::to_value(&claims).unwrap(),
            serde_json::json!({
                "aud": "https://verifier.example",
                "nonce": "abc123",
                "iat": 1700000000,
                "sd_hash": "hash"
            })
        );
    }
}
