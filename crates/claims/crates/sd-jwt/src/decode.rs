use serde_json::Value;

use crate::{DecodedSdJwt, Disclosure, PartsRef, SdAlg, SdJwtPayload, SD_ALG_CLAIM_NAME};

/// SD-JWT decoding error.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The issuer-signed JWT could not be decoded.
    #[error("invalid issuer-signed JWT: {0}")]
    Jws(#[from] sdkit_jws::DecodeError),

    /// The issuer-signed JWT payload is not a JSON object.
    #[error("invalid JWT payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The `_sd_alg` claim value is not a string.
    #[error("`_sd_alg` claim value is not a string")]
    SdAlgWrongType,

    /// The `_sd_alg` claim names an algorithm outside the allow-list.
    #[error("unsupported hash algorithm `{0}`")]
    UnsupportedHashAlgorithm(String),

    /// A disclosure is not a base64 encoded 2 or 3 elements JSON array with
    /// a string salt (and name).
    #[error("malformed disclosure")]
    MalformedDisclosure,

    /// An object entry disclosure names a reserved claim.
    #[error("disclosure uses the reserved claim name `{0}`")]
    ReservedClaimName(String),
}

impl SdJwtPayload {
    /// Builds an SD-JWT payload from a JSON object, extracting the
    /// `_sd_alg` claim.
    pub fn from_claims(mut claims: serde_json::Map<String, Value>) -> Result<Self, DecodeError> {
        let sd_alg = match claims.remove(SD_ALG_CLAIM_NAME) {
            Some(Value::String(name)) => Some(SdAlg::try_from(name.as_str())?),
            Some(_) => return Err(DecodeError::SdAlgWrongType),
            None => None,
        };

        Ok(Self { sd_alg, claims })
    }
}

impl<'a> PartsRef<'a> {
    /// Decodes the issuer-signed JWT and the disclosures.
    ///
    /// Neither the signature nor the digests are checked at this point.
    pub fn decode(&self) -> Result<DecodedSdJwt<'a>, DecodeError> {
        let jwt = self.jwt.decode()?.try_map(|bytes| {
            serde_json::from_slice(&bytes)
                .map_err(DecodeError::Payload)
                .and_then(SdJwtPayload::from_claims)
        })?;

        let disclosures = self
            .disclosures
            .iter()
            .copied()
            .map(Disclosure::decode)
            .collect::<Result<_, _>>()?;

        Ok(DecodedSdJwt { jwt, disclosures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_sd_alg() {
        let payload = SdJwtPayload::from_claims(
            json!({ "_sd_alg": "sha-384", "iss": "https://issuer.example" })
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();

        assert_eq!(payload.sd_alg, Some(SdAlg::Sha384));
        assert!(!payload.claims.contains_key("_sd_alg"));
    }

    #[test]
    fn reject_unknown_sd_alg() {
        let claims = json!({ "_sd_alg": "md5" }).as_object().cloned().unwrap();
        assert!(matches!(
            SdJwtPayload::from_claims(claims),
            Err(DecodeError::UnsupportedHashAlgorithm(name)) if name == "md5"
        ));

        let claims = json!({ "_sd_alg": 256 }).as_object().cloned().unwrap();
        assert!(matches!(
            SdJwtPayload::from_claims(claims),
            Err(DecodeError::SdAlgWrongType)
        ));
    }
}
