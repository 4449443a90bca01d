//! JSON Web Keys ([RFC 7517]) for the elliptic curves used to sign SD-JWTs
//! and their key-binding JWTs.
//!
//! [RFC 7517]: <https://datatracker.ietf.org/doc/html/rfc7517>
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::{fmt, str::FromStr};
use zeroize::Zeroize;

mod algorithm;
pub use algorithm::*;

pub mod error;
pub use error::Error;

mod resolver;
pub use resolver::*;

/// JSON Web Key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq)]
pub struct JWK {
    #[serde(rename = "use")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_use: Option<String>,
    #[serde(rename = "key_ops")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_operations: Option<Vec<String>>,
    #[serde(rename = "alg")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
    #[serde(rename = "kid")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(flatten)]
    pub params: Params,
}

/// Key type specific parameters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
#[serde(tag = "kty")]
#[non_exhaustive]
pub enum Params {
    EC(ECParams),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
pub struct ECParams {
    // Parameters for Elliptic Curve Public Keys
    #[serde(rename = "crv")]
    pub curve: Option<String>,
    #[serde(rename = "x")]
    pub x_coordinate: Option<Base64urlUInt>,
    #[serde(rename = "y")]
    pub y_coordinate: Option<Base64urlUInt>,

    // Parameters for Elliptic Curve Private Keys
    #[serde(rename = "d")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecc_private_key: Option<Base64urlUInt>,
}

impl Drop for ECParams {
    fn drop(&mut self) {
        self.ecc_private_key.zeroize()
    }
}

/// Url-safe base64 encoded bytes, without padding.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
#[serde(try_from = "String")]
#[serde(into = "Base64urlUIntString")]
pub struct Base64urlUInt(pub Vec<u8>);
type Base64urlUIntString = String;

impl JWK {
    #[cfg(feature = "secp256r1")]
    pub fn generate_p256() -> Self {
        Self::from(&p256::SecretKey::random(&mut rand::rngs::OsRng))
    }

    #[cfg(feature = "secp384r1")]
    pub fn generate_p384() -> Self {
        Self::from(&p384::SecretKey::random(&mut rand::rngs::OsRng))
    }

    pub fn with_key_id(self, key_id: impl Into<String>) -> Self {
        Self {
            key_id: Some(key_id.into()),
            ..self
        }
    }

    /// Uses the [thumbprint][Self::thumbprint] as `kid`.
    pub fn with_thumbprint_key_id(self) -> Result<Self, Error> {
        let kid = self.thumbprint()?;
        Ok(self.with_key_id(kid))
    }

    /// Signature algorithm: the `alg` parameter, or else the one the curve
    /// calls for.
    pub fn get_algorithm(&self) -> Option<Algorithm> {
        let Params::EC(ec) = &self.params;
        self.algorithm
            .or_else(|| ec.curve.as_deref().and_then(Algorithm::from_curve))
    }

    /// Copy of this key without its private part.
    pub fn to_public(&self) -> Self {
        Self {
            params: self.params.to_public(),
            ..self.clone()
        }
    }

    pub fn is_public(&self) -> bool {
        let Params::EC(ec) = &self.params;
        ec.ecc_private_key.is_none()
    }

    /// Whether both keys share the same public part, regardless of the other
    /// parameters.
    pub fn equals_public(&self, other: &JWK) -> bool {
        let (Params::EC(a), Params::EC(b)) = (&self.params, &other.params);
        a.curve.is_some()
            && a.x_coordinate.is_some()
            && a.y_coordinate.is_some()
            && (&a.curve, &a.x_coordinate, &a.y_coordinate)
                == (&b.curve, &b.x_coordinate, &b.y_coordinate)
    }

    /// [RFC 7638] thumbprint: base64url SHA-256 of the required members in
    /// lexicographic order.
    ///
    /// [RFC 7638]: <https://datatracker.ietf.org/doc/html/rfc7638>
    pub fn thumbprint(&self) -> Result<String, Error> {
        let Params::EC(ec) = &self.params;
        let crv = ec.curve.as_deref().ok_or(Error::MissingCurve)?;
        let (Some(x), Some(y)) = (&ec.x_coordinate, &ec.y_coordinate) else {
            return Err(Error::MissingPoint);
        };

        let members = format!(
            r#"{{"crv":"{crv}","kty":"EC","x":"{}","y":"{}"}}"#,
            String::from(x),
            String::from(y)
        );

        Ok(BASE64_URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(members)))
    }
}

impl From<Params> for JWK {
    fn from(params: Params) -> Self {
        Self {
            public_key_use: None,
            key_operations: None,
            algorithm: None,
            key_id: None,
            params,
        }
    }
}

impl FromStr for JWK {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

impl fmt::Display for JWK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string(self).map_err(|_| fmt::Error)?)
    }
}

impl Params {
    pub fn to_public(&self) -> Self {
        match self {
            Self::EC(ec) => Self::EC(ec.to_public()),
        }
    }
}

impl ECParams {
    pub fn to_public(&self) -> Self {
        let mut public = self.clone();
        public.ecc_private_key = None;
        public
    }

    /// Returns the SEC1 uncompressed encoding of the public point
    /// (`0x04 || x || y`).
    pub fn to_sec1_uncompressed(&self) -> Result<Vec<u8>, Error> {
        match (&self.x_coordinate, &self.y_coordinate) {
            (Some(x), Some(y)) => Ok([&[0x04], x.0.as_slice(), y.0.as_slice()].concat()),
            _ => Err(Error::MissingPoint),
        }
    }

    fn check_curve(&self, expected: &str) -> Result<(), Error> {
        match self.curve.as_deref() {
            Some(crv) if crv == expected => Ok(()),
            Some(crv) => Err(Error::CurveNotImplemented(crv.to_owned())),
            None => Err(Error::MissingCurve),
        }
    }
}

macro_rules! ec_conversions {
    ($feature:literal, $krate:ident, $curve:literal) => {
        #[cfg(feature = $feature)]
        impl TryFrom<&ECParams> for $krate::SecretKey {
            type Error = Error;

            fn try_from(params: &ECParams) -> Result<Self, Self::Error> {
                params.check_curve($curve)?;
                let private_key = params
                    .ecc_private_key
                    .as_ref()
                    .ok_or(Error::MissingPrivateKey)?;
                $krate::SecretKey::from_slice(&private_key.0).map_err(|_| Error::InvalidKey)
            }
        }

        #[cfg(feature = $feature)]
        impl TryFrom<&ECParams> for $krate::PublicKey {
            type Error = Error;

            fn try_from(params: &ECParams) -> Result<Self, Self::Error> {
                params.check_curve($curve)?;
                $krate::PublicKey::from_sec1_bytes(&params.to_sec1_uncompressed()?)
                    .map_err(|_| Error::InvalidKey)
            }
        }

        #[cfg(feature = $feature)]
        impl From<&$krate::PublicKey> for ECParams {
            fn from(pk: &$krate::PublicKey) -> Self {
                use $krate::elliptic_curve::sec1::ToEncodedPoint;
                let encoded_point = pk.to_encoded_point(false);
                ECParams {
                    curve: Some($curve.to_string()),
                    x_coordinate: encoded_point.x().map(|x| Base64urlUInt(x.to_vec())),
                    y_coordinate: encoded_point.y().map(|y| Base64urlUInt(y.to_vec())),
                    ecc_private_key: None,
                }
            }
        }

        #[cfg(feature = $feature)]
        impl From<&$krate::SecretKey> for ECParams {
            fn from(k: &$krate::SecretKey) -> Self {
                let mut params = ECParams::from(&k.public_key());
                params.ecc_private_key = Some(Base64urlUInt(k.to_bytes().to_vec()));
                params
            }
        }

        #[cfg(feature = $feature)]
        impl From<&$krate::SecretKey> for JWK {
            fn from(k: &$krate::SecretKey) -> Self {
                Self::from(Params::EC(ECParams::from(k)))
            }
        }
    };
}

ec_conversions!("secp256r1", p256, "P-256");
ec_conversions!("secp384r1", p384, "P-384");

impl TryFrom<String> for Base64urlUInt {
    type Error = base64::DecodeError;

    /// Trailing padding is tolerated.
    fn try_from(encoded: String) -> Result<Self, Self::Error> {
        let unpadded = encoded.trim_end_matches('=');
        Ok(Self(BASE64_URL_SAFE_NO_PAD.decode(unpadded)?))
    }
}

impl From<&Base64urlUInt> for String {
    fn from(value: &Base64urlUInt) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(&value.0)
    }
}

impl From<Base64urlUInt> for Base64urlUIntString {
    fn from(value: Base64urlUInt) -> Base64urlUIntString {
        (&value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P256_JSON: &str = r#"{
        "kty": "EC",
        "d": "oYVImrMZjUclmWuhqa6bjzqGx5HFkbx76_00oWUHiLw",
        "use": "sig",
        "crv": "P-256",
        "kid": "rpaXW8yADRnS2150CdsMtftwxtzSiVTV9bgHHG86v-E",
        "x": "UX7TC8uQ9sn06c3DxXy1Ua5V9BK-cb9fQfukVrCLD8s",
        "y": "yNXRKOnwBMTx536uajfNHklxpG9bAbdLlmVn6-XuK0Q",
        "alg": "ES256"
    }"#;

    #[test]
    fn parse_and_strip_private_key() {
        let jwk: JWK = P256_JSON.parse().unwrap();
        assert!(!jwk.is_public());
        assert_eq!(jwk.get_algorithm(), Some(Algorithm::ES256));

        let public = jwk.to_public();
        assert!(public.is_public());
        assert!(public.equals_public(&jwk));

        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("d").is_none());
        assert_eq!(json["kty"], "EC");
    }

    #[test]
    fn thumbprint() {
        let jwk: JWK = P256_JSON.parse().unwrap();
        let thumbprint = jwk.thumbprint().unwrap();
        // SHA-256 digest, base64url without padding.
        assert_eq!(thumbprint.len(), 43);
        assert_eq!(thumbprint, jwk.to_public().thumbprint().unwrap());

        let with_kid = jwk.to_public().with_thumbprint_key_id().unwrap();
        assert_eq!(with_kid.key_id, Some(thumbprint));
    }

    #[test]
    fn algorithm_from_curve() {
        let jwk: JWK = serde_json::from_value(serde_json::json!({
            "kty": "EC",
            "crv": "P-384",
            "x": "AA",
            "y": "AA"
        }))
        .unwrap();
        assert_eq!(jwk.get_algorithm(), Some(Algorithm::ES384));
    }

    #[cfg(feature = "secp256r1")]
    #[test]
    fn generate_p256() {
        let jwk = JWK::generate_p256();
        let Params::EC(params) = &jwk.params;
        let secret = p256::SecretKey::try_from(params).unwrap();
        let public = p256::PublicKey::try_from(params).unwrap();
        assert_eq!(secret.public_key(), public);
    }

    #[cfg(feature = "secp384r1")]
    #[test]
    fn generate_p384() {
        let jwk = JWK::generate_p384();
        assert_eq!(jwk.get_algorithm(), Some(Algorithm::ES384));
        let Params::EC(params) = &jwk.params;
        assert!(p256_mismatch(params));
    }

    #[cfg(all(feature = "secp384r1", feature = "secp256r1"))]
    fn p256_mismatch(params: &ECParams) -> bool {
        matches!(
            p256::PublicKey::try_from(params),
            Err(Error::CurveNotImplemented(_))
        )
    }

    #[cfg(all(feature = "secp384r1", not(feature = "secp256r1")))]
    fn p256_mismatch(_params: &ECParams) -> bool {
        true
    }
}
