use std::{fmt, str::FromStr};

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::{disclosure::Disclosure, DecodeError};

/// Elements of the `_sd_alg` claim.
///
/// Hash algorithms allowed to compute disclosure digests.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SdAlg {
    /// SHA-256 algorithm for hashing disclosures.
    #[default]
    Sha256,

    /// SHA-384 algorithm for hashing disclosures.
    Sha384,

    /// SHA-512 algorithm for hashing disclosures.
    Sha512,
}

impl SdAlg {
    const SHA256_STR: &'static str = "sha-256";
    const SHA384_STR: &'static str = "sha-384";
    const SHA512_STR: &'static str = "sha-512";

    /// String encoding of the `_sd_alg` field.
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Sha256 => Self::SHA256_STR,
            Self::Sha384 => Self::SHA384_STR,
            Self::Sha512 => Self::SHA512_STR,
        }
    }

    /// Hash the given disclosure.
    ///
    /// The digest is computed over the encoded (base64) form of the
    /// disclosure, exactly as it appears in the compact SD-JWT.
    pub fn hash(&self, disclosure: &Disclosure) -> String {
        self.hash_bytes(disclosure.as_bytes())
    }

    /// Hash arbitrary bytes, returning the url-safe base64 encoded digest.
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => BASE64_URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(bytes)),
            Self::Sha384 => BASE64_URL_SAFE_NO_PAD.encode(sha2::Sha384::digest(bytes)),
            Self::Sha512 => BASE64_URL_SAFE_NO_PAD.encode(sha2::Sha512::digest(bytes)),
        }
    }
}

impl fmt::Display for SdAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_str().fmt(f)
    }
}

impl FromStr for SdAlg {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SdAlg::try_from(s)
    }
}

impl TryFrom<&str> for SdAlg {
    type Error = DecodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value {
            Self::SHA256_STR => SdAlg::Sha256,
            Self::SHA384_STR => SdAlg::Sha384,
            Self::SHA512_STR => SdAlg::Sha512,
            other => return Err(DecodeError::UnsupportedHashAlgorithm(other.to_owned())),
        })
    }
}

impl From<SdAlg> for &'static str {
    fn from(value: SdAlg) -> Self {
        value.to_str()
    }
}

impl Serialize for SdAlg {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SdAlg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
