use std::fmt;

use sdkit_core::BytesBuf;
use sdkit_jws::Jws;

use crate::{
    utils::is_url_safe_base64_char, DecodeError, DecodedSdJwt, Disclosure, RevealError,
    RevealedSdJwt,
};

/// Invalid SD-JWT error.
#[derive(Debug, thiserror::Error)]
#[error("invalid SD-JWT: `{0}`")]
pub struct InvalidSdJwt<T = String>(pub T);

/// Implements the string-like traits shared by the compact SD-JWT forms.
///
/// The borrowed type must provide `as_str` and `as_bytes`, the owned type
/// `new` and the given borrowing method.
macro_rules! compact_str {
    ($borrowed:ident, $owned:ident, $as_borrowed:ident) => {
        impl AsRef<str> for $borrowed {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl AsRef<[u8]> for $borrowed {
            fn as_ref(&self) -> &[u8] {
                self.as_bytes()
            }
        }

        impl ToOwned for $borrowed {
            type Owned = $owned;

            fn to_owned(&self) -> $owned {
                $owned(self.0.to_owned())
            }
        }

        impl std::fmt::Display for $borrowed {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::fmt::Debug for $borrowed {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self.as_str(), f)
            }
        }

        impl serde::Serialize for $borrowed {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl std::ops::Deref for $owned {
            type Target = $borrowed;

            fn deref(&self) -> &$borrowed {
                self.$as_borrowed()
            }
        }

        impl std::borrow::Borrow<$borrowed> for $owned {
            fn borrow(&self) -> &$borrowed {
                self.$as_borrowed()
            }
        }

        impl AsRef<$borrowed> for $owned {
            fn as_ref(&self) -> &$borrowed {
                self.$as_borrowed()
            }
        }

        impl AsRef<str> for $owned {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl AsRef<[u8]> for $owned {
            fn as_ref(&self) -> &[u8] {
                self.as_bytes()
            }
        }

        impl std::fmt::Display for $owned {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(self.$as_borrowed(), f)
            }
        }

        impl std::fmt::Debug for $owned {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self.$as_borrowed(), f)
            }
        }

        impl std::str::FromStr for $owned {
            type Err = $crate::InvalidSdJwt;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s.to_owned())
            }
        }

        impl serde::Serialize for $owned {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(self.$as_borrowed(), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $owned {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <String as serde::Deserialize>::deserialize(deserializer)?
                    .parse()
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use compact_str;

/// Position of the first `~` at or after `i`.
pub(crate) const fn find_separator(bytes: &[u8], mut i: usize) -> Option<usize> {
    while i < bytes.len() {
        if bytes[i] == b'~' {
            return Some(i);
        }
        i += 1
    }
    None
}

/// Checks that `bytes[start..]` is a sequence of non-empty, `~`-terminated
/// url-safe base64 disclosures.
const fn validate_disclosures(bytes: &[u8], mut start: usize) -> bool {
    while start < bytes.len() {
        let Some(end) = find_separator(bytes, start) else {
            return false;
        };

        if end == start {
            return false;
        }

        let mut i = start;
        while i < end {
            if !is_url_safe_base64_char(bytes[i]) {
                return false;
            }
            i += 1
        }

        start = end + 1
    }

    true
}

/// SD-JWT in compact form, as emitted by the issuer.
///
/// ```abnf
/// JWT = BASE64URL "." *BASE64URL "." BASE64URL
/// DISCLOSURE = BASE64URL
/// SD-JWT = JWT "~" *(DISCLOSURE "~")
/// ```
///
/// The trailing `~` is always present, even without disclosures. It is what
/// tells an SD-JWT apart from a plain JWS.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SdJwt([u8]);

impl SdJwt {
    /// Parses the given `input` as an SD-JWT.
    pub fn new<T: ?Sized + AsRef<[u8]>>(input: &T) -> Result<&Self, InvalidSdJwt<&T>> {
        let bytes = input.as_ref();
        if Self::validate(bytes) {
            Ok(unsafe { Self::new_unchecked(bytes) })
        } else {
            Err(InvalidSdJwt(input))
        }
    }

    /// Checks that the given input is an SD-JWT.
    pub const fn validate(bytes: &[u8]) -> bool {
        match find_separator(bytes, 0) {
            Some(jwt_end) => {
                Jws::validate_range(bytes, 0, jwt_end) && validate_disclosures(bytes, jwt_end + 1)
            }
            None => false,
        }
    }

    /// Creates a new SD-JWT from the given `input` without validation.
    ///
    /// # Safety
    ///
    /// The input value **must** be a valid SD-JWT.
    pub const unsafe fn new_unchecked(input: &[u8]) -> &Self {
        std::mem::transmute(input)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        unsafe {
            // SAFETY: SD-JWTs are ASCII.
            std::str::from_utf8_unchecked(&self.0)
        }
    }

    fn jwt_end(&self) -> usize {
        find_separator(&self.0, 0).unwrap_or(self.0.len())
    }

    /// Returns the issuer-signed JWT.
    pub fn jwt(&self) -> &Jws {
        unsafe {
            // SAFETY: validated on construction.
            Jws::new_unchecked(&self.0[..self.jwt_end()])
        }
    }

    /// Returns an iterator over the disclosures, in presentation order.
    pub fn disclosures(&self) -> Disclosures {
        Disclosures {
            rest: self.0.get(self.jwt_end() + 1..).unwrap_or_default(),
        }
    }

    pub fn parts(&self) -> PartsRef {
        PartsRef::new(self.jwt(), self.disclosures().collect())
    }

    /// Decodes the JWT and the disclosures, without revealing anything.
    pub fn decode(&self) -> Result<DecodedSdJwt, DecodeError> {
        self.parts().decode()
    }

    /// Decodes and reveals the SD-JWT, without checking the signature.
    pub fn decode_reveal_any(&self) -> Result<RevealedSdJwt, RevealError> {
        self.parts().decode_reveal_any()
    }
}

/// Owned SD-JWT.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdJwtBuf(Vec<u8>);

impl SdJwtBuf {
    pub fn new<B: BytesBuf>(bytes: B) -> Result<Self, InvalidSdJwt<B>> {
        if SdJwt::validate(bytes.as_ref()) {
            Ok(Self(bytes.into()))
        } else {
            Err(InvalidSdJwt(bytes))
        }
    }

    /// Creates a new owned SD-JWT without validating the input bytes.
    ///
    /// # Safety
    ///
    /// The input `bytes` **must** represent an SD-JWT.
    pub unsafe fn new_unchecked(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_sd_jwt(&self) -> &SdJwt {
        unsafe { SdJwt::new_unchecked(&self.0) }
    }

    pub fn into_string(self) -> String {
        unsafe {
            // SAFETY: SD-JWTs are ASCII.
            String::from_utf8_unchecked(self.0)
        }
    }
}

compact_str!(SdJwt, SdJwtBuf, as_sd_jwt);

/// Iterator over the disclosures of an SD-JWT.
pub struct Disclosures<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Disclosures<'a> {
    type Item = &'a Disclosure;

    fn next(&mut self) -> Option<Self::Item> {
        let end = find_separator(self.rest, 0)?;
        let (disclosure, rest) = self.rest.split_at(end);
        self.rest = &rest[1..];

        Some(unsafe {
            // SAFETY: validated with the enclosing SD-JWT.
            Disclosure::new_unchecked(disclosure)
        })
    }
}

/// SD-JWT components, whether coming from an issued SD-JWT or from a
/// presentation.
#[derive(Debug, PartialEq)]
pub struct PartsRef<'a> {
    /// Issuer-signed JWT.
    pub jwt: &'a Jws,

    pub disclosures: Vec<&'a Disclosure>,

    /// Key binding JWT, only found in presentations.
    pub key_binding_jwt: Option<&'a Jws>,
}

impl<'a> PartsRef<'a> {
    pub fn new(jwt: &'a Jws, disclosures: Vec<&'a Disclosure>) -> Self {
        Self {
            jwt,
            disclosures,
            key_binding_jwt: None,
        }
    }

    /// Decodes and reveals the SD-JWT, without checking the signature.
    pub fn decode_reveal_any(&self) -> Result<RevealedSdJwt<'a>, RevealError> {
        self.decode()?.reveal()
    }
}

impl fmt::Display for PartsRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~", self.jwt)?;
        for disclosure in &self.disclosures {
            write!(f, "{disclosure}~")?;
        }

        match self.key_binding_jwt {
            Some(kb_jwt) => write!(f, "{kb_jwt}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DisclosureBuf, DisclosureDescription, SdAlg};
    use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
    use serde_json::json;

    const JWT: &str = "eyJhbGciOiJFUzI1NiJ9.e30.c2ln";
    const DISCLOSURE_A: &str = "WyJzYWx0IiwgImEiLCAxXQ";
    const DISCLOSURE_B: &str = "WyJzYWx0IiwgImIiLCAyXQ";

    #[test]
    fn parse() {
        let input = format!("{JWT}~{DISCLOSURE_A}~{DISCLOSURE_B}~");
        let sd_jwt = SdJwt::new(&input).unwrap();

        assert_eq!(sd_jwt.jwt().as_str(), JWT);
        assert_eq!(
            sd_jwt.parts(),
            PartsRef::new(
                Jws::new(JWT).unwrap(),
                vec![
                    Disclosure::new(DISCLOSURE_A).unwrap(),
                    Disclosure::new(DISCLOSURE_B).unwrap()
                ]
            )
        );
        assert_eq!(sd_jwt.parts().to_string(), input);
    }

    #[test]
    fn trailing_separator_is_required() {
        assert!(SdJwt::new("").is_err());
        assert!(SdJwt::new(JWT).is_err());
        assert!(SdJwt::new(&format!("{JWT}~{DISCLOSURE_A}")).is_err());
        assert!(SdJwt::new(&format!("{JWT}~~")).is_err());
        assert!(SdJwt::new(&format!("{JWT}~{DISCLOSURE_A}~~")).is_err());
        assert!(SdJwt::new(&format!("{JWT}~not base64~")).is_err());

        let bare = format!("{JWT}~");
        let sd_jwt = SdJwt::new(&bare).unwrap();
        assert_eq!(sd_jwt.disclosures().count(), 0);
    }

    #[test]
    fn serde() {
        let sd_jwt: SdJwtBuf = format!("{JWT}~{DISCLOSURE_A}~").parse().unwrap();
        let value = serde_json::to_value(&sd_jwt).unwrap();
        assert_eq!(value, json!(format!("{JWT}~{DISCLOSURE_A}~")));
        assert_eq!(serde_json::from_value::<SdJwtBuf>(value).unwrap(), sd_jwt);
        assert!(serde_json::from_value::<SdJwtBuf>(json!(JWT)).is_err());
    }

    #[test]
    fn re_encode_sorts_by_pointer() {
        let region = DisclosureBuf::encode_from_parts(
            "c2FsdC0x",
            &DisclosureDescription::ObjectEntry {
                key: "region".to_owned(),
                value: json!("港区"),
            },
        );
        let country = DisclosureBuf::encode_from_parts(
            "c2FsdC0y",
            &DisclosureDescription::ObjectEntry {
                key: "country".to_owned(),
                value: json!("JP"),
            },
        );

        let payload = json!({
            "address": {
                "_sd": [SdAlg::Sha256.hash(&region), SdAlg::Sha256.hash(&country)]
            },
            "_sd_alg": "sha-256"
        });
        let jwt = format!(
            "eyJhbGciOiJFUzI1NiJ9.{}.c2ln",
            BASE64_URL_SAFE_NO_PAD.encode(payload.to_string())
        );

        let input = format!("{jwt}~{}~{}~", region.as_str(), country.as_str());
        let revealed = SdJwt::new(&input).unwrap().decode_reveal_any().unwrap();
        assert_eq!(
            revealed.claims()["address"],
            json!({ "region": "港区", "country": "JP" })
        );

        // `/address/country` sorts before `/address/region`.
        assert_eq!(
            revealed.into_encoded().as_str(),
            format!("{jwt}~{}~{}~", country.as_str(), region.as_str())
        );
    }
}
