use crate::{utils::is_url_safe_base64_char, DecodeError, RESERVED_CLAIM_NAMES};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};
use std::{
    borrow::{Borrow, Cow},
    fmt,
};

/// Invalid SD-JWT disclosure.
#[derive(Debug, thiserror::Error)]
#[error("invalid SD-JWT disclosure: `{0}`")]
pub struct InvalidDisclosure<T>(pub T);

/// Disclosure in its encoded form: the url-safe base64 (unpadded) encoding of
/// a `[salt, name, value]` or `[salt, value]` JSON array.
///
/// Digests are computed over this text.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Disclosure([u8]);

impl Disclosure {
    pub fn new<T: ?Sized + AsRef<[u8]>>(disclosure: &T) -> Result<&Self, InvalidDisclosure<&T>> {
        match disclosure.as_ref() {
            [] => Err(InvalidDisclosure(disclosure)),
            bytes if bytes.iter().all(|b| is_url_safe_base64_char(*b)) => {
                Ok(unsafe { Self::new_unchecked(bytes) })
            }
            _ => Err(InvalidDisclosure(disclosure)),
        }
    }

    /// # Safety
    ///
    /// `bytes` must be non-empty url-safe base64, without padding.
    pub unsafe fn new_unchecked(bytes: &[u8]) -> &Self {
        std::mem::transmute(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        unsafe {
            // SAFETY: base64 is ASCII.
            std::str::from_utf8_unchecked(&self.0)
        }
    }

    pub fn decode(&self) -> Result<DecodedDisclosure, DecodeError> {
        DecodedDisclosure::new(self)
    }
}

impl AsRef<[u8]> for Disclosure {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<str> for Disclosure {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl ToOwned for Disclosure {
    type Owned = DisclosureBuf;

    fn to_owned(&self) -> DisclosureBuf {
        DisclosureBuf(self.0.to_vec())
    }
}

/// Owned encoded disclosure.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisclosureBuf(Vec<u8>);

impl DisclosureBuf {
    /// Encodes the disclosure array as compact JSON, then base64url.
    ///
    /// Equal inputs always give the same text.
    pub fn encode_from_parts(salt: &str, desc: &DisclosureDescription) -> Self {
        let json = desc.to_value(salt).to_string();
        Self(BASE64_URL_SAFE_NO_PAD.encode(json).into_bytes())
    }

    pub fn as_disclosure(&self) -> &Disclosure {
        unsafe {
            // SAFETY: base64url output is never empty for a JSON array.
            Disclosure::new_unchecked(&self.0)
        }
    }
}

impl std::ops::Deref for DisclosureBuf {
    type Target = Disclosure;

    fn deref(&self) -> &Disclosure {
        self.as_disclosure()
    }
}

impl Borrow<Disclosure> for DisclosureBuf {
    fn borrow(&self) -> &Disclosure {
        self.as_disclosure()
    }
}

impl fmt::Display for DisclosureBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_disclosure(), f)
    }
}

impl fmt::Debug for DisclosureBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_disclosure(), f)
    }
}

/// Disclosure together with its decoded salt and claim.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDisclosure<'a> {
    /// Text the disclosure was decoded from, never re-encoded.
    pub encoded: Cow<'a, Disclosure>,

    pub salt: String,

    pub desc: DisclosureDescription,
}

impl<'a> DecodedDisclosure<'a> {
    /// Decodes a disclosure.
    ///
    /// Any array other than `[string, string, any]` or `[string, any]` is
    /// malformed. Object entries may not name a reserved claim.
    pub fn new(encoded: &'a (impl ?Sized + AsRef<[u8]>)) -> Result<Self, DecodeError> {
        let encoded = Disclosure::new(encoded).map_err(|_| DecodeError::MalformedDisclosure)?;

        let json = BASE64_URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|_| DecodeError::MalformedDisclosure)?;
        let items: Vec<Value> =
            serde_json::from_slice(&json).map_err(|_| DecodeError::MalformedDisclosure)?;

        let mut items = items.into_iter();
        let (salt, desc) = match (items.next(), items.next(), items.next(), items.next()) {
            (Some(Value::String(salt)), Some(value), None, None) => {
                (salt, DisclosureDescription::ArrayItem(value))
            }
            (Some(Value::String(salt)), Some(Value::String(key)), Some(value), None) => {
                if RESERVED_CLAIM_NAMES.contains(&key.as_str()) {
                    return Err(DecodeError::ReservedClaimName(key));
                }

                (salt, DisclosureDescription::ObjectEntry { key, value })
            }
            _ => return Err(DecodeError::MalformedDisclosure),
        };

        Ok(Self {
            encoded: Cow::Borrowed(encoded),
            salt,
            desc,
        })
    }

    pub fn from_parts(salt: String, desc: DisclosureDescription) -> Self {
        Self {
            encoded: Cow::Owned(DisclosureBuf::encode_from_parts(&salt, &desc)),
            salt,
            desc,
        }
    }

    /// Claim name of an object entry disclosure.
    pub fn claim_name(&self) -> Option<&str> {
        match &self.desc {
            DisclosureDescription::ObjectEntry { key, .. } => Some(key),
            DisclosureDescription::ArrayItem(_) => None,
        }
    }

    pub fn value(&self) -> &Value {
        match &self.desc {
            DisclosureDescription::ObjectEntry { value, .. }
            | DisclosureDescription::ArrayItem(value) => value,
        }
    }

    pub fn into_owned(self) -> DecodedDisclosure<'static> {
        DecodedDisclosure {
            encoded: Cow::Owned(self.encoded.into_owned()),
            salt: self.salt,
            desc: self.desc,
        }
    }
}

/// What a disclosure reveals.
#[derive(Debug, Clone, PartialEq)]
pub enum DisclosureDescription {
    /// Object member, whose digest sits in the `_sd` array of its parent.
    ObjectEntry { key: String, value: Value },

    /// Array element, replaced by a `{"...": digest}` placeholder.
    ArrayItem(Value),
}

impl DisclosureDescription {
    /// Disclosure array for the given salt.
    pub fn to_value(&self, salt: &str) -> Value {
        match self {
            Self::ObjectEntry { key, value } => json!([salt, key, value]),
            Self::ArrayItem(value) => json!([salt, value]),
        }
    }
}
