use crate::{utils::is_url_safe_base64_char, DecodeError, DecodedJws, Header, InvalidHeader};
pub use base64::DecodeError as Base64DecodeError;
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use sdkit_core::BytesBuf;
use std::{borrow::Borrow, fmt, ops::Deref, str::FromStr};

/// Invalid compact JWS.
#[derive(Debug, thiserror::Error)]
#[error("invalid compact JWS")]
pub struct InvalidJws<B = String>(pub B);

/// Borrowed compact JWS.
///
/// A compact JWS is made of three url-safe base64 (without padding) segments
/// separated by periods: the protected header, the payload and the
/// signature. Only the payload may be empty.
///
/// This is an unsized type borrowing the JWS and meant to be referenced as
/// `&Jws`, just like `&str`. Use [`JwsBuf`] if you need to own the JWS.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Jws([u8]);

impl Jws {
    pub fn new<T>(data: &T) -> Result<&Self, InvalidJws<&T>>
    where
        T: ?Sized + AsRef<[u8]>,
    {
        let bytes = data.as_ref();
        if Self::validate(bytes) {
            Ok(unsafe { Self::new_unchecked(bytes) })
        } else {
            Err(InvalidJws(data))
        }
    }

    /// Creates a new compact JWS without checking the data.
    ///
    /// # Safety
    ///
    /// The input `data` must represent a valid compact JWS.
    pub const unsafe fn new_unchecked(data: &[u8]) -> &Self {
        std::mem::transmute(data)
    }

    pub const fn validate(bytes: &[u8]) -> bool {
        Self::validate_range(bytes, 0, bytes.len())
    }

    /// Checks that `bytes[start..end]` is a compact JWS.
    pub const fn validate_range(bytes: &[u8], start: usize, end: usize) -> bool {
        let end = if end > bytes.len() { bytes.len() } else { end };

        let mut i = start;
        let mut periods = 0;
        let mut segment_len = 0;

        while i < end {
            if bytes[i] == b'.' {
                // Header must not be empty.
                if periods == 0 && segment_len == 0 {
                    return false;
                }

                periods += 1;
                segment_len = 0;
            } else if is_url_safe_base64_char(bytes[i]) {
                segment_len += 1
            } else {
                return false;
            }

            i += 1
        }

        // Signature must not be empty.
        periods == 2 && segment_len > 0
    }

    #[allow(clippy::len_without_is_empty)] // A JWS cannot be empty.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn header_end(&self) -> usize {
        self.0.iter().position(|b| *b == b'.').unwrap_or(0)
    }

    fn signature_start(&self) -> usize {
        self.0.len() - self.0.iter().rev().position(|b| *b == b'.').unwrap_or(0)
    }

    fn payload_start(&self) -> usize {
        self.header_end() + 1
    }

    fn payload_end(&self) -> usize {
        self.signature_start() - 1
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        unsafe {
            // SAFETY: compact JWS are url-safe base64 strings, hence ASCII.
            std::str::from_utf8_unchecked(&self.0)
        }
    }

    /// Returns the Base64 encoded header.
    pub fn header(&self) -> &[u8] {
        &self.0[..self.header_end()]
    }

    pub fn decode_header(&self) -> Result<Header, InvalidHeader> {
        Header::decode(self.header())
    }

    /// Returns the Base64 encoded payload.
    pub fn payload(&self) -> &[u8] {
        &self.0[self.payload_start()..self.payload_end()]
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>, Base64DecodeError> {
        BASE64_URL_SAFE_NO_PAD.decode(self.payload())
    }

    /// Returns the Base64 encoded signature.
    pub fn signature(&self) -> &[u8] {
        &self.0[self.signature_start()..]
    }

    pub fn decode_signature(&self) -> Result<Vec<u8>, Base64DecodeError> {
        BASE64_URL_SAFE_NO_PAD.decode(self.signature())
    }

    /// Returns the signing bytes.
    ///
    /// It is the concatenation of the Base64 encoded headers, a period '.' and
    /// the Base64 encoded payload.
    pub fn signing_bytes(&self) -> &[u8] {
        &self.0[..self.payload_end()]
    }

    /// Decodes the entire JWS.
    pub fn decode(&self) -> Result<DecodedJws<Vec<u8>>, DecodeError> {
        let header = self.decode_header().map_err(DecodeError::Header)?;
        let payload = self.decode_payload().map_err(DecodeError::Payload)?;
        let signature = self.decode_signature().map_err(DecodeError::Signature)?;

        Ok(DecodedJws {
            signing_bytes: self.signing_bytes().to_vec(),
            header,
            payload,
            signature,
        })
    }
}

impl AsRef<[u8]> for Jws {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<str> for Jws {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl ToOwned for Jws {
    type Owned = JwsBuf;

    fn to_owned(&self) -> Self::Owned {
        JwsBuf(self.0.to_owned())
    }
}

impl fmt::Display for Jws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Debug for Jws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Owned compact JWS.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JwsBuf(Vec<u8>);

impl JwsBuf {
    pub fn new<B: BytesBuf>(bytes: B) -> Result<Self, InvalidJws<B>> {
        if Jws::validate(bytes.as_ref()) {
            Ok(Self(bytes.into()))
        } else {
            Err(InvalidJws(bytes))
        }
    }

    /// Creates a new compact JWS from its signing bytes and the (raw)
    /// signature.
    pub fn from_signing_bytes_and_signature(
        signing_bytes: Vec<u8>,
        signature: &[u8],
    ) -> Result<Self, InvalidJws<Vec<u8>>> {
        let mut bytes = signing_bytes;
        bytes.push(b'.');
        bytes.extend(BASE64_URL_SAFE_NO_PAD.encode(signature).into_bytes());
        Self::new(bytes)
    }

    pub fn as_jws(&self) -> &Jws {
        unsafe {
            // SAFETY: the inner bytes are a compact JWS by construction.
            Jws::new_unchecked(&self.0)
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn into_string(self) -> String {
        unsafe {
            // SAFETY: compact JWS are ASCII strings.
            String::from_utf8_unchecked(self.0)
        }
    }
}

impl Deref for JwsBuf {
    type Target = Jws;

    fn deref(&self) -> &Self::Target {
        self.as_jws()
    }
}

impl Borrow<Jws> for JwsBuf {
    fn borrow(&self) -> &Jws {
        self.as_jws()
    }
}

impl AsRef<Jws> for JwsBuf {
    fn as_ref(&self) -> &Jws {
        self.as_jws()
    }
}

impl FromStr for JwsBuf {
    type Err = InvalidJws;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl fmt::Display for JwsBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_jws().fmt(f)
    }
}

impl fmt::Debug for JwsBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_jws().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar() {
        assert!(Jws::validate(b"eyJhbGciOiJFUzI1NiJ9.e30.c2ln"));
        assert!(Jws::validate(b"eyJhbGciOiJFUzI1NiJ9..c2ln"));
        assert!(!Jws::validate(b".e30.c2ln"));
        assert!(!Jws::validate(b"eyJhbGciOiJFUzI1NiJ9.e30."));
        assert!(!Jws::validate(b"eyJhbGciOiJFUzI1NiJ9.e30"));
        assert!(!Jws::validate(b"a.b.c.d"));
        assert!(!Jws::validate(b"a.b+.c"));
        assert!(Jws::validate_range(b"xa.b.c~", 1, 6));
    }

    #[test]
    fn parts() {
        let jws = Jws::new("eyJhbGciOiJFUzI1NiJ9.e30.c2ln").unwrap();
        assert_eq!(jws.header(), b"eyJhbGciOiJFUzI1NiJ9");
        assert_eq!(jws.payload(), b"e30");
        assert_eq!(jws.signature(), b"c2ln");
        assert_eq!(jws.signing_bytes(), b"eyJhbGciOiJFUzI1NiJ9.e30");

        let decoded = jws.decode().unwrap();
        assert_eq!(decoded.header.algorithm, sdkit_jwk::Algorithm::ES256);
        assert_eq!(decoded.payload, b"{}");
        assert_eq!(decoded.signature, b"sig");
        assert_eq!(decoded.into_encoded().unwrap().as_jws(), jws);
    }
}
