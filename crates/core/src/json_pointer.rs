use std::{borrow::Cow, fmt, ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};

/// Creates a `&'static JsonPointer` from a string literal.
///
/// Panics if the literal is not a JSON pointer, at compile time when used in
/// a const context.
#[macro_export]
macro_rules! json_pointer {
    ($value:literal) => {
        match $crate::JsonPointer::from_str_const($value) {
            Ok(p) => p,
            Err(_) => panic!("invalid JSON pointer"),
        }
    };
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("invalid JSON pointer `{0}`")]
pub struct InvalidJsonPointer<T = String>(pub T);

/// JSON Pointer ([RFC 6901]), addressing a value inside a claim tree.
///
/// Pointers name the claims an issuer conceals, and the position at which a
/// disclosure was revealed.
///
/// [RFC 6901]: <https://datatracker.ietf.org/doc/html/rfc6901>
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct JsonPointer(str);

impl JsonPointer {
    /// The empty pointer, addressing the whole document.
    pub const ROOT: &'static Self = unsafe { Self::new_unchecked("") };

    pub fn new<S: ?Sized + AsRef<str>>(s: &S) -> Result<&Self, InvalidJsonPointer<&S>> {
        if Self::validate(s.as_ref()) {
            Ok(unsafe { Self::new_unchecked(s.as_ref()) })
        } else {
            Err(InvalidJsonPointer(s))
        }
    }

    pub const fn from_str_const(s: &str) -> Result<&Self, InvalidJsonPointer<&str>> {
        if Self::validate(s) {
            Ok(unsafe { Self::new_unchecked(s) })
        } else {
            Err(InvalidJsonPointer(s))
        }
    }

    /// # Safety
    ///
    /// `s` must be a JSON pointer.
    pub const unsafe fn new_unchecked(s: &str) -> &Self {
        std::mem::transmute(s)
    }

    /// A pointer is empty or starts with `/`, and every `~` opens a `~0` or
    /// `~1` escape.
    pub const fn validate(s: &str) -> bool {
        let bytes = s.as_bytes();
        if !bytes.is_empty() && bytes[0] != b'/' {
            return false;
        }

        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'~' {
                if i + 1 == bytes.len() || (bytes[i + 1] != b'0' && bytes[i + 1] != b'1') {
                    return false;
                }
                i += 1
            }
            i += 1
        }

        true
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Splits off the first reference token, or returns `None` on the root
    /// pointer.
    pub fn split_first(&self) -> Option<(&ReferenceToken, &Self)> {
        let tail = self.0.strip_prefix('/')?;
        let end = tail.find('/').unwrap_or(tail.len());
        let (token, rest) = tail.split_at(end);
        Some(unsafe { (ReferenceToken::new_unchecked(token), Self::new_unchecked(rest)) })
    }

    /// Whether `other` addresses a value strictly inside the one addressed by
    /// `self`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn iter(&self) -> ReferenceTokens {
        ReferenceTokens(self)
    }
}

impl Default for &JsonPointer {
    fn default() -> Self {
        JsonPointer::ROOT
    }
}

impl ToOwned for JsonPointer {
    type Owned = JsonPointerBuf;

    fn to_owned(&self) -> JsonPointerBuf {
        JsonPointerBuf(self.0.to_owned())
    }
}

impl AsRef<JsonPointer> for JsonPointer {
    fn as_ref(&self) -> &JsonPointer {
        self
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for JsonPointer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'a> IntoIterator for &'a JsonPointer {
    type Item = &'a ReferenceToken;
    type IntoIter = ReferenceTokens<'a>;

    fn into_iter(self) -> ReferenceTokens<'a> {
        self.iter()
    }
}

/// Iterator over the reference tokens of a [`JsonPointer`].
pub struct ReferenceTokens<'a>(&'a JsonPointer);

impl<'a> Iterator for ReferenceTokens<'a> {
    type Item = &'a ReferenceToken;

    fn next(&mut self) -> Option<Self::Item> {
        let (token, rest) = self.0.split_first()?;
        self.0 = rest;
        Some(token)
    }
}

/// Owned JSON pointer.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JsonPointerBuf(String);

impl JsonPointerBuf {
    pub fn new(value: String) -> Result<Self, InvalidJsonPointer> {
        if JsonPointer::validate(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidJsonPointer(value))
        }
    }

    /// Appends an unescaped reference token.
    pub fn push(&mut self, token: &str) {
        self.0.reserve(token.len() + 1);
        self.0.push('/');
        for c in token.chars() {
            match c {
                '~' => self.0.push_str("~0"),
                '/' => self.0.push_str("~1"),
                c => self.0.push(c),
            }
        }
    }

    pub fn push_index(&mut self, i: usize) {
        self.push(&i.to_string())
    }

    pub fn as_json_pointer(&self) -> &JsonPointer {
        unsafe { JsonPointer::new_unchecked(&self.0) }
    }
}

impl Deref for JsonPointerBuf {
    type Target = JsonPointer;

    fn deref(&self) -> &JsonPointer {
        self.as_json_pointer()
    }
}

impl std::borrow::Borrow<JsonPointer> for JsonPointerBuf {
    fn borrow(&self) -> &JsonPointer {
        self.as_json_pointer()
    }
}

impl AsRef<JsonPointer> for JsonPointerBuf {
    fn as_ref(&self) -> &JsonPointer {
        self.as_json_pointer()
    }
}

impl FromStr for JsonPointerBuf {
    type Err = InvalidJsonPointer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl TryFrom<String> for JsonPointerBuf {
    type Error = InvalidJsonPointer;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for JsonPointerBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for JsonPointerBuf {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JsonPointerBuf {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::new(String::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

/// Reference token of a JSON pointer, still escaped.
#[derive(Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct ReferenceToken(str);

impl ReferenceToken {
    /// # Safety
    ///
    /// `s` must not contain `/`, and every `~` in it must open a `~0` or `~1`
    /// escape.
    pub const unsafe fn new_unchecked(s: &str) -> &Self {
        std::mem::transmute(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unescaped token, borrowed when there is nothing to unescape.
    pub fn to_decoded(&self) -> Cow<str> {
        if self.0.contains('~') {
            Cow::Owned(self.decode())
        } else {
            Cow::Borrowed(&self.0)
        }
    }

    pub fn decode(&self) -> String {
        // `~1` first, so that `~01` decodes to `~1`.
        self.0.replace("~1", "/").replace("~0", "~")
    }

    /// Array index denoted by this token. Leading zeros are not allowed.
    pub fn as_array_index(&self) -> Option<usize> {
        match self.0.as_bytes() {
            [b'0'] => Some(0),
            [b'1'..=b'9', rest @ ..] if rest.iter().all(u8::is_ascii_digit) => self.0.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ReferenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
