//! Selective Disclosure for JWTs ([SD-JWT]).
//!
//! [SD-JWT]: <https://datatracker.ietf.org/doc/draft-ietf-oauth-selective-disclosure-jwt/>
//!
//! # Usage
//!
//! Three roles exchange an SD-JWT:
//! ```text
//! ┌────────┐  SdJwtBuf + disclosures  ┌────────┐   SdJwtKbBuf    ┌──────────┐
//! │        │ ───────────────────────► │        │ ──────────────► │          │
//! │ Issuer │                          │ Holder │                 │ Verifier │ ─► VerifiedSdJwt
//! │        │                          │        │                 │          │
//! └────────┘                          └────────┘                 └──────────┘
//! ```
//!
//! The [`Issuer`] conceals the claims addressed by a list of JSON pointers,
//! replacing them with digests, and signs the result. The [`Holder`] selects
//! which disclosures to reveal and optionally appends a key binding JWT
//! proving possession of the key bound in the `cnf` claim. The [`Verifier`]
//! checks the whole presentation and returns the reconstructed claims.
//!
//! Lower level building blocks are also available. The [`SdJwt::decode`]
//! function decodes the SD-JWT header, payload and disclosures into a
//! [`DecodedSdJwt`], whose claims are still concealed. The
//! [`DecodedSdJwt::reveal`] function then uses the disclosures to reveal the
//! disclosed claims and discard the non-disclosed ones.
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use sdkit_jws::DecodedJws;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{borrow::Borrow, collections::BTreeMap};

pub use sdkit_core::{json_pointer, JsonPointer, JsonPointerBuf};

pub(crate) mod utils;

mod compact;
pub use compact::*;

mod digest;
pub use digest::*;

mod decode;
pub use decode::*;

mod disclosure;
pub use disclosure::*;

mod conceal;
pub use conceal::*;

mod reveal;
pub use reveal::*;

mod kb;
pub use kb::*;

mod issuer;
pub use issuer::*;

mod holder;
pub use holder::*;

mod verify;
pub use verify::*;

const SD_CLAIM_NAME: &str = "_sd";
const SD_ALG_CLAIM_NAME: &str = "_sd_alg";
const ARRAY_CLAIM_ITEM_PROPERTY_NAME: &str = "...";

/// Claim names an issuer may not use, and a disclosure may not carry.
pub const RESERVED_CLAIM_NAMES: [&str; 3] =
    [SD_CLAIM_NAME, ARRAY_CLAIM_ITEM_PROPERTY_NAME, SD_ALG_CLAIM_NAME];

/// Undisclosed SD-JWT payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdJwtPayload {
    /// Digest algorithm of the concealed claims, absent when the payload
    /// holds no digest.
    #[serde(rename = "_sd_alg", skip_serializing_if = "Option::is_none")]
    pub sd_alg: Option<SdAlg>,

    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Decoded SD-JWT, with its claims still concealed.
#[derive(Debug, Clone)]
pub struct DecodedSdJwt<'a> {
    pub jwt: DecodedJws<SdJwtPayload>,

    /// Decoded disclosures, in presentation order.
    pub disclosures: Vec<DecodedDisclosure<'a>>,
}

/// Disclosures indexed by the pointer of the claim they reveal.
pub type DisclosureMap<'a> = BTreeMap<JsonPointerBuf, DecodedDisclosure<'a>>;

/// SD-JWT with its claims revealed.
///
/// The signing bytes of `jwt` are those of the concealed payload, so the
/// SD-JWT can be encoded again after filtering its disclosures.
#[derive(Debug, Clone)]
pub struct RevealedSdJwt<'a> {
    pub jwt: DecodedJws<Map<String, Value>>,

    pub sd_alg: Option<SdAlg>,

    pub disclosures: DisclosureMap<'a>,
}

impl<'a> RevealedSdJwt<'a> {
    pub fn claims(&self) -> &Map<String, Value> {
        &self.jwt.payload
    }

    pub fn into_claims(self) -> Map<String, Value> {
        self.jwt.payload
    }

    /// Drops every disclosure.
    pub fn clear(&mut self) {
        self.disclosures.clear()
    }

    /// Moves the disclosures targeting `pointers` out of this SD-JWT.
    fn take(&mut self, pointers: &[impl Borrow<JsonPointer>]) -> DisclosureMap<'a> {
        pointers
            .iter()
            .filter_map(|p| self.disclosures.remove_entry(p.borrow()))
            .collect()
    }

    /// Keeps only the disclosures targeting `pointers`, returning the
    /// others.
    pub fn retain(&mut self, pointers: &[impl Borrow<JsonPointer>]) -> DisclosureMap<'a> {
        let kept = self.take(pointers);
        std::mem::replace(&mut self.disclosures, kept)
    }

    pub fn retaining(mut self, pointers: &[impl Borrow<JsonPointer>]) -> Self {
        self.retain(pointers);
        self
    }

    /// Removes the disclosures targeting `pointers` and returns them.
    pub fn reject(&mut self, pointers: &[impl Borrow<JsonPointer>]) -> DisclosureMap<'a> {
        self.take(pointers)
    }

    pub fn rejecting(mut self, pointers: &[impl Borrow<JsonPointer>]) -> Self {
        self.reject(pointers);
        self
    }

    /// Encodes the SD-JWT again, with the remaining disclosures sorted by
    /// pointer.
    pub fn into_encoded(self) -> SdJwtBuf {
        let signature = BASE64_URL_SAFE_NO_PAD.encode(&self.jwt.signature);

        let mut encoded = self.jwt.signing_bytes;
        encoded.push(b'.');
        encoded.extend_from_slice(signature.as_bytes());
        encoded.push(b'~');
        for disclosure in self.disclosures.values() {
            encoded.extend_from_slice(disclosure.encoded.as_bytes());
            encoded.push(b'~');
        }

        unsafe {
            // SAFETY: a signed JWT followed by `~`-terminated disclosures.
            SdJwtBuf::new_unchecked(encoded)
        }
    }
}
