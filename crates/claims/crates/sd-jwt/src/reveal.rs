use crate::{
    disclosure::{DecodedDisclosure, DisclosureDescription},
    utils::TryRetainMut,
    DecodeError, DecodedSdJwt, RevealedSdJwt, SdAlg, SdJwtPayload,
    ARRAY_CLAIM_ITEM_PROPERTY_NAME, SD_ALG_CLAIM_NAME, SD_CLAIM_NAME,
};
use indexmap::{map::Entry, IndexMap};
use sdkit_core::{JsonPointer, JsonPointerBuf};
use serde_json::Value;
use std::collections::HashSet;

/// Reveal error.
///
/// Error type used by the [`DecodedSdJwt::reveal`] function.
#[derive(Debug, thiserror::Error)]
pub enum RevealError {
    /// SD-JWT decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Digests or disclosures are present but the `_sd_alg` claim is not.
    #[error("missing `_sd_alg` claim")]
    MissingSdAlg,

    /// Disclosure whose digest does not appear in the payload.
    #[error("unresolved disclosure `{0}`")]
    UnresolvedDisclosure(String),

    /// Digest appearing more than once.
    #[error("duplicate digest `{0}`")]
    DuplicateDigest(String),

    /// Disclosed claim name already present in the same object.
    #[error("claim collision on `{0}`")]
    ClaimNameCollision(String),

    /// `_sd` claim value is not an array.
    #[error("`_sd` claim value is not an array")]
    SdClaimValueNotArray,

    /// Invalid disclosure hash.
    #[error("invalid disclosure hash value")]
    InvalidDisclosureHash,

    /// Expected object entry, found array item disclosure.
    #[error("expected object entry disclosure, found array item disclosure for digest `{0}`")]
    ExpectedObjectEntryDisclosure(String),

    /// Expected array item disclosure, found object entry disclosure.
    #[error("expected array item disclosure, found object entry disclosure for digest `{0}`")]
    ExpectedArrayItemDisclosure(String),
}

impl<'a> DecodedSdJwt<'a> {
    /// Reveal the SD-JWT.
    ///
    /// Every disclosure must be referenced exactly once by a digest of the
    /// payload or of another disclosed value. Undisclosed digests are
    /// dropped along with the `_sd` and `_sd_alg` bookkeeping claims.
    pub fn reveal(self) -> Result<RevealedSdJwt<'a>, RevealError> {
        let sd_alg = self.jwt.payload.sd_alg;
        let mut pointers = Vec::with_capacity(self.disclosures.len());
        let jwt = self
            .jwt
            .try_map(|payload| payload.reveal(&self.disclosures, &mut pointers))?;

        Ok(RevealedSdJwt {
            jwt,
            sd_alg,
            disclosures: pointers.into_iter().zip(self.disclosures).collect(),
        })
    }
}

impl SdJwtPayload {
    /// Reveal the SD-JWT payload.
    ///
    /// Pushes onto `pointers` the location of each disclosure, in order.
    pub fn reveal(
        &self,
        disclosures: &[DecodedDisclosure],
        pointers: &mut Vec<JsonPointerBuf>,
    ) -> Result<serde_json::Map<String, Value>, RevealError> {
        let mut state = RevealState {
            sd_alg: self.sd_alg,
            disclosures: IndexMap::with_capacity(disclosures.len()),
            digests: HashSet::new(),
        };

        if !disclosures.is_empty() {
            let sd_alg = self.sd_alg.ok_or(RevealError::MissingSdAlg)?;
            for disclosure in disclosures {
                let in_progress = InProgressDisclosure::new(disclosure, sd_alg);
                match state.disclosures.entry(in_progress.hash.clone()) {
                    Entry::Occupied(entry) => {
                        return Err(RevealError::DuplicateDigest(entry.key().clone()))
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(in_progress);
                    }
                }
            }
        }

        let mut disclosed_claims = self.claims.clone();
        state.reveal_object(JsonPointer::ROOT, &mut disclosed_claims)?;

        for (_, disclosure) in state.disclosures {
            pointers.push(disclosure.pointer.ok_or_else(|| {
                RevealError::UnresolvedDisclosure(disclosure.disclosure.encoded.to_string())
            })?);
        }

        Ok(disclosed_claims)
    }
}

#[derive(Debug)]
struct InProgressDisclosure<'d, 'a> {
    disclosure: &'d DecodedDisclosure<'a>,
    hash: String,
    pointer: Option<JsonPointerBuf>,
}

impl<'d, 'a> InProgressDisclosure<'d, 'a> {
    fn new(disclosure: &'d DecodedDisclosure<'a>, sd_alg: SdAlg) -> Self {
        InProgressDisclosure {
            disclosure,
            hash: sd_alg.hash(&disclosure.encoded),
            pointer: None,
        }
    }
}

struct RevealState<'d, 'a> {
    sd_alg: Option<SdAlg>,
    disclosures: IndexMap<String, InProgressDisclosure<'d, 'a>>,

    /// Every digest met so far, disclosed or not.
    digests: HashSet<String>,
}

impl<'d, 'a> RevealState<'d, 'a> {
    fn record_digest(&mut self, digest: &str) -> Result<(), RevealError> {
        if self.sd_alg.is_none() {
            return Err(RevealError::MissingSdAlg);
        }

        if !self.digests.insert(digest.to_owned()) {
            return Err(RevealError::DuplicateDigest(digest.to_owned()));
        }

        Ok(())
    }

    fn reveal_value(&mut self, pointer: &JsonPointer, value: &mut Value) -> Result<(), RevealError> {
        match value {
            Value::Object(object) => self.reveal_object(pointer, object),
            Value::Array(array) => array.try_retain_mut(|i, item| {
                let mut pointer = pointer.to_owned();
                pointer.push_index(i);

                match as_concealed_array_item(item) {
                    Some(hash) => {
                        let hash = hash.to_owned();
                        self.record_digest(&hash)?;

                        let Some(in_progress) = self.disclosures.get_mut(&hash) else {
                            return Ok(false);
                        };

                        let disclosure = in_progress.disclosure;
                        match &disclosure.desc {
                            DisclosureDescription::ArrayItem(value) => {
                                in_progress.pointer = Some(pointer.clone());
                                *item = value.clone();
                                self.reveal_value(&pointer, item)?;
                                Ok(true)
                            }
                            DisclosureDescription::ObjectEntry { .. } => {
                                Err(RevealError::ExpectedArrayItemDisclosure(hash))
                            }
                        }
                    }
                    None => {
                        self.reveal_value(&pointer, item)?;
                        Ok(true)
                    }
                }
            }),
            _ => Ok(()),
        }
    }

    fn reveal_object(
        &mut self,
        pointer: &JsonPointer,
        object: &mut serde_json::Map<String, Value>,
    ) -> Result<(), RevealError> {
        object.remove(SD_ALG_CLAIM_NAME);

        // Process `_sd` claim.
        if let Some(sd_claims) = object.remove(SD_CLAIM_NAME) {
            for (key, value) in self.reveal_sd_claim(pointer, &sd_claims)? {
                if object.contains_key(&key) {
                    return Err(RevealError::ClaimNameCollision(key));
                }

                object.insert(key, value);
            }
        }

        // Visit sub-values, including the ones just disclosed.
        for (key, sub_value) in object {
            let mut pointer = pointer.to_owned();
            pointer.push(key);
            self.reveal_value(&pointer, sub_value)?
        }

        Ok(())
    }

    fn reveal_sd_claim(
        &mut self,
        pointer: &JsonPointer,
        sd_claim: &Value,
    ) -> Result<Vec<(String, Value)>, RevealError> {
        let hashes = sd_claim
            .as_array()
            .ok_or(RevealError::SdClaimValueNotArray)?;

        let mut found_disclosures = vec![];

        for disclosure_hash in hashes {
            let disclosure_hash = disclosure_hash
                .as_str()
                .ok_or(RevealError::InvalidDisclosureHash)?;

            self.record_digest(disclosure_hash)?;

            if let Some(in_progress) = self.disclosures.get_mut(disclosure_hash) {
                match &in_progress.disclosure.desc {
                    DisclosureDescription::ArrayItem(_) => {
                        return Err(RevealError::ExpectedObjectEntryDisclosure(
                            disclosure_hash.to_owned(),
                        ))
                    }
                    DisclosureDescription::ObjectEntry { key, value } => {
                        if found_disclosures.iter().any(|(k, _)| k == key) {
                            return Err(RevealError::ClaimNameCollision(key.clone()));
                        }

                        let mut pointer = pointer.to_owned();
                        pointer.push(key);
                        in_progress.pointer = Some(pointer);

                        found_disclosures.push((key.clone(), value.clone()))
                    }
                }
            }
        }

        Ok(found_disclosures)
    }
}

/// Returns the digest of an array item placeholder (`{"...": digest}`).
pub(crate) fn as_concealed_array_item(item: &Value) -> Option<&str> {
    let obj = item.as_object()?;

    if obj.len() != 1 {
        return None;
    }

    obj.get(ARRAY_CLAIM_ITEM_PROPERTY_NAME)?.as_str()
}
