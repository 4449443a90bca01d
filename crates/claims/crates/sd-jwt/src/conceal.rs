use std::{borrow::Borrow, collections::HashSet};

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rand::{thread_rng, CryptoRng, RngCore};
use sdkit_core::{JsonPointer, JsonPointerBuf};
use serde::Serialize;
use serde_json::Value;

use crate::{
    reveal::as_concealed_array_item, DecodedDisclosure, Disclosure, DisclosureDescription, SdAlg,
    SdJwtPayload, ARRAY_CLAIM_ITEM_PROPERTY_NAME, RESERVED_CLAIM_NAMES, SD_CLAIM_NAME,
};

/// Error that can occur during concealing.
#[derive(Debug, thiserror::Error)]
pub enum ConcealError {
    /// Serialization failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Concealed JSON value is not an object.
    #[error("concealed JSON value is not an object")]
    NotAnObject,

    /// Tried to conceal the root object.
    #[error("cannot conceal root")]
    CannotConcealRoot,

    /// Value to conceal not found.
    #[error("value not found at `{0}`")]
    NotFound(JsonPointerBuf),

    /// Claims use a name reserved by SD-JWT.
    #[error("reserved claim name `{0}`")]
    ReservedClaimNameConflict(String),

    /// The same digest would appear more than once.
    #[error("duplicate digest `{0}`")]
    DuplicateDigest(String),
}

impl SdJwtPayload {
    /// Conceal a value using the given JSON pointers, returning a SD-JWT
    /// payload and disclosures.
    pub fn conceal<T: Serialize>(
        value: &T,
        sd_alg: SdAlg,
        pointers: &[impl Borrow<JsonPointer>],
    ) -> Result<(Self, Vec<DecodedDisclosure<'static>>), ConcealError> {
        Self::conceal_with(value, sd_alg, pointers, thread_rng())
    }

    /// Conceal a value using the given JSON pointers and random number
    /// generator, returning a SD-JWT payload and disclosures.
    pub fn conceal_with<T: Serialize>(
        value: &T,
        sd_alg: SdAlg,
        pointers: &[impl Borrow<JsonPointer>],
        rng: impl CryptoRng + RngCore,
    ) -> Result<(Self, Vec<DecodedDisclosure<'static>>), ConcealError> {
        match serde_json::to_value(value)? {
            Value::Object(obj) => Self::conceal_claims(obj, sd_alg, 0, pointers, rng),
            _ => Err(ConcealError::NotAnObject),
        }
    }

    /// Conceal a JSON object using the given JSON pointers, returning a SD-JWT
    /// payload and disclosures.
    ///
    /// Each `_sd` array created receives `decoys` additional digests of
    /// random data, hiding the number of concealed claims.
    pub fn conceal_claims(
        mut claims: serde_json::Map<String, Value>,
        sd_alg: SdAlg,
        decoys: usize,
        pointers: &[impl Borrow<JsonPointer>],
        rng: impl CryptoRng + RngCore,
    ) -> Result<(Self, Vec<DecodedDisclosure<'static>>), ConcealError> {
        check_reserved_names(&claims)?;

        let mut concealer = Concealer {
            rng,
            sd_alg,
            decoys,
        };
        let mut disclosures = Vec::with_capacity(pointers.len());

        // Parents sort before their children: visiting in reverse conceals
        // `/foo/bar` before `/foo`.
        let mut sorted_pointers: Vec<&JsonPointer> = pointers.iter().map(Borrow::borrow).collect();
        sorted_pointers.sort_unstable();
        sorted_pointers.dedup();

        // `_sd` arrays and `...` placeholders only exist once concealing
        // starts, so pointers may not reach into them.
        for token in sorted_pointers.iter().flat_map(|p| p.iter()) {
            let name = token.to_decoded();
            if RESERVED_CLAIM_NAMES.contains(&&*name) {
                return Err(ConcealError::ReservedClaimNameConflict(name.into_owned()));
            }
        }

        for pointer in sorted_pointers.into_iter().rev() {
            if pointer.is_empty() {
                return Err(ConcealError::CannotConcealRoot);
            }

            let disclosure = concealer
                .conceal_object_at(&mut claims, pointer)
                .ok_or_else(|| ConcealError::NotFound(pointer.to_owned()))?;

            disclosures.push(disclosure);
        }

        check_unique_digests(&claims, &disclosures)?;

        log::trace!(
            "concealed {} claims with {}",
            disclosures.len(),
            sd_alg
        );

        let concealed = Self {
            sd_alg: (!disclosures.is_empty()).then_some(sd_alg),
            claims,
        };

        Ok((concealed, disclosures))
    }
}

/// Generates a fresh 128-bit salt, base64url encoded.
pub fn generate_salt(rng: &mut (impl CryptoRng + RngCore)) -> String {
    const DEFAULT_SALT_SIZE: usize = 128 / 8;
    let mut salt_bytes = [0u8; DEFAULT_SALT_SIZE];
    rng.fill_bytes(&mut salt_bytes);
    BASE64_URL_SAFE_NO_PAD.encode(salt_bytes)
}

struct Concealer<R> {
    rng: R,
    sd_alg: SdAlg,
    decoys: usize,
}

impl<R: CryptoRng + RngCore> Concealer<R> {
    fn conceal_at(
        &mut self,
        value: &mut Value,
        pointer: &JsonPointer,
    ) -> Option<DecodedDisclosure<'static>> {
        match value {
            Value::Object(object) => self.conceal_object_at(object, pointer),
            Value::Array(array) => self.conceal_array_at(array, pointer),
            _ => None,
        }
    }

    fn conceal_object_at(
        &mut self,
        object: &mut serde_json::Map<String, Value>,
        pointer: &JsonPointer,
    ) -> Option<DecodedDisclosure<'static>> {
        let (token, rest) = pointer.split_first()?;
        let key = token.to_decoded();

        if rest.is_empty() {
            let value = object.remove(&*key)?;

            let disclosure = DecodedDisclosure::from_parts(
                generate_salt(&mut self.rng),
                DisclosureDescription::ObjectEntry {
                    key: key.into_owned(),
                    value,
                },
            );

            self.add_digest(object, &disclosure.encoded);
            Some(disclosure)
        } else {
            let value = object.get_mut(&*key)?;
            self.conceal_at(value, rest)
        }
    }

    fn conceal_array_at(
        &mut self,
        array: &mut [Value],
        pointer: &JsonPointer,
    ) -> Option<DecodedDisclosure<'static>> {
        let (token, rest) = pointer.split_first()?;
        let value = array.get_mut(token.as_array_index()?)?;

        if rest.is_empty() {
            let disclosure = DecodedDisclosure::from_parts(
                generate_salt(&mut self.rng),
                DisclosureDescription::ArrayItem(value.take()),
            );

            *value = new_concealed_array_item(self.sd_alg, &disclosure.encoded);
            Some(disclosure)
        } else {
            self.conceal_at(value, rest)
        }
    }

    fn decoy_digest(&mut self) -> String {
        let salt = generate_salt(&mut self.rng);
        self.sd_alg.hash_bytes(salt.as_bytes())
    }

    /// Adds the digest of `disclosure` to the `_sd` array of `object`,
    /// creating it (with decoys) if needed, and keeps it sorted.
    fn add_digest(&mut self, object: &mut serde_json::Map<String, Value>, disclosure: &Disclosure) {
        if !object.contains_key(SD_CLAIM_NAME) {
            let decoys = (0..self.decoys)
                .map(|_| Value::String(self.decoy_digest()))
                .collect();
            object.insert(SD_CLAIM_NAME.to_owned(), Value::Array(decoys));
        }

        if let Some(Value::Array(sd)) = object.get_mut(SD_CLAIM_NAME) {
            sd.push(self.sd_alg.hash(disclosure).into());
            sd.sort_unstable_by(|a, b| a.as_str().cmp(&b.as_str()));
        }
    }
}

fn new_concealed_array_item(sd_alg: SdAlg, disclosure: &Disclosure) -> Value {
    let mut object = serde_json::Map::new();
    object.insert(
        ARRAY_CLAIM_ITEM_PROPERTY_NAME.into(),
        sd_alg.hash(disclosure).into(),
    );
    Value::Object(object)
}

fn check_reserved_names(object: &serde_json::Map<String, Value>) -> Result<(), ConcealError> {
    for (key, value) in object {
        if RESERVED_CLAIM_NAMES.contains(&key.as_str()) {
            return Err(ConcealError::ReservedClaimNameConflict(key.clone()));
        }

        check_reserved_names_in(value)?
    }

    Ok(())
}

fn check_reserved_names_in(value: &Value) -> Result<(), ConcealError> {
    match value {
        Value::Object(object) => check_reserved_names(object),
        Value::Array(items) => items.iter().try_for_each(check_reserved_names_in),
        _ => Ok(()),
    }
}

fn check_unique_digests(
    claims: &serde_json::Map<String, Value>,
    disclosures: &[DecodedDisclosure],
) -> Result<(), ConcealError> {
    let mut digests = HashSet::new();
    collect_object_digests(claims, &mut digests)?;
    for disclosure in disclosures {
        collect_digests(disclosure.value(), &mut digests)?;
    }

    Ok(())
}

fn collect_object_digests<'a>(
    object: &'a serde_json::Map<String, Value>,
    digests: &mut HashSet<&'a str>,
) -> Result<(), ConcealError> {
    for (key, value) in object {
        if key == SD_CLAIM_NAME {
            for digest in value.as_array().into_iter().flatten().filter_map(Value::as_str) {
                insert_digest(digests, digest)?
            }
        } else {
            collect_digests(value, digests)?
        }
    }

    Ok(())
}

fn collect_digests<'a>(value: &'a Value, digests: &mut HashSet<&'a str>) -> Result<(), ConcealError> {
    match value {
        Value::Object(object) => collect_object_digests(object, digests),
        Value::Array(items) => {
            for item in items {
                match as_concealed_array_item(item) {
                    Some(digest) => insert_digest(digests, digest)?,
                    None => collect_digests(item, digests)?,
                }
            }

            Ok(())
        }
        _ => Ok(()),
    }
}

fn insert_digest<'a>(digests: &mut HashSet<&'a str>, digest: &'a str) -> Result<(), ConcealError> {
    if digests.insert(digest) {
        Ok(())
    } else {
        Err(ConcealError::DuplicateDigest(digest.to_owned()))
    }
}
