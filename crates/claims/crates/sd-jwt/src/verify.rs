use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use sdkit_claims_core::{
    DateTimeProvider, InvalidClaims, NumericDate, ValidationEnvironment, DEFAULT_CLOCK_SKEW,
};
use sdkit_core::JsonPointerBuf;
use sdkit_jwk::{JWKResolver, KeyResolutionError, JWK};
use sdkit_jws::{EcdsaVerifier, Header, Jws, JwsVerifier};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    DecodeError, DecodedDisclosure, KeyBindingClaims, RevealError, RevealedSdJwt, SdJwt, SdJwtKb,
    CNF_CLAIM_NAME, KB_JWT_TYP,
};

/// Default freshness window of key binding JWTs.
pub const DEFAULT_KEY_BINDING_MAX_AGE: Duration = Duration::seconds(300);

/// Registry of consumed nonces.
///
/// Lets the verifier reject key binding JWTs replayed with an already used
/// challenge.
pub trait NonceRegistry: Send + Sync {
    /// Marks `nonce` as consumed.
    ///
    /// Returns `false` if it was already consumed.
    fn consume(&self, nonce: &str) -> bool;
}

/// In-memory [`NonceRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryNonceRegistry(Mutex<HashSet<String>>);

impl InMemoryNonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceRegistry for InMemoryNonceRegistry {
    fn consume(&self, nonce: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nonce.to_owned())
    }
}

/// Key binding requirements.
#[derive(Clone)]
pub struct KeyBindingPolicy {
    /// Expected `aud` claim.
    pub audience: String,

    /// Expected `nonce` claim.
    pub nonce: String,

    /// Maximum age of the key binding JWT, measured from its `iat` claim.
    pub max_age: Duration,

    /// Also check the `exp` and `nbf` claims of the key binding JWT.
    pub check_lifetime: bool,

    /// Consumed nonces.
    pub nonces: Option<Arc<dyn NonceRegistry>>,
}

impl KeyBindingPolicy {
    pub fn new(audience: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            nonce: nonce.into(),
            max_age: DEFAULT_KEY_BINDING_MAX_AGE,
            check_lifetime: false,
            nonces: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_lifetime_check(mut self) -> Self {
        self.check_lifetime = true;
        self
    }

    pub fn with_nonce_registry(mut self, nonces: Arc<dyn NonceRegistry>) -> Self {
        self.nonces = Some(nonces);
        self
    }
}

impl fmt::Debug for KeyBindingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBindingPolicy")
            .field("audience", &self.audience)
            .field("nonce", &self.nonce)
            .field("max_age", &self.max_age)
            .field("check_lifetime", &self.check_lifetime)
            .field("nonces", &self.nonces.is_some())
            .finish()
    }
}

/// Verification policy.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Key binding requirements.
    ///
    /// If `None`, key binding is optional: a key binding JWT, if present, is
    /// still checked against the `cnf` key, the presented SD-JWT and its
    /// freshness window, but not against any audience or nonce.
    pub key_binding: Option<KeyBindingPolicy>,

    /// Tolerated clock skew.
    pub clock_skew: Duration,

    /// Evaluation instant.
    ///
    /// If `None`, the current date time is used.
    pub date_time: Option<DateTime<Utc>>,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            key_binding: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
            date_time: None,
        }
    }
}

impl VerificationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires key binding.
    pub fn with_key_binding(mut self, key_binding: KeyBindingPolicy) -> Self {
        self.key_binding = Some(key_binding);
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    pub fn with_date_time(mut self, date_time: DateTime<Utc>) -> Self {
        self.date_time = Some(date_time);
        self
    }

    fn environment(&self) -> ValidationEnvironment {
        ValidationEnvironment {
            date_time: Some(self.date_time()),
            clock_skew: self.clock_skew,
        }
    }
}

impl DateTimeProvider for VerificationPolicy {
    fn date_time(&self) -> DateTime<Utc> {
        self.date_time.unwrap_or_else(Utc::now)
    }
}

/// Rejected presentation.
///
/// Carries the precise reason of the rejection. It should not be shown to
/// the presenting party: use [`Rejection::public_message`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The presentation is not a well-formed SD-JWT.
    #[error("malformed presentation: {0}")]
    MalformedPresentation(String),

    /// A disclosure could not be decoded.
    #[error("malformed disclosure")]
    MalformedDisclosure,

    /// The `_sd_alg` claim names an algorithm outside the allow-list.
    #[error("unsupported hash algorithm `{0}`")]
    UnsupportedHashAlgorithm(String),

    /// Digests or disclosures are present without `_sd_alg` claim.
    #[error("missing `_sd_alg` claim")]
    MissingSdAlg,

    /// No key is known for the issuer.
    #[error("issuer key not found: {0}")]
    KeyNotFound(String),

    /// The issuer key could not be resolved.
    #[error("issuer key resolution failed: {0}")]
    KeyResolutionError(String),

    /// The issuer signature is invalid.
    #[error("invalid signature")]
    InvalidSignature,

    /// A digest appears more than once.
    #[error("duplicate digest `{0}`")]
    DuplicateDigest(String),

    /// A disclosure digest is not referenced.
    #[error("unresolved disclosure `{0}`")]
    UnresolvedDisclosure(String),

    /// An object entry disclosure is referenced by an array item
    /// placeholder, or the other way around.
    #[error("disclosure shape mismatch for digest `{0}`")]
    ShapeMismatch(String),

    /// A disclosed claim name is already used in the same object.
    #[error("claim name collision on `{0}`")]
    ClaimNameCollision(String),

    /// A disclosure names a reserved claim.
    #[error("reserved claim name `{0}`")]
    ReservedClaimNameConflict(String),

    /// Key binding is required but no key binding JWT is presented.
    #[error("missing key binding JWT")]
    MissingKeyBinding,

    /// No usable holder key in the `cnf` claim.
    #[error("missing confirmation key")]
    MissingConfirmationKey,

    /// The key binding JWT signature is invalid.
    #[error("invalid key binding signature")]
    KeyBindingSignatureInvalid,

    /// Unexpected key binding `aud` claim.
    #[error("audience mismatch")]
    AudienceMismatch,

    /// Unexpected or already consumed key binding `nonce` claim.
    #[error("nonce mismatch")]
    NonceMismatch,

    /// The key binding `sd_hash` claim does not match the presented SD-JWT.
    #[error("`sd_hash` mismatch")]
    SdHashMismatch,

    /// The key binding JWT is too old, or issued in the future.
    #[error("stale key binding JWT")]
    StaleKeyBinding,

    #[error("expired")]
    Expired,

    #[error("not yet valid")]
    NotYetValid,
}

/// Machine-readable rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    MalformedPresentation,
    MalformedDisclosure,
    UnsupportedHashAlgorithm,
    MissingSdAlg,
    KeyNotFound,
    KeyResolutionError,
    InvalidSignature,
    DuplicateDigest,
    UnresolvedDisclosure,
    ShapeMismatch,
    ClaimNameCollision,
    ReservedClaimNameConflict,
    MissingKeyBinding,
    MissingConfirmationKey,
    KeyBindingSignatureInvalid,
    AudienceMismatch,
    NonceMismatch,
    SdHashMismatch,
    StaleKeyBinding,
    Expired,
    NotYetValid,
}

impl Rejection {
    pub fn reason(&self) -> RejectionReason {
        match self {
            Self::MalformedPresentation(_) => RejectionReason::MalformedPresentation,
            Self::MalformedDisclosure => RejectionReason::MalformedDisclosure,
            Self::UnsupportedHashAlgorithm(_) => RejectionReason::UnsupportedHashAlgorithm,
            Self::MissingSdAlg => RejectionReason::MissingSdAlg,
            Self::KeyNotFound(_) => RejectionReason::KeyNotFound,
            Self::KeyResolutionError(_) => RejectionReason::KeyResolutionError,
            Self::InvalidSignature => RejectionReason::InvalidSignature,
            Self::DuplicateDigest(_) => RejectionReason::DuplicateDigest,
            Self::UnresolvedDisclosure(_) => RejectionReason::UnresolvedDisclosure,
            Self::ShapeMismatch(_) => RejectionReason::ShapeMismatch,
            Self::ClaimNameCollision(_) => RejectionReason::ClaimNameCollision,
            Self::ReservedClaimNameConflict(_) => RejectionReason::ReservedClaimNameConflict,
            Self::MissingKeyBinding => RejectionReason::MissingKeyBinding,
            Self::MissingConfirmationKey => RejectionReason::MissingConfirmationKey,
            Self::KeyBindingSignatureInvalid => RejectionReason::KeyBindingSignatureInvalid,
            Self::AudienceMismatch => RejectionReason::AudienceMismatch,
            Self::NonceMismatch => RejectionReason::NonceMismatch,
            Self::SdHashMismatch => RejectionReason::SdHashMismatch,
            Self::StaleKeyBinding => RejectionReason::StaleKeyBinding,
            Self::Expired => RejectionReason::Expired,
            Self::NotYetValid => RejectionReason::NotYetValid,
        }
    }

    /// Generic message, safe to return to the presenting party.
    pub fn public_message(&self) -> &'static str {
        "invalid presentation"
    }
}

impl From<DecodeError> for Rejection {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::Jws(e) => Self::MalformedPresentation(e.to_string()),
            DecodeError::Payload(e) => Self::MalformedPresentation(e.to_string()),
            DecodeError::SdAlgWrongType => {
                Self::MalformedPresentation(DecodeError::SdAlgWrongType.to_string())
            }
            DecodeError::UnsupportedHashAlgorithm(name) => Self::UnsupportedHashAlgorithm(name),
            DecodeError::MalformedDisclosure => Self::MalformedDisclosure,
            DecodeError::ReservedClaimName(name) => Self::ReservedClaimNameConflict(name),
        }
    }
}

impl From<RevealError> for Rejection {
    fn from(value: RevealError) -> Self {
        match value {
            RevealError::Decode(e) => e.into(),
            RevealError::MissingSdAlg => Self::MissingSdAlg,
            RevealError::UnresolvedDisclosure(d) => Self::UnresolvedDisclosure(d),
            RevealError::DuplicateDigest(d) => Self::DuplicateDigest(d),
            RevealError::ClaimNameCollision(name) => Self::ClaimNameCollision(name),
            e @ (RevealError::SdClaimValueNotArray | RevealError::InvalidDisclosureHash) => {
                Self::MalformedPresentation(e.to_string())
            }
            RevealError::ExpectedObjectEntryDisclosure(d)
            | RevealError::ExpectedArrayItemDisclosure(d) => Self::ShapeMismatch(d),
        }
    }
}

impl From<KeyResolutionError> for Rejection {
    fn from(value: KeyResolutionError) -> Self {
        match value {
            KeyResolutionError::NotFound(e) => Self::KeyNotFound(e),
            KeyResolutionError::Other(e) => Self::KeyResolutionError(e),
        }
    }
}

impl From<InvalidClaims> for Rejection {
    fn from(value: InvalidClaims) -> Self {
        match value {
            InvalidClaims::Premature { .. } => Self::NotYetValid,
            InvalidClaims::Expired { .. } => Self::Expired,
            InvalidClaims::Other(e) => Self::MalformedPresentation(e),
        }
    }
}

/// Accepted presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSdJwt {
    /// Issuer-signed JWT header.
    pub header: Header,

    /// Revealed claims, free of any `_sd`, `_sd_alg` or array placeholder.
    pub claims: serde_json::Map<String, Value>,

    /// Whether a key binding JWT was presented and verified.
    pub key_binding_verified: bool,

    /// Presented disclosures, bound to their JSON pointers.
    pub disclosures: BTreeMap<JsonPointerBuf, DecodedDisclosure<'static>>,
}

/// SD-JWT presentation verifier.
///
/// Configured once with an issuer key resolver, a signature verifier and a
/// policy. Verification is all-or-nothing.
#[derive(Debug, Clone)]
pub struct Verifier<R, V = EcdsaVerifier> {
    resolver: R,
    verifier: V,
    policy: VerificationPolicy,
}

impl<R: JWKResolver> Verifier<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            verifier: EcdsaVerifier,
            policy: VerificationPolicy::default(),
        }
    }
}

impl<R: JWKResolver, V: JwsVerifier> Verifier<R, V> {
    pub fn with_verifier<W: JwsVerifier>(self, verifier: W) -> Verifier<R, W> {
        Verifier {
            resolver: self.resolver,
            verifier,
            policy: self.policy,
        }
    }

    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Verifies the given compact presentation.
    ///
    /// The precise rejection reason is logged at debug level.
    pub async fn verify(
        &self,
        presentation: &(impl ?Sized + AsRef<[u8]>),
    ) -> Result<VerifiedSdJwt, Rejection> {
        let result = self.verify_presentation(presentation.as_ref()).await;

        match &result {
            Ok(verified) => log::debug!(
                "accepted SD-JWT presentation with {} disclosures (key binding: {})",
                verified.disclosures.len(),
                verified.key_binding_verified
            ),
            Err(rejection) => log::debug!("rejected SD-JWT presentation: {rejection}"),
        }

        result
    }

    async fn verify_presentation(&self, presentation: &[u8]) -> Result<VerifiedSdJwt, Rejection> {
        let presentation = SdJwtKb::new(presentation)
            .map_err(|_| Rejection::MalformedPresentation("invalid compact SD-JWT".to_owned()))?;
        let parts = presentation.parts();
        let decoded = parts.decode()?;

        // Issuer signature.
        let issuer = decoded.jwt.payload.claims.get("iss").and_then(Value::as_str);
        let key_id = decoded.jwt.header.key_id.as_deref();
        let issuer_key = self.resolver.fetch_public_jwk(issuer, key_id).await?;
        match decoded.jwt.verify_with(&self.verifier, &issuer_key).await {
            Ok(true) => (),
            Ok(false) => return Err(Rejection::InvalidSignature),
            Err(e) => {
                log::debug!("issuer signature verification failed: {e}");
                return Err(Rejection::InvalidSignature);
            }
        }

        let header = decoded.jwt.header.clone();
        let revealed = decoded.reveal()?;
        let env = self.policy.environment();

        // Key binding.
        let key_binding_verified = match (parts.key_binding_jwt, &self.policy.key_binding) {
            (Some(kb_jwt), policy) => {
                self.verify_key_binding(&env, &revealed, presentation.sd_jwt(), kb_jwt, policy.as_ref())
                    .await?;
                true
            }
            (None, Some(_)) => return Err(Rejection::MissingKeyBinding),
            (None, None) => false,
        };

        // Lifetime.
        let claims = revealed.claims();
        env.check_validity_period(date_claim(claims, "nbf")?, date_claim(claims, "exp")?)?;

        if let Some(KeyBindingPolicy {
            nonce,
            nonces: Some(registry),
            ..
        }) = &self.policy.key_binding
        {
            if !registry.consume(nonce) {
                log::debug!("nonce `{nonce}` already consumed");
                return Err(Rejection::NonceMismatch);
            }
        }

        let RevealedSdJwt {
            jwt, disclosures, ..
        } = revealed;

        Ok(VerifiedSdJwt {
            header,
            claims: jwt.payload,
            key_binding_verified,
            disclosures: disclosures
                .into_iter()
                .map(|(pointer, disclosure)| (pointer, disclosure.into_owned()))
                .collect(),
        })
    }

    async fn verify_key_binding(
        &self,
        env: &ValidationEnvironment,
        revealed: &RevealedSdJwt<'_>,
        sd_jwt: &SdJwt,
        kb_jwt: &Jws,
        policy: Option<&KeyBindingPolicy>,
    ) -> Result<(), Rejection> {
        let holder_key = confirmation_key(revealed.claims())?;

        let kb_jwt = kb_jwt
            .decode()
            .map_err(|e| Rejection::MalformedPresentation(format!("invalid key binding JWT: {e}")))?;

        if kb_jwt.header.type_.as_deref() != Some(KB_JWT_TYP) {
            return Err(Rejection::MalformedPresentation(format!(
                "key binding JWT `typ` is not `{KB_JWT_TYP}`"
            )));
        }

        match kb_jwt.verify_with(&self.verifier, &holder_key).await {
            Ok(true) => (),
            Ok(false) => return Err(Rejection::KeyBindingSignatureInvalid),
            Err(e) => {
                log::debug!("key binding signature verification failed: {e}");
                return Err(Rejection::KeyBindingSignatureInvalid);
            }
        }

        let kb_claims = kb_jwt
            .decode_json::<KeyBindingClaims>()
            .map_err(|e| {
                Rejection::MalformedPresentation(format!("invalid key binding claims: {e}"))
            })?
            .payload;

        let sd_alg = revealed.sd_alg.unwrap_or_default();
        if kb_claims.sd_hash != sd_alg.hash_bytes(sd_jwt.as_bytes()) {
            return Err(Rejection::SdHashMismatch);
        }

        if let Some(policy) = policy {
            if kb_claims.audience != policy.audience {
                return Err(Rejection::AudienceMismatch);
            }

            if kb_claims.nonce != policy.nonce {
                return Err(Rejection::NonceMismatch);
            }
        }

        // Freshness.
        let now = env.date_time();
        let max_age = policy.map_or(DEFAULT_KEY_BINDING_MAX_AGE, |p| p.max_age);
        let issued_at = to_date_time(kb_claims.issued_at, "iat")?;
        if issued_at < now - max_age - env.clock_skew || issued_at > now + env.clock_skew {
            log::debug!("key binding JWT issued at {issued_at}, now is {now}");
            return Err(Rejection::StaleKeyBinding);
        }

        if policy.is_some_and(|p| p.check_lifetime) {
            env.check_validity_period(
                kb_claims
                    .not_before
                    .map(|d| to_date_time(d, "nbf"))
                    .transpose()?,
                kb_claims
                    .expiration_time
                    .map(|d| to_date_time(d, "exp"))
                    .transpose()?,
            )?;
        }

        Ok(())
    }
}

/// Extracts the holder key from the `cnf` claim.
fn confirmation_key(claims: &serde_json::Map<String, Value>) -> Result<JWK, Rejection> {
    let jwk = claims
        .get(CNF_CLAIM_NAME)
        .and_then(|cnf| cnf.get("jwk"))
        .ok_or(Rejection::MissingConfirmationKey)?;

    JWK::deserialize(jwk).map_err(|e| {
        log::debug!("invalid confirmation key: {e}");
        Rejection::MissingConfirmationKey
    })
}

fn to_date_time(date: NumericDate, name: &str) -> Result<DateTime<Utc>, Rejection> {
    date.to_date_time()
        .map_err(|_| Rejection::MalformedPresentation(format!("invalid `{name}` claim")))
}

fn date_claim(
    claims: &serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, Rejection> {
    claims
        .get(name)
        .map(|value| {
            NumericDate::deserialize(value)
                .map_err(|_| Rejection::MalformedPresentation(format!("invalid `{name}` claim")))
                .and_then(|date| to_date_time(date, name))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DisclosureBuf, DisclosureDescription};
    use serde_json::json;

    #[test]
    fn nonce_registry() {
        let registry = InMemoryNonceRegistry::new();
        assert!(registry.consume("abc123"));
        assert!(!registry.consume("abc123"));
        assert!(registry.consume("def456"));
    }

    #[test]
    fn rejection_reasons() {
        let rejection = Rejection::from(RevealError::ExpectedArrayItemDisclosure("d".to_owned()));
        assert_eq!(rejection, Rejection::ShapeMismatch("d".to_owned()));
        assert_eq!(rejection.reason(), RejectionReason::ShapeMismatch);
        assert_eq!(rejection.public_message(), "invalid presentation");

        assert_eq!(
            Rejection::from(DecodeError::ReservedClaimName("_sd".to_owned())).reason(),
            RejectionReason::ReservedClaimNameConflict
        );
        assert_eq!(
            Rejection::from(KeyResolutionError::NotFound("iss".to_owned())).reason(),
            RejectionReason::KeyNotFound
        );
    }

    #[test]
    fn confirmation_key_is_required() {
        assert_eq!(
            confirmation_key(json!({}).as_object().unwrap()),
            Err(Rejection::MissingConfirmationKey)
        );
        assert_eq!(
            confirmation_key(json!({ "cnf": { "jwk": "key" } }).as_object().unwrap()),
            Err(Rejection::MissingConfirmationKey)
        );

        let jwk = JWK::generate_p256().to_public();
        let claims = json!({ "cnf": { "jwk": jwk } });
        assert_eq!(confirmation_key(claims.as_object().unwrap()), Ok(jwk));
    }

    #[test]
    fn date_claims() {
        let claims = json!({ "exp": 1883000000, "nbf": "tomorrow" });
        let claims = claims.as_object().unwrap();

        assert_eq!(
            date_claim(claims, "exp").unwrap().map(|d| d.timestamp()),
            Some(1883000000)
        );
        assert_eq!(date_claim(claims, "iat"), Ok(None));
        assert_eq!(date_claim(claims, "nbf").unwrap_err().reason(), RejectionReason::MalformedPresentation);
    }

    #[test]
    fn reserved_disclosure() {
        let encoded = DisclosureBuf::encode_from_parts(
            "salt",
            &DisclosureDescription::ObjectEntry {
                key: "_sd".to_owned(),
                value: json!([]),
            },
        );

        let rejection: Rejection = encoded.decode().unwrap_err().into();
        assert_eq!(rejection, Rejection::ReservedClaimNameConflict("_sd".to_owned()));
    }
}
