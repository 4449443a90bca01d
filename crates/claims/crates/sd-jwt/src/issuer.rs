use std::borrow::Borrow;

use rand::{thread_rng, CryptoRng, RngCore};
use sdkit_claims_core::SignatureError;
use sdkit_core::JsonPointer;
use sdkit_jwk::JWK;
use sdkit_jws::{JsonPayload, JwsSigner};
use serde::Serialize;
use serde_json::Value;

use crate::{ConcealError, DecodedDisclosure, SdAlg, SdJwtBuf, SdJwtPayload};

/// Default JWS `typ` header value of issued SD-JWTs.
pub const SD_JWT_TYP: &str = "sd+jwt";

/// JWS `typ` header value of SD-JWT based verifiable credentials.
pub const DC_SD_JWT_TYP: &str = "dc+sd-jwt";

/// Name of the claim binding the SD-JWT to the holder key.
pub const CNF_CLAIM_NAME: &str = "cnf";

/// Issuance error.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// Claims could not be concealed.
    #[error(transparent)]
    Conceal(#[from] ConcealError),

    /// Signature failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// A pointer conceals the `cnf` claim that holder binding sets.
    #[error("cannot conceal `cnf` of a holder-bound SD-JWT")]
    ConcealedConfirmationKey,

    /// Claims or holder key serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// SD-JWT issuer.
///
/// Configured once with a signer, then used to issue any number of SD-JWTs.
#[derive(Debug, Clone)]
pub struct Issuer<S> {
    signer: S,
    sd_alg: SdAlg,
    decoys: usize,
    typ: Option<String>,
}

/// Freshly issued SD-JWT.
#[derive(Debug, Clone)]
pub struct IssuedSdJwt {
    /// Compact SD-JWT, with every disclosure.
    pub sd_jwt: SdJwtBuf,

    /// Signed payload.
    pub payload: SdJwtPayload,

    /// Disclosures, in the order they appear in `sd_jwt`.
    pub disclosures: Vec<DecodedDisclosure<'static>>,
}

impl<S: JwsSigner> Issuer<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            sd_alg: SdAlg::default(),
            decoys: 0,
            typ: Some(SD_JWT_TYP.to_owned()),
        }
    }

    pub fn with_sd_alg(mut self, sd_alg: SdAlg) -> Self {
        self.sd_alg = sd_alg;
        self
    }

    /// Sets the number of decoy digests added to each `_sd` array.
    pub fn with_decoys(mut self, decoys: usize) -> Self {
        self.decoys = decoys;
        self
    }

    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    pub fn without_typ(mut self) -> Self {
        self.typ = None;
        self
    }

    pub fn sd_alg(&self) -> SdAlg {
        self.sd_alg
    }

    /// Conceals the claims targeted by `pointers` and signs the result.
    ///
    /// If a `holder_key` is given, its public part is bound to the SD-JWT
    /// through the `cnf` claim, replacing any existing `cnf` claim. That
    /// claim cannot be concealed then.
    pub async fn issue<T: Serialize>(
        &self,
        claims: &T,
        pointers: &[impl Borrow<JsonPointer>],
        holder_key: Option<&JWK>,
    ) -> Result<IssuedSdJwt, IssueError> {
        self.issue_with(claims, pointers, holder_key, thread_rng())
            .await
    }

    /// Issues an SD-JWT, drawing salts and decoys from the given `rng`.
    pub async fn issue_with<T: Serialize>(
        &self,
        claims: &T,
        pointers: &[impl Borrow<JsonPointer>],
        holder_key: Option<&JWK>,
        rng: impl CryptoRng + RngCore,
    ) -> Result<IssuedSdJwt, IssueError> {
        let Value::Object(claims) = serde_json::to_value(claims)? else {
            return Err(ConcealError::NotAnObject.into());
        };

        if holder_key.is_some()
            && pointers.iter().any(|p| {
                p.borrow()
                    .split_first()
                    .is_some_and(|(name, _)| name.to_decoded() == CNF_CLAIM_NAME)
            })
        {
            return Err(IssueError::ConcealedConfirmationKey);
        }

        let (mut payload, disclosures) =
            SdJwtPayload::conceal_claims(claims, self.sd_alg, self.decoys, pointers, rng)?;

        if let Some(jwk) = holder_key {
            let mut cnf = serde_json::Map::new();
            cnf.insert("jwk".to_owned(), serde_json::to_value(jwk.to_public())?);
            payload
                .claims
                .insert(CNF_CLAIM_NAME.to_owned(), Value::Object(cnf));
        }

        let mut jws_payload = JsonPayload::new(&payload)?;
        if let Some(typ) = &self.typ {
            jws_payload = jws_payload.with_typ(typ.clone());
        }

        let jws = self.signer.sign(jws_payload).await?;

        let mut bytes = jws.into_bytes();
        bytes.push(b'~');
        for d in &disclosures {
            bytes.extend_from_slice(d.encoded.as_bytes());
            bytes.push(b'~');
        }

        let sd_jwt = unsafe {
            // SAFETY: a compact JWS followed by `~`-terminated disclosures.
            SdJwtBuf::new_unchecked(bytes)
        };

        log::trace!("issued SD-JWT with {} disclosures", disclosures.len());

        Ok(IssuedSdJwt {
            sd_jwt,
            payload,
            disclosures,
        })
    }
}
