//! JWK errors.
use thiserror::Error;

/// Failure to read or use a JWK.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("JWK has no `crv` parameter")]
    MissingCurve,

    /// `x` or `y` is absent from an EC key.
    #[error("JWK has no curve point")]
    MissingPoint,

    #[error("unsupported curve `{0}`")]
    CurveNotImplemented(String),

    /// A signing operation needs the `d` parameter.
    #[error("JWK has no private key")]
    MissingPrivateKey,

    /// The curve backend rejected the key material.
    #[error("invalid key material")]
    InvalidKey,

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
