use core::fmt;

/// Signing or verification failure, other than a signature that simply does
/// not match.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The JWS header carries no `alg`.
    #[error("missing signature algorithm")]
    MissingAlgorithm,

    /// The key cannot be used with the requested algorithm.
    #[error("algorithm mismatch")]
    AlgorithmMismatch,

    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    /// The JWS header lists critical parameters (`crit`). None are
    /// understood, so such a JWS never verifies.
    #[error("unsupported critical header parameters `{0:?}`")]
    UnsupportedCriticalParameters(Vec<String>),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("{0}")]
    Other(String),
}

impl SignatureError {
    pub fn other(e: impl fmt::Display) -> Self {
        Self::Other(e.to_string())
    }
}
