//! The sdkit library issues, presents and verifies Selective Disclosure JWTs
//! ([SD-JWT]).
//!
//! An SD-JWT is a signed JWT where some claims are replaced by digests. The
//! claims themselves travel next to the JWT as *disclosures*, so that the
//! holder can choose which ones to reveal to a verifier without invalidating
//! the issuer signature.
//!
//! [SD-JWT]: <https://datatracker.ietf.org/doc/draft-ietf-oauth-selective-disclosure-jwt/>
//!
//! # Basic Usage
//!
//! ```
//! use serde_json::json;
//! use sdkit::{
//!     sd_jwt::{
//!         json_pointer, Holder, Issuer, KeyBindingParams, KeyBindingPolicy,
//!         VerificationPolicy, Verifier,
//!     },
//!     JWK,
//! };
//!
//! # async_std::task::block_on(async {
//! let issuer_key = JWK::generate_p256();
//! let holder_key = JWK::generate_p256();
//!
//! // Issue an SD-JWT where `age` is selectively disclosable, bound to the
//! // holder key.
//! let issued = Issuer::new(&issuer_key)
//!     .issue(
//!         &json!({ "name": "Alice", "age": 30 }),
//!         &[json_pointer!("/age")],
//!         Some(&holder_key),
//!     )
//!     .await?;
//!
//! // Present every disclosure to a given verifier.
//! let presentation = Holder::new(&holder_key)
//!     .present(
//!         &issued.sd_jwt,
//!         |_, _| true,
//!         Some(KeyBindingParams::new("https://verifier.example", "abc123")),
//!     )
//!     .await?;
//!
//! // Verify the presentation.
//! let verifier = Verifier::new(&issuer_key).with_policy(
//!     VerificationPolicy::new()
//!         .with_key_binding(KeyBindingPolicy::new("https://verifier.example", "abc123")),
//! );
//!
//! let verified = verifier.verify(&presentation).await?;
//! assert!(verified.key_binding_verified);
//! assert_eq!(verified.claims["age"], 30);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
#![cfg_attr(docsrs, feature(doc_auto_cfg), feature(doc_cfg))]

// Re-export core functions and types.
#[doc(hidden)]
pub use sdkit_core::*;

/// JSON Web Key (JWK).
///
/// See: <https://www.rfc-editor.org/rfc/rfc7517>
#[doc(inline)]
pub use sdkit_jwk as jwk;

/// JSON Web Key (JWK).
#[doc(inline)]
pub use jwk::JWK;

/// Claims validation primitives.
#[doc(inline)]
pub use sdkit_claims_core as claims;

/// JSON Web Signature (JWS).
///
/// See: <https://www.rfc-editor.org/rfc/rfc7515>
#[doc(inline)]
pub use sdkit_jws as jws;

/// Selective Disclosure for JWTs (SD-JWT).
#[doc(inline)]
pub use sdkit_sd_jwt as sd_jwt;
