use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, SeedableRng};
use sdkit_claims_core::NumericDate;
use sdkit_jwk::{IssuerKeys, JWK};
use sdkit_jws::{JsonPayload, JwsSigner};
use sdkit_sd_jwt::{
    json_pointer, DisclosureBuf, DisclosureDescription, Holder, InMemoryNonceRegistry,
    IssuedSdJwt, Issuer, JsonPointer, KeyBindingParams, KeyBindingPolicy, Rejection, SdAlg,
    SdJwt, SdJwtKbBuf, VerificationPolicy, Verifier,
};
use serde_json::{json, Value};

const ISSUER: &str = "https://issuer.example";
const AUDIENCE: &str = "https://verifier.example";
const NONCE: &str = "abc123";

static ISSUER_KEY: LazyLock<JWK> =
    LazyLock::new(|| JWK::generate_p256().with_key_id("issuer-key-1"));
static HOLDER_KEY: LazyLock<JWK> = LazyLock::new(JWK::generate_p256);

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1700000000, 0).unwrap()
}

fn issuer_keys() -> IssuerKeys {
    IssuerKeys::new().with(ISSUER, &ISSUER_KEY)
}

fn verifier(policy: VerificationPolicy) -> Verifier<IssuerKeys> {
    Verifier::new(issuer_keys()).with_policy(policy.with_date_time(now()))
}

fn key_binding_policy() -> VerificationPolicy {
    VerificationPolicy::new().with_key_binding(KeyBindingPolicy::new(AUDIENCE, NONCE))
}

fn key_binding_params() -> KeyBindingParams {
    KeyBindingParams::new(AUDIENCE, NONCE).with_issued_at(now().into())
}

async fn issue_alice() -> IssuedSdJwt {
    Issuer::new(&*ISSUER_KEY)
        .issue(
            &json!({ "iss": ISSUER, "name": "Alice", "age": 30 }),
            &[json_pointer!("/age")],
            Some(&*HOLDER_KEY),
        )
        .await
        .unwrap()
}

async fn present_alice(
    sd_jwt: &SdJwt,
    disclose_age: bool,
    key_binding: Option<KeyBindingParams>,
) -> SdJwtKbBuf {
    Holder::new(&*HOLDER_KEY)
        .present(sd_jwt, |_, _| disclose_age, key_binding)
        .await
        .unwrap()
}

fn public_claims(claims: serde_json::Map<String, Value>) -> Value {
    let mut claims = claims;
    claims.remove("cnf");
    claims.remove("iss");
    Value::Object(claims)
}

#[test_log::test(async_std::test)]
async fn issue_present_verify() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;

    let verified = verifier(key_binding_policy())
        .verify(&presentation)
        .await
        .unwrap();

    assert!(verified.key_binding_verified);
    assert_eq!(
        public_claims(verified.claims),
        json!({ "name": "Alice", "age": 30 })
    );
    assert_eq!(verified.disclosures.len(), 1);
    assert_eq!(
        verified.disclosures[json_pointer!("/age")].claim_name(),
        Some("age")
    );
}

#[test_log::test(async_std::test)]
async fn repeated_verification() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;

    let verifier = verifier(key_binding_policy());
    let first = verifier.verify(&presentation).await.unwrap();
    let second = verifier.verify(&presentation).await.unwrap();

    assert!(first.key_binding_verified);
    assert_eq!(first, second);
}

#[test_log::test(async_std::test)]
async fn withheld_claim() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, false, Some(key_binding_params())).await;

    let verified = verifier(key_binding_policy())
        .verify(&presentation)
        .await
        .unwrap();

    assert!(verified.key_binding_verified);
    assert_eq!(public_claims(verified.claims), json!({ "name": "Alice" }));
    assert!(verified.disclosures.is_empty());
}

#[test_log::test(async_std::test)]
async fn without_key_binding() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, true, None).await;

    let verified = verifier(VerificationPolicy::new())
        .verify(&presentation)
        .await
        .unwrap();
    assert!(!verified.key_binding_verified);
    assert_eq!(verified.claims["age"], 30);

    assert_eq!(
        verifier(key_binding_policy()).verify(&presentation).await,
        Err(Rejection::MissingKeyBinding)
    );
}

#[test_log::test(async_std::test)]
async fn issued_sd_jwt_is_a_presentation() {
    let issued = issue_alice().await;
    let verified = verifier(VerificationPolicy::new())
        .verify(&issued.sd_jwt)
        .await
        .unwrap();

    assert_eq!(
        public_claims(verified.claims),
        json!({ "name": "Alice", "age": 30 })
    );
}

#[test_log::test(async_std::test)]
async fn forged_disclosure() {
    let issued = issue_alice().await;
    let forged = DisclosureBuf::encode_from_parts(
        "c2FsdHNhbHRzYWx0c2FsdA",
        &DisclosureDescription::ObjectEntry {
            key: "age".to_owned(),
            value: json!(99),
        },
    );

    let presentation = format!("{}~{}~", issued.sd_jwt.jwt(), forged.as_str());
    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&presentation)
            .await,
        Err(Rejection::UnresolvedDisclosure(forged.as_str().to_owned()))
    );
}

#[test_log::test(async_std::test)]
async fn flipped_disclosure_character() {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    let issued = issue_alice().await;
    let disclosure = issued.sd_jwt.disclosures().next().unwrap();

    // The fifth character only encodes bits of the second salt character:
    // stepping it back keeps the disclosure well-formed.
    let mut tampered = disclosure.as_bytes().to_vec();
    let i = ALPHABET.iter().position(|c| *c == tampered[4]).unwrap();
    tampered[4] = ALPHABET[i - 1];
    let tampered = String::from_utf8(tampered).unwrap();

    let presentation = format!("{}~{tampered}~", issued.sd_jwt.jwt());
    assert_ne!(tampered, disclosure.as_str());
    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&presentation)
            .await,
        Err(Rejection::UnresolvedDisclosure(tampered))
    );
}

#[test_log::test(async_std::test)]
async fn stripped_disclosure() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;

    // Drop the disclosure but keep the key binding JWT.
    let stripped = format!(
        "{}~{}",
        presentation.sd_jwt().jwt(),
        presentation.key_binding_jwt().unwrap()
    );

    assert_eq!(
        verifier(key_binding_policy()).verify(&stripped).await,
        Err(Rejection::SdHashMismatch)
    );
}

#[test_log::test(async_std::test)]
async fn tampered_issuer_signature() {
    let issued = issue_alice().await;
    let other_key = JWK::generate_p256().with_key_id("issuer-key-1");
    let verifier = Verifier::new(IssuerKeys::new().with(ISSUER, &other_key))
        .with_policy(VerificationPolicy::new().with_date_time(now()));

    assert_eq!(
        verifier.verify(&issued.sd_jwt).await,
        Err(Rejection::InvalidSignature)
    );
}

#[test_log::test(async_std::test)]
async fn unknown_issuer() {
    let issued = Issuer::new(&*ISSUER_KEY)
        .issue(
            &json!({ "iss": "https://unknown.example", "name": "Alice" }),
            &[] as &[&JsonPointer],
            None,
        )
        .await
        .unwrap();

    assert!(matches!(
        verifier(VerificationPolicy::new())
            .verify(&issued.sd_jwt)
            .await,
        Err(Rejection::KeyNotFound(_))
    ));
}

#[test_log::test(async_std::test)]
async fn nonce_replay() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;

    let verifier = verifier(
        VerificationPolicy::new().with_key_binding(
            KeyBindingPolicy::new(AUDIENCE, NONCE)
                .with_nonce_registry(Arc::new(InMemoryNonceRegistry::new())),
        ),
    );

    assert!(verifier.verify(&presentation).await.is_ok());
    assert_eq!(
        verifier.verify(&presentation).await,
        Err(Rejection::NonceMismatch)
    );
}

#[test_log::test(async_std::test)]
async fn key_binding_mismatches() {
    let issued = issue_alice().await;
    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;

    let wrong_audience = verifier(
        VerificationPolicy::new()
            .with_key_binding(KeyBindingPolicy::new("https://other.example", NONCE)),
    );
    assert_eq!(
        wrong_audience.verify(&presentation).await,
        Err(Rejection::AudienceMismatch)
    );

    let wrong_nonce = verifier(
        VerificationPolicy::new().with_key_binding(KeyBindingPolicy::new(AUDIENCE, "def456")),
    );
    assert_eq!(
        wrong_nonce.verify(&presentation).await,
        Err(Rejection::NonceMismatch)
    );
}

#[test_log::test(async_std::test)]
async fn key_binding_by_another_key() {
    let issued = issue_alice().await;
    let presentation = Holder::new(JWK::generate_p256())
        .present(&issued.sd_jwt, |_, _| true, Some(key_binding_params()))
        .await
        .unwrap();

    assert_eq!(
        verifier(key_binding_policy()).verify(&presentation).await,
        Err(Rejection::KeyBindingSignatureInvalid)
    );
}

#[test_log::test(async_std::test)]
async fn key_binding_without_confirmation_key() {
    let issued = Issuer::new(&*ISSUER_KEY)
        .issue(
            &json!({ "iss": ISSUER, "name": "Alice" }),
            &[json_pointer!("/name")],
            None,
        )
        .await
        .unwrap();
    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;

    assert_eq!(
        verifier(key_binding_policy()).verify(&presentation).await,
        Err(Rejection::MissingConfirmationKey)
    );
}

#[test_log::test(async_std::test)]
async fn stale_key_binding() {
    let issued = issue_alice().await;

    let old = KeyBindingParams::new(AUDIENCE, NONCE)
        .with_issued_at((now() - Duration::minutes(10)).into());
    let presentation = present_alice(&issued.sd_jwt, true, Some(old)).await;
    assert_eq!(
        verifier(key_binding_policy()).verify(&presentation).await,
        Err(Rejection::StaleKeyBinding)
    );

    let future = KeyBindingParams::new(AUDIENCE, NONCE)
        .with_issued_at((now() + Duration::minutes(10)).into());
    let presentation = present_alice(&issued.sd_jwt, true, Some(future)).await;
    assert_eq!(
        verifier(key_binding_policy()).verify(&presentation).await,
        Err(Rejection::StaleKeyBinding)
    );

    // Within the allowed age.
    let recent = KeyBindingParams::new(AUDIENCE, NONCE)
        .with_issued_at((now() - Duration::minutes(4)).into());
    let presentation = present_alice(&issued.sd_jwt, true, Some(recent)).await;
    assert!(verifier(key_binding_policy())
        .verify(&presentation)
        .await
        .is_ok());
}

#[test_log::test(async_std::test)]
async fn token_lifetime() {
    let issuer = Issuer::new(&*ISSUER_KEY);

    let expired = issuer
        .issue(
            &json!({
                "iss": ISSUER,
                "exp": NumericDate::from(now() - Duration::hours(1)),
                "name": "Alice"
            }),
            &[json_pointer!("/name")],
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&expired.sd_jwt)
            .await,
        Err(Rejection::Expired)
    );

    let premature = issuer
        .issue(
            &json!({
                "iss": ISSUER,
                "nbf": NumericDate::from(now() + Duration::hours(1)),
                "name": "Alice"
            }),
            &[json_pointer!("/name")],
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&premature.sd_jwt)
            .await,
        Err(Rejection::NotYetValid)
    );

    // Within the clock skew.
    let just_expired = issuer
        .issue(
            &json!({
                "iss": ISSUER,
                "exp": NumericDate::from(now() - Duration::seconds(30)),
                "name": "Alice"
            }),
            &[json_pointer!("/name")],
            None,
        )
        .await
        .unwrap();
    assert!(verifier(VerificationPolicy::new())
        .verify(&just_expired.sd_jwt)
        .await
        .is_ok());
}

/// Signs an issuer JWT with arbitrary claims, bypassing the concealment
/// checks of [`Issuer`].
async fn sign_raw(claims: Value, disclosures: &[&str]) -> String {
    let jws = ISSUER_KEY
        .sign(JsonPayload::new(&claims).unwrap())
        .await
        .unwrap();

    let mut result = format!("{jws}~");
    for d in disclosures {
        result.push_str(d);
        result.push('~');
    }
    result
}

#[test_log::test(async_std::test)]
async fn reserved_claim_name_disclosure() {
    let disclosure = DisclosureBuf::encode_from_parts(
        "c2FsdHNhbHRzYWx0c2FsdA",
        &DisclosureDescription::ObjectEntry {
            key: "_sd".to_owned(),
            value: json!(["x"]),
        },
    );

    let presentation = sign_raw(
        json!({
            "iss": ISSUER,
            "_sd": [SdAlg::Sha256.hash(&disclosure)],
            "_sd_alg": "sha-256"
        }),
        &[disclosure.as_str()],
    )
    .await;

    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&presentation)
            .await,
        Err(Rejection::ReservedClaimNameConflict("_sd".to_owned()))
    );
}

#[test_log::test(async_std::test)]
async fn disclosure_shape_mismatch() {
    let disclosure = DisclosureBuf::encode_from_parts(
        "c2FsdHNhbHRzYWx0c2FsdA",
        &DisclosureDescription::ArrayItem(json!("US")),
    );
    let digest = SdAlg::Sha256.hash(&disclosure);

    let presentation = sign_raw(
        json!({ "iss": ISSUER, "_sd": [digest], "_sd_alg": "sha-256" }),
        &[disclosure.as_str()],
    )
    .await;

    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&presentation)
            .await,
        Err(Rejection::ShapeMismatch(digest))
    );
}

#[test_log::test(async_std::test)]
async fn unsupported_hash_algorithm() {
    let presentation = sign_raw(
        json!({ "iss": ISSUER, "_sd": [], "_sd_alg": "md5" }),
        &[],
    )
    .await;

    assert_eq!(
        verifier(VerificationPolicy::new())
            .verify(&presentation)
            .await,
        Err(Rejection::UnsupportedHashAlgorithm("md5".to_owned()))
    );
}

#[test_log::test(async_std::test)]
async fn malformed_presentations() {
    let issued = issue_alice().await;
    let verifier = verifier(VerificationPolicy::new());

    for input in [
        String::new(),
        "not an sd-jwt".to_owned(),
        issued.sd_jwt.jwt().to_string(),
        format!("{}~~", issued.sd_jwt.jwt()),
    ] {
        assert!(
            matches!(
                verifier.verify(&input).await,
                Err(Rejection::MalformedPresentation(_))
            ),
            "{input}"
        );
    }
}

#[test_log::test(async_std::test)]
async fn nested_round_trip() {
    let claims = json!({
        "iss": ISSUER,
        "given_name": "Alice",
        "address": {
            "street_address": "123 Main St",
            "locality": "Anytown",
            "country": "US"
        },
        "nationalities": ["US", "DE"]
    });

    let issued = Issuer::new(&*ISSUER_KEY)
        .with_sd_alg(SdAlg::Sha384)
        .with_decoys(2)
        .issue_with(
            &claims,
            &[
                json_pointer!("/given_name"),
                json_pointer!("/address"),
                json_pointer!("/address/locality"),
                json_pointer!("/nationalities/0"),
                json_pointer!("/nationalities/1"),
            ],
            Some(&*HOLDER_KEY),
            StdRng::seed_from_u64(7),
        )
        .await
        .unwrap();

    assert_eq!(issued.payload.sd_alg, Some(SdAlg::Sha384));
    assert_eq!(issued.disclosures.len(), 5);

    let presentation = present_alice(&issued.sd_jwt, true, Some(key_binding_params())).await;
    let verified = verifier(key_binding_policy())
        .verify(&presentation)
        .await
        .unwrap();

    let mut expected = claims.clone();
    expected["cnf"] = json!({ "jwk": HOLDER_KEY.to_public() });
    assert_eq!(Value::Object(verified.claims), expected);

    // Only the locality, which brings its concealed parent along.
    let presentation = Holder::new(&*HOLDER_KEY)
        .present(
            &issued.sd_jwt,
            |pointer, _| pointer == json_pointer!("/address/locality"),
            Some(key_binding_params()),
        )
        .await
        .unwrap();
    let verified = verifier(key_binding_policy())
        .verify(&presentation)
        .await
        .unwrap();
    assert_eq!(
        verified.claims["address"],
        json!({ "street_address": "123 Main St", "locality": "Anytown", "country": "US" })
    );
    assert_eq!(verified.claims["nationalities"], json!([]));
    assert!(!verified.claims.contains_key("given_name"));
}

#[test_log::test(async_std::test)]
async fn concealing_is_not_observable() {
    let claims = json!({ "iss": ISSUER, "name": "Alice", "age": 30 });

    let issued = Issuer::new(&*ISSUER_KEY)
        .issue(
            &claims,
            &[json_pointer!("/name"), json_pointer!("/age")],
            None,
        )
        .await
        .unwrap();
    let verified = verifier(VerificationPolicy::new())
        .verify(&issued.sd_jwt)
        .await
        .unwrap();

    assert_eq!(Value::Object(verified.claims), claims);
}
