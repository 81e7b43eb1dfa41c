//! Security-focused authorization tests.
//!
//! These tests verify the authorization pipeline's resistance to common JWT
//! attack vectors: algorithm substitution, algorithm confusion, forged and
//! re-signed tokens, expired/future tokens, key rotation, and malformed token
//! structures.
#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use async_trait::async_trait;
use casting_authz::{
    AuthorizationGuard, KeyResolver, KeySetSource, TokenVerifier, DEFAULT_CACHE_TTL,
    assert_auth_error,
    error::{AuthError, ClaimsRejection, HeaderRejection, KeySetError},
    key_set::SigningKeySet,
    testutil::{
        TEST_AUDIENCE, TEST_ISSUER, TRUSTED_KID, TestKey, craft_raw_jwt, jwks_document,
        standard_claims, static_resolver, test_guard,
    },
    validation::{FORBIDDEN_ALGORITHMS, validate_algorithm},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::RwLock;
use serde_json::json;

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

// ===========================================================================
// 1. Algorithm substitution: `alg: "none"` must be rejected
// ===========================================================================

#[test]
fn test_algorithm_none_rejected_by_policy() {
    let result = validate_algorithm("none", &[Algorithm::RS256]);
    assert!(matches!(
        result,
        Err(AuthError::InvalidHeader { reason: HeaderRejection::UnsupportedAlgorithm(ref msg) })
            if msg.contains("not allowed for security reasons")
    ));
}

#[tokio::test]
async fn test_algorithm_none_token_rejected_end_to_end() {
    let guard = test_guard();
    let token = craft_raw_jwt(
        &json!({"alg": "none", "typ": "JWT", "kid": TRUSTED_KID}),
        &standard_claims(&["get:actors"]),
    );

    let result = guard.authorize(Some(&bearer(&token)), "get:actors").await;
    assert_auth_error!(result, InvalidHeader);
    assert_eq!(
        guard.verifier().resolver().metrics().fetch_count,
        0,
        "alg:none must be rejected before any key lookup"
    );
}

// ===========================================================================
// 2. Algorithm confusion: HS* keyed with public material
// ===========================================================================

#[tokio::test]
async fn test_algorithm_confusion_hmac_end_to_end() {
    let guard = test_guard();
    let public_modulus = TestKey::trusted_rsa().jwk()["n"].as_str().expect("n").to_string();

    for alg in [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512] {
        let mut header = Header::new(alg);
        header.kid = Some(TRUSTED_KID.to_string());
        let token = jsonwebtoken::encode(
            &header,
            &standard_claims(&["get:actors"]),
            &EncodingKey::from_secret(public_modulus.as_bytes()),
        )
        .expect("encode");

        let result = guard.authorize(Some(&bearer(&token)), "get:actors").await;
        assert_auth_error!(result, InvalidHeader, format!("{alg:?} must be rejected"));
    }
}

#[test]
fn test_forbidden_algorithms_rejected_even_if_configured() {
    let everything =
        [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512, Algorithm::RS256, Algorithm::EdDSA];
    for alg in FORBIDDEN_ALGORITHMS {
        assert!(validate_algorithm(alg, &everything).is_err(), "{alg} must be rejected");
    }
}

#[tokio::test]
async fn test_unconfigured_asymmetric_algorithm_rejected() {
    // EdDSA key published, but the guard only accepts RS256.
    let ed = TestKey::generate_ed25519("ed-key");
    let set = SigningKeySet::from_jwks(&jwks_document(&[&ed])).expect("key set");
    let guard =
        AuthorizationGuard::new(TokenVerifier::new(static_resolver(set)), TEST_ISSUER, TEST_AUDIENCE);

    let token = ed.sign(&standard_claims(&["get:actors"]));
    let result = guard.authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidHeader { reason: HeaderRejection::UnsupportedAlgorithm(_) })
    ));
}

// ===========================================================================
// 3. Forged and tampered tokens
// ===========================================================================

#[tokio::test]
async fn test_token_signed_by_untrusted_key_rejected() {
    let token = TestKey::rogue_rsa(TRUSTED_KID).sign(&standard_claims(&["get:actors"]));
    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert_auth_error!(result, InvalidSignature);
}

#[tokio::test]
async fn test_payload_swap_rejected() {
    // Keep the trusted header and signature, substitute an escalated payload.
    let token = TestKey::trusted_rsa().sign(&standard_claims(&["get:actors"]));
    let parts: Vec<&str> = token.split('.').collect();
    let escalated = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&standard_claims(&["get:actors", "delete:movies"])).expect("json"),
    );
    let tampered = format!("{}.{}.{}", parts[0], escalated, parts[2]);

    let result = test_guard().authorize(Some(&bearer(&tampered)), "delete:movies").await;
    assert_auth_error!(result, InvalidSignature);
}

#[tokio::test]
async fn test_stripped_signature_rejected() {
    let token = TestKey::trusted_rsa().sign(&standard_claims(&["get:actors"]));
    let unsigned = format!("{}.", token.rsplit_once('.').expect("three parts").0);

    let result = test_guard().authorize(Some(&bearer(&unsigned)), "get:actors").await;
    assert_auth_error!(result, InvalidSignature);
}

#[tokio::test]
async fn test_unknown_kid_rejected_as_invalid_header() {
    let token = TestKey::rogue_rsa("not-published").sign(&standard_claims(&["get:actors"]));
    let err = test_guard()
        .authorize(Some(&bearer(&token)), "get:actors")
        .await
        .expect_err("unknown kid must be rejected");

    assert_eq!(err.code(), "invalid_header");
    assert_eq!(err.status_code(), 401);
    assert!(!err.description().contains("not-published"), "kid must not leak to clients");
}

#[tokio::test]
async fn test_control_characters_in_kid_rejected_before_lookup() {
    let guard = test_guard();
    let token = craft_raw_jwt(
        &json!({"alg": "RS256", "kid": "key\u{0000}injected"}),
        &standard_claims(&["get:actors"]),
    );

    let result = guard.authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidHeader { reason: HeaderRejection::InvalidKeyId(_) })
    ));
    assert_eq!(guard.verifier().resolver().metrics().fetch_count, 0);
}

#[tokio::test]
async fn test_oversized_kid_rejected_before_lookup() {
    let guard = test_guard();
    let token = craft_raw_jwt(
        &json!({"alg": "RS256", "kid": "k".repeat(10_000)}),
        &standard_claims(&["get:actors"]),
    );

    let result = guard.authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidHeader { reason: HeaderRejection::InvalidKeyId(_) })
    ));
    assert_eq!(guard.verifier().resolver().metrics().fetch_count, 0);
}

#[tokio::test]
async fn test_missing_kid_rejected() {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = None;
    let token = TestKey::trusted_rsa().sign_with_header(header, &standard_claims(&["get:actors"]));

    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidHeader { reason: HeaderRejection::MissingKeyId })
    ));
}

// ===========================================================================
// 4. Time-based claims
// ===========================================================================

#[tokio::test]
async fn test_token_expired_one_second_ago() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["exp"] = json!(Utc::now().timestamp() - 1);
    let token = TestKey::trusted_rsa().sign(&claims);

    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert_auth_error!(result, TokenExpired);
}

#[tokio::test]
async fn test_token_valid_a_minute_from_expiry() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["exp"] = json!(Utc::now().timestamp() + 60);
    let token = TestKey::trusted_rsa().sign(&claims);

    assert!(test_guard().authorize(Some(&bearer(&token)), "get:actors").await.is_ok());
}

#[tokio::test]
async fn test_future_nbf_rejected() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["nbf"] = json!(Utc::now().timestamp() + 600);
    let token = TestKey::trusted_rsa().sign(&claims);

    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidClaims { reason: ClaimsRejection::NotYetValid })
    ));
}

#[tokio::test]
async fn test_past_nbf_accepted() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["nbf"] = json!(Utc::now().timestamp() - 600);
    let token = TestKey::trusted_rsa().sign(&claims);

    assert!(test_guard().authorize(Some(&bearer(&token)), "get:actors").await.is_ok());
}

#[tokio::test]
async fn test_missing_exp_rejected() {
    let mut claims = standard_claims(&["get:actors"]);
    claims.as_object_mut().expect("object").remove("exp");
    let token = TestKey::trusted_rsa().sign(&claims);

    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidClaims { reason: ClaimsRejection::Malformed(_) })
    ));
}

// ===========================================================================
// 5. Issuer and audience
// ===========================================================================

#[tokio::test]
async fn test_token_from_other_tenant_rejected() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["iss"] = json!("https://other-tenant.test/");
    let token = TestKey::trusted_rsa().sign(&claims);

    let err = test_guard()
        .authorize(Some(&bearer(&token)), "get:actors")
        .await
        .expect_err("foreign issuer must be rejected");
    assert_eq!(err.code(), "invalid_claims");
    assert_eq!(err.description(), "Incorrect claims. Please, check the audience and issuer.");
}

#[tokio::test]
async fn test_token_for_other_api_rejected() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["aud"] = json!(["billing", "https://casting-agency.test/userinfo"]);
    let token = TestKey::trusted_rsa().sign(&claims);

    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidClaims { reason: ClaimsRejection::AudienceMismatch { .. } })
    ));
}

#[tokio::test]
async fn test_single_string_audience_accepted() {
    let mut claims = standard_claims(&["get:actors"]);
    claims["aud"] = json!(TEST_AUDIENCE);
    let token = TestKey::trusted_rsa().sign(&claims);

    assert!(test_guard().authorize(Some(&bearer(&token)), "get:actors").await.is_ok());
}

// ===========================================================================
// 6. Key rotation
// ===========================================================================

/// Serves whatever key set was last published.
struct RotatingSource {
    current: RwLock<SigningKeySet>,
}

impl RotatingSource {
    fn publish(&self, keys: &[&TestKey]) {
        *self.current.write() = SigningKeySet::from_jwks(&jwks_document(keys)).expect("key set");
    }
}

#[async_trait]
impl KeySetSource for RotatingSource {
    async fn fetch(&self) -> Result<SigningKeySet, KeySetError> {
        Ok(self.current.read().clone())
    }

    fn location(&self) -> &str {
        "rotating"
    }
}

#[tokio::test]
async fn test_rotated_key_picked_up_on_miss_and_retired_key_kept_until_refresh() {
    let old_key = TestKey::trusted_rsa();
    let new_key = TestKey::generate_ed25519("casting-test-ed-2");

    let source = Arc::new(RotatingSource { current: RwLock::new(SigningKeySet::default()) });
    source.publish(&[&old_key]);

    let resolver = Arc::new(KeyResolver::new(source.clone(), DEFAULT_CACHE_TTL));
    let verifier = TokenVerifier::new(resolver.clone())
        .with_algorithms(vec![Algorithm::RS256, Algorithm::EdDSA]);
    let guard = AuthorizationGuard::new(verifier, TEST_ISSUER, TEST_AUDIENCE);

    let old_token = old_key.sign(&standard_claims(&["get:actors"]));
    assert!(guard.authorize(Some(&bearer(&old_token)), "get:actors").await.is_ok());
    assert_eq!(resolver.metrics().fetch_count, 1);

    // Issuer rotates: the new key is published and the old one withdrawn.
    source.publish(&[&new_key]);

    // Cached set still holds the old key; no refetch needed.
    assert!(guard.authorize(Some(&bearer(&old_token)), "get:actors").await.is_ok());
    assert_eq!(resolver.metrics().fetch_count, 1);

    // Unknown kid forces exactly one refresh, which brings in the new key.
    let new_token = new_key.sign(&standard_claims(&["get:actors"]));
    assert!(guard.authorize(Some(&bearer(&new_token)), "get:actors").await.is_ok());
    assert_eq!(resolver.metrics().fetch_count, 2);

    // The refreshed set no longer carries the retired key.
    let result = guard.authorize(Some(&bearer(&old_token)), "get:actors").await;
    assert_auth_error!(result, InvalidHeader);
}

// ===========================================================================
// 7. Malformed token structure
// ===========================================================================

#[tokio::test]
async fn test_malformed_tokens_rejected_as_invalid_header() {
    let guard = test_guard();
    let cases = [
        "only-one-part",
        "two.parts",
        "four.parts.are.many",
        "!!!.@@@.###",
        "e30.e30.e30", // header `{}` has no alg
    ];

    for token in cases {
        let result = guard.authorize(Some(&bearer(token)), "get:actors").await;
        assert_auth_error!(result, InvalidHeader, token);
    }
}

#[tokio::test]
async fn test_non_json_payload_with_valid_signature_is_invalid_claims() {
    let key = TestKey::trusted_rsa();
    let token = key.sign(&json!("not an object"));

    let result = test_guard().authorize(Some(&bearer(&token)), "get:actors").await;
    assert_auth_error!(result, InvalidClaims);
}
