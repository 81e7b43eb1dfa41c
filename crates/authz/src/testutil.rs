//! Shared test utilities for authorization testing.
//!
//! Fixed RSA keys (one trusted, one rogue), Ed25519 key generation, token
//! minting, raw token crafting for attack tests, and ready-made key sets and
//! guards. Feature-gated behind `testutil` so it never reaches production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! casting-authz = { path = "../authz", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use casting_authz::testutil::{TestKey, standard_claims, test_guard};
//!
//! # async fn example() {
//! let token = TestKey::trusted_rsa().sign(&standard_claims(&["get:actors"]));
//! let header = format!("Bearer {token}");
//! assert!(test_guard().authorize(Some(&header), "get:actors").await.is_ok());
//! # }
//! ```

#![allow(clippy::expect_used)]

use std::{fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand_core::OsRng;
use serde_json::{Value, json};
use zeroize::Zeroizing;

use crate::{
    guard::AuthorizationGuard,
    key_set::SigningKeySet,
    permissions::Role,
    resolver::{DEFAULT_CACHE_TTL, KeyResolver},
    source::{KeySetSource, StaticKeySetSource},
    verifier::TokenVerifier,
};

/// Issuer used by every test token.
pub const TEST_ISSUER: &str = "https://casting-agency.test/";

/// Audience used by every test token.
pub const TEST_AUDIENCE: &str = "casting";

/// `kid` of the trusted RSA key.
pub const TRUSTED_KID: &str = "casting-test-rsa-1";

const TRUSTED_RSA_PEM: &str = include_str!("../testdata/trusted_rsa.pem");
const TRUSTED_RSA_N: &str = "xwpKeUTTUM49AFgaa0HBRPZ_o47j8oZSxH7LkRIVmO3S4Bkqo8MuyItCrI3hFa_UqjeFBvy6TdfVFqAAsRWIoGaFhH_jRIt0OA7Bq2NhjT6YiRZitgSy7TYAVOx-Jef57mHlcceUjsgFYgjQmoGIVIuLBTsrI2pSSzvB5sacDUEYiB1FnIig-aycNR15KVSI9bkJ3Uw3IRcPcP_TQOw20FY5qgM__4m3lid6f2p6OPGMRs0_18kmRzzQy2oBXKygoRsNx8tcHoVAawaooGqYAat5uoJoDwtt1TW8n0ia0cnC_BC8megcPS08xTA-7wSsO6J6FSG1g9M4yVKocsTnqQ";

const ROGUE_RSA_PEM: &str = include_str!("../testdata/rogue_rsa.pem");
const ROGUE_RSA_N: &str = "pQ9Ksr1U0D7Lgu6pqxmBf_dz13DTpEYUHxHJRiIRSeoRuyrJouMhJUA4ZgXd3vP-z7goMguSIuwrIYOPLCAPgw39awDa8UdBODsWzxW8nMXNHJF8VQ1fIq8cCZrIGBKjHi-4dn9bvRkSpOwXtGqa4h31bpF6rtfi_2hz-RRfcxm8wILfhsO1HuZKbSFwDBh5M5f2yXdYxuy3akUgyv2h8VZF_cI9xFJuWg_9-jCkpHGgiqAk9qYjFg0A4Cp5y7--ah3k7unhfmyn7m1kULyJ3vzYIIr7_05dbYNAN-q_j8FnEcTtlEEpbitlaeNc471kJQSUSd-mv81ZOfpVKUdJNQ";

const RSA_E: &str = "AQAB";

/// A private key that can mint tokens, paired with its public JWK.
#[derive(Clone)]
pub struct TestKey {
    kid: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    jwk: Value,
}

impl TestKey {
    /// The RSA key published in [`key_set`] under [`TRUSTED_KID`].
    ///
    /// # Panics
    ///
    /// Panics if the embedded PEM cannot be parsed.
    #[must_use]
    pub fn trusted_rsa() -> Self {
        Self::rsa(TRUSTED_KID, TRUSTED_RSA_PEM, TRUSTED_RSA_N)
    }

    /// An RSA key that is never published, minting tokens under `kid`.
    ///
    /// Signing with `kid = TRUSTED_KID` produces a token whose key lookup
    /// succeeds but whose signature does not verify.
    ///
    /// # Panics
    ///
    /// Panics if the embedded PEM cannot be parsed.
    #[must_use]
    pub fn rogue_rsa(kid: &str) -> Self {
        Self::rsa(kid, ROGUE_RSA_PEM, ROGUE_RSA_N)
    }

    fn rsa(kid: &str, pem: &str, n: &str) -> Self {
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("embedded RSA test key");
        let jwk = json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": n,
            "e": RSA_E,
        });
        Self { kid: kid.to_string(), algorithm: Algorithm::RS256, encoding_key, jwk }
    }

    /// A fresh Ed25519 key published as an `OKP` JWK with `alg: EdDSA`.
    #[must_use]
    pub fn generate_ed25519(kid: &str) -> Self {
        let (pkcs8_der, public_key_b64) = generate_ed25519_keypair();
        let jwk = json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": kid,
            "use": "sig",
            "alg": "EdDSA",
            "x": public_key_b64,
        });
        Self {
            kid: kid.to_string(),
            algorithm: Algorithm::EdDSA,
            encoding_key: EncodingKey::from_ed_der(&pkcs8_der),
            jwk,
        }
    }

    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Public JWK.
    #[must_use]
    pub fn jwk(&self) -> Value {
        self.jwk.clone()
    }

    /// Mints a token with a standard header (`alg`, `typ: JWT`, `kid`).
    ///
    /// # Panics
    ///
    /// Panics if encoding fails.
    #[must_use]
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(header, claims)
    }

    /// Mints a token with an arbitrary header.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails, e.g. if the header algorithm does not fit
    /// the key.
    #[must_use]
    pub fn sign_with_header(&self, header: Header, claims: &Value) -> String {
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("Failed to encode test JWT")
    }
}

impl fmt::Debug for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Generates an Ed25519 key pair.
///
/// Returns `(pkcs8_der, public_key_base64url)`: the private key in PKCS#8 DER
/// (for [`EncodingKey::from_ed_der`]) wrapped in [`Zeroizing`], and the
/// 32-byte public key as unpadded base64url (a JWK `x` value).
pub fn generate_ed25519_keypair() -> (Zeroizing<Vec<u8>>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    (pkcs8_der, public_key_b64)
}

/// A JWKS document publishing `keys`.
#[must_use]
pub fn jwks_document(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk()).collect::<Vec<_>>() })
}

/// Key set containing only the trusted RSA key.
///
/// # Panics
///
/// Panics if the document cannot be parsed.
#[must_use]
pub fn key_set() -> SigningKeySet {
    SigningKeySet::from_jwks(&jwks_document(&[&TestKey::trusted_rsa()])).expect("test key set")
}

/// A resolver serving `keys` from memory.
#[must_use]
pub fn static_resolver(keys: SigningKeySet) -> Arc<KeyResolver> {
    let source: Arc<dyn KeySetSource> = Arc::new(StaticKeySetSource::new(keys));
    Arc::new(KeyResolver::new(source, DEFAULT_CACHE_TTL))
}

/// A guard for [`TEST_ISSUER`] / [`TEST_AUDIENCE`] trusting [`key_set`].
#[must_use]
pub fn test_guard() -> AuthorizationGuard {
    AuthorizationGuard::new(TokenVerifier::new(static_resolver(key_set())), TEST_ISSUER, TEST_AUDIENCE)
}

/// Claims accepted by [`test_guard`], valid for one hour, granting
/// `permissions`.
#[must_use]
pub fn standard_claims(permissions: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": TEST_ISSUER,
        "sub": "auth0|test-user",
        "aud": [TEST_AUDIENCE, "https://casting-agency.test/userinfo"],
        "iat": now,
        "exp": now + 3600,
        "azp": "test-client",
        "scope": "openid profile email",
        "permissions": permissions,
    })
}

/// Like [`standard_claims`] but expired an hour ago.
#[must_use]
pub fn expired_claims(permissions: &[&str]) -> Value {
    let now = Utc::now().timestamp();
    let mut claims = standard_claims(permissions);
    claims["iat"] = json!(now - 7200);
    claims["exp"] = json!(now - 3600);
    claims
}

/// [`standard_claims`] with the permissions the identity provider grants `role`.
#[must_use]
pub fn role_claims(role: Role) -> Value {
    standard_claims(role.permissions())
}

/// Creates a raw token string from arbitrary header and payload JSON.
///
/// The result is `{header_b64}.{payload_b64}.` with an empty signature, for
/// testing rejection of forged tokens (`alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given
/// [`AuthError`](crate::error::AuthError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use casting_authz::assert_auth_error;
/// use casting_authz::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}
