//! Token verification.
//!
//! [`TokenVerifier::verify`] runs these checks in order and stops at the
//! first failure:
//!
//! 1. structure: three dot-separated parts with a decodable JSON header
//! 2. header `alg` is an accepted asymmetric algorithm
//! 3. header `kid` is present and well-formed, and resolves to a key
//! 4. the key's declared algorithm (if any) matches the header
//! 5. signature
//! 6. claims: `exp`, `nbf`, `iss`, `aud`
//!
//! No claims are returned unless every check passes.

use std::{collections::HashSet, sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::{
    claims::{RawClaims, VerifiedClaims},
    error::{AuthError, ClaimsRejection, HeaderRejection},
    key_set::unix_now,
    resolver::KeyResolver,
    validation::{DEFAULT_ALGORITHMS, validate_algorithm, validate_kid},
};

/// The JOSE header fields the verifier looks at.
///
/// `alg` is kept as a string so that `none` and unknown algorithms are
/// rejected by policy rather than by a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm.
    pub alg: String,
    /// Key identifier.
    #[serde(default)]
    pub kid: Option<String>,
    /// Media type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

/// Decode a token's header without verifying anything else.
///
/// # Errors
///
/// Returns [`HeaderRejection::MalformedToken`] if the token does not have
/// exactly three dot-separated parts or the header is not base64url JSON.
///
/// # Examples
///
/// ```
/// use casting_authz::verifier::decode_token_header;
///
/// // {"alg":"RS256","typ":"JWT","kid":"k1"}
/// let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6ImsxIn0.e30.c2ln";
/// let header = decode_token_header(token).unwrap();
/// assert_eq!(header.alg, "RS256");
/// assert_eq!(header.kid.as_deref(), Some("k1"));
///
/// assert!(decode_token_header("not-a-token").is_err());
/// ```
pub fn decode_token_header(token: &str) -> Result<TokenHeader, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::malformed_token("token must have 3 parts separated by dots"));
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|e| AuthError::malformed_token(format!("failed to decode token header: {e}")))?;

    serde_json::from_slice(&header_bytes)
        .map_err(|e| AuthError::malformed_token(format!("failed to parse token header: {e}")))
}

/// Verifies signed tokens against keys from a [`KeyResolver`].
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    resolver: Arc<KeyResolver>,
    algorithms: Vec<Algorithm>,
    leeway: Duration,
}

impl TokenVerifier {
    /// Creates a verifier accepting [`DEFAULT_ALGORITHMS`] with no clock leeway.
    #[must_use]
    pub fn new(resolver: Arc<KeyResolver>) -> Self {
        Self { resolver, algorithms: DEFAULT_ALGORITHMS.to_vec(), leeway: Duration::ZERO }
    }

    /// Replaces the accepted algorithms. `none` and `HS*` are rejected
    /// whatever this list contains.
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: impl Into<Vec<Algorithm>>) -> Self {
        self.algorithms = algorithms.into();
        self
    }

    /// Tolerance applied to `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Accepted algorithms.
    #[must_use]
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// The resolver keys are looked up through.
    #[must_use]
    pub fn resolver(&self) -> &Arc<KeyResolver> {
        &self.resolver
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidHeader`] for structural, algorithm, `kid` and key resolution failures
    /// - [`AuthError::InvalidSignature`] if the signature does not verify
    /// - [`AuthError::TokenExpired`] if `exp` has passed
    /// - [`AuthError::InvalidClaims`] for `nbf`, issuer, audience and claim shape failures
    #[tracing::instrument(skip(self, token))]
    pub async fn verify(
        &self,
        token: &str,
        required_audience: &str,
        trusted_issuer: &str,
    ) -> Result<VerifiedClaims, AuthError> {
        let header = decode_token_header(token)?;
        let algorithm = validate_algorithm(&header.alg, &self.algorithms)?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_header(HeaderRejection::MissingKeyId))?;
        validate_kid(&kid)?;

        let record = self.resolver.resolve(&kid).await.map_err(|e| {
            tracing::warn!(kid = %kid, error = %e, "signing key resolution failed");
            AuthError::from(e)
        })?;

        if let Some(key_algorithm) = record.algorithm()
            && key_algorithm != algorithm
        {
            return Err(AuthError::invalid_header(HeaderRejection::AlgorithmMismatch {
                kid,
                key_algorithm: format!("{key_algorithm:?}"),
                token_algorithm: header.alg,
            }));
        }

        let raw = verify_signature(token, record.decoding_key(), algorithm)?;
        validate_claims(&raw, required_audience, trusted_issuer, self.leeway, unix_now())?;

        tracing::debug!(kid = %kid, "token verified");
        Ok(VerifiedClaims::from_validated(raw))
    }
}

/// Check the signature and decode the payload. Claims are not validated.
///
/// # Errors
///
/// - [`AuthError::InvalidSignature`] on a signature mismatch
/// - [`AuthError::InvalidHeader`] if the key cannot be used with `algorithm`
/// - [`AuthError::InvalidClaims`] if the payload lacks `iss`, `aud` or `exp`, or a claim has the
///   wrong type
pub(crate) fn verify_signature(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<RawClaims, AuthError> {
    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let token_data = decode::<RawClaims>(token, key, &validation)?;
    Ok(token_data.claims)
}

/// Validate time, issuer and audience claims at `now` (seconds since the epoch).
///
/// Expiry is checked first, so an expired token is reported as expired even
/// if its issuer or audience is also wrong.
///
/// # Errors
///
/// - [`AuthError::TokenExpired`] if `exp + leeway <= now`
/// - [`ClaimsRejection::NotYetValid`] if `nbf > now + leeway`
/// - [`ClaimsRejection::IssuerMismatch`] if `iss != trusted_issuer`
/// - [`ClaimsRejection::AudienceMismatch`] if `aud` does not contain `required_audience`
pub(crate) fn validate_claims(
    claims: &RawClaims,
    required_audience: &str,
    trusted_issuer: &str,
    leeway: Duration,
    now: u64,
) -> Result<(), AuthError> {
    let leeway = leeway.as_secs();

    if claims.exp.saturating_add(leeway) <= now {
        return Err(AuthError::token_expired());
    }

    if let Some(nbf) = claims.nbf
        && nbf > now.saturating_add(leeway)
    {
        return Err(AuthError::invalid_claims(ClaimsRejection::NotYetValid));
    }

    if claims.iss != trusted_issuer {
        return Err(AuthError::invalid_claims(ClaimsRejection::IssuerMismatch {
            expected: trusted_issuer.to_string(),
            actual: claims.iss.clone(),
        }));
    }

    if !claims.aud.contains(required_audience) {
        return Err(AuthError::invalid_claims(ClaimsRejection::AudienceMismatch {
            expected: required_audience.to_string(),
        }));
    }

    Ok(())
}
