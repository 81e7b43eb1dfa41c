//! JWT header policy checks.
//!
//! Enforced before any key lookup so that a forged header never reaches the
//! key resolver:
//! - `none` and symmetric `HS*` algorithms are always rejected, even if
//!   configured, to prevent algorithm substitution against a public key
//! - the header `alg` must be one of the configured algorithms
//! - the `kid` must be a short printable identifier

use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::error::{AuthError, ConfigError, HeaderRejection};

/// Algorithms that are never accepted, regardless of configuration.
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Asymmetric algorithms that may be enabled through configuration.
pub const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Algorithms accepted when none are configured. The identity provider signs
/// access tokens with RS256.
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// Upper bound on `kid` length in bytes.
pub const MAX_KID_LENGTH: usize = 256;

/// Validate a token header `alg` against the forbidden list and the allowed
/// set, returning the parsed algorithm.
///
/// # Errors
///
/// Returns [`HeaderRejection::UnsupportedAlgorithm`] if the algorithm is
/// forbidden, unknown, or not in `allowed`.
///
/// # Examples
///
/// ```
/// use casting_authz::validation::{validate_algorithm, DEFAULT_ALGORITHMS};
/// use jsonwebtoken::Algorithm;
///
/// assert_eq!(validate_algorithm("RS256", DEFAULT_ALGORITHMS).ok(), Some(Algorithm::RS256));
/// assert!(validate_algorithm("none", DEFAULT_ALGORITHMS).is_err());
/// assert!(validate_algorithm("HS256", &[Algorithm::HS256]).is_err());
/// assert!(validate_algorithm("ES256", DEFAULT_ALGORITHMS).is_err());
/// ```
pub fn validate_algorithm(alg: &str, allowed: &[Algorithm]) -> Result<Algorithm, AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    let algorithm = Algorithm::from_str(alg).map_err(|_| {
        AuthError::unsupported_algorithm(format!("Algorithm '{alg}' is not recognized"))
    })?;

    if !allowed.contains(&algorithm) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in the accepted list"
        )));
    }

    Ok(algorithm)
}

/// Check a configured algorithm list.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the list is empty or names anything outside
/// [`ASYMMETRIC_ALGORITHMS`].
pub fn validate_algorithm_policy(algorithms: &[Algorithm]) -> Result<(), ConfigError> {
    if algorithms.is_empty() {
        return Err(ConfigError::new("at least one signing algorithm must be configured"));
    }

    for alg in algorithms {
        if !ASYMMETRIC_ALGORITHMS.contains(alg) {
            return Err(ConfigError::new(format!(
                "signing algorithm {alg:?} is not an accepted asymmetric algorithm"
            )));
        }
    }

    Ok(())
}

/// Validate a token header `kid`.
///
/// # Errors
///
/// Returns [`HeaderRejection::InvalidKeyId`] if the identifier is empty,
/// longer than [`MAX_KID_LENGTH`] bytes, or contains control characters.
pub fn validate_kid(kid: &str) -> Result<(), AuthError> {
    if kid.is_empty() {
        return Err(AuthError::invalid_header(HeaderRejection::InvalidKeyId(
            "kid cannot be empty".to_string(),
        )));
    }

    if kid.len() > MAX_KID_LENGTH {
        return Err(AuthError::invalid_header(HeaderRejection::InvalidKeyId(format!(
            "kid exceeds {MAX_KID_LENGTH} bytes"
        ))));
    }

    if kid.chars().any(char::is_control) {
        return Err(AuthError::invalid_header(HeaderRejection::InvalidKeyId(
            "kid contains control characters".to_string(),
        )));
    }

    Ok(())
}
