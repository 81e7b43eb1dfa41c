//! # Casting Agency Authorization
//!
//! Bearer-token authorization for the casting agency API.
//!
//! This crate provides:
//! - **Header parsing**: strict `Bearer <token>` extraction
//! - **Token verification**: signature, algorithm policy and standard claims
//! - **Key resolution**: the issuer's JWKS behind a single-flight, TTL-bounded cache
//! - **Permission enforcement**: membership of a route's permission in the `permissions` claim
//! - **Error bodies**: the JSON shapes clients receive for every failure
//!
//! ## Features
//!
//! - Only asymmetric algorithms are accepted; `none` and `HS*` are always rejected
//! - Concurrent cache misses share one key set fetch, including a failed one
//! - Every failure maps to exactly one wire code and HTTP status
//!
//! ## Example
//!
//! ```no_run
//! use casting_authz::{AuthConfig, AuthorizationGuard, permissions::DELETE_MOVIES};
//!
//! # async fn example(authorization: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::for_auth0_domain("casting-agency.us.auth0.com", "casting")?;
//! let guard = AuthorizationGuard::from_config(&config)?;
//!
//! // `authorization` is the raw `Authorization` header value, if any.
//! match guard.authorize(authorization, DELETE_MOVIES).await {
//!     Ok(claims) => println!("authorized {:?}", claims.subject()),
//!     Err(err) => {
//!         let body = serde_json::to_string(&err.to_body())?;
//!         println!("HTTP {} {body}", err.status_code());
//!     },
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// `Authorization` header parsing.
pub mod bearer;
/// Verified token claims.
pub mod claims;
/// Guard configuration.
pub mod config;
/// Authorization error types.
pub mod error;
/// The per-request authorization guard.
pub mod guard;
/// Published signing keys.
pub mod key_set;
/// Permission extraction and catalog.
pub mod permissions;
/// Single-flight key resolution.
pub mod resolver;
/// JSON error bodies.
pub mod response;
/// Key set sources.
pub mod source;
/// Algorithm and key identifier policy.
pub mod validation;
/// Token verification.
pub mod verifier;

/// Shared test utilities (requires the `testutil` feature).
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use bearer::parse_bearer;
pub use claims::{Audience, VerifiedClaims};
pub use config::AuthConfig;
pub use error::{AuthError, ConfigError, Result};
pub use guard::AuthorizationGuard;
pub use key_set::{SigningKeyRecord, SigningKeySet};
pub use permissions::{PermissionSet, Role, extract_permissions};
pub use resolver::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, KeyResolver, ResolverMetricsSnapshot};
pub use response::{AuthErrorBody, FrameworkError, MessageBody};
pub use source::{DEFAULT_MAX_BODY_BYTES, HttpKeySetSource, KeySetSource, StaticKeySetSource};
pub use validation::{DEFAULT_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::TokenVerifier;
