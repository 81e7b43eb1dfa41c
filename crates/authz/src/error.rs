//! Authorization error types.
//!
//! Every failure of the authorization pipeline surfaces as an [`AuthError`].
//! Each variant carries exactly one wire code (see [`AuthError::code`]) and one
//! HTTP status (see [`AuthError::status_code`]). The nested reason enums keep
//! the internal cause distinguishable for logs and tests while the
//! client-facing description stays fixed.

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// HTTP status for credential problems.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// HTTP status for a valid credential lacking the required permission.
pub const STATUS_FORBIDDEN: u16 = 403;

/// Authorization failures, one variant per wire code.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No `Authorization` header was supplied (or it was empty).
    #[error("Authorization header is expected")]
    AuthorizationHeaderMissing,

    /// The header or the token structure could not be accepted.
    #[error("Invalid header: {reason}")]
    InvalidHeader {
        /// Why the header or token was rejected.
        #[source]
        reason: HeaderRejection,
    },

    /// Token signature did not verify against the resolved key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Token `exp` is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// Signature was valid but a claim was rejected.
    #[error("Invalid claims: {reason}")]
    InvalidClaims {
        /// Which claim check failed.
        reason: ClaimsRejection,
    },

    /// Token is valid but does not grant the required permission.
    #[error("Permission not found: {permission}")]
    Unauthorized {
        /// The permission the caller was required to hold.
        permission: String,
    },
}

impl AuthError {
    /// Creates an [`AuthError::AuthorizationHeaderMissing`].
    #[must_use]
    pub fn authorization_header_missing() -> Self {
        Self::AuthorizationHeaderMissing
    }

    /// Creates an [`AuthError::InvalidHeader`] with the given reason.
    #[must_use]
    pub fn invalid_header(reason: HeaderRejection) -> Self {
        Self::InvalidHeader { reason }
    }

    /// Creates an [`AuthError::InvalidHeader`] for a token that cannot be decoded.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::invalid_header(HeaderRejection::MalformedToken(message.into()))
    }

    /// Creates an [`AuthError::InvalidHeader`] for a rejected signing algorithm.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::invalid_header(HeaderRejection::UnsupportedAlgorithm(message.into()))
    }

    /// Creates an [`AuthError::InvalidSignature`].
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an [`AuthError::TokenExpired`].
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an [`AuthError::InvalidClaims`] with the given reason.
    #[must_use]
    pub fn invalid_claims(reason: ClaimsRejection) -> Self {
        Self::InvalidClaims { reason }
    }

    /// Creates an [`AuthError::Unauthorized`] for the given required permission.
    #[must_use]
    pub fn unauthorized(permission: impl Into<String>) -> Self {
        Self::Unauthorized { permission: permission.into() }
    }

    /// Machine-readable code sent to clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationHeaderMissing => "authorization_header_missing",
            Self::InvalidHeader { .. } => "invalid_header",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::InvalidClaims { .. } => "invalid_claims",
            Self::Unauthorized { .. } => "unauthorized",
        }
    }

    /// HTTP status that accompanies this error.
    ///
    /// 403 for a missing permission, 401 for everything else.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => STATUS_FORBIDDEN,
            _ => STATUS_UNAUTHORIZED,
        }
    }

    /// Human-readable description sent to clients.
    ///
    /// Never includes token contents, key identifiers, or the caller's
    /// granted permissions.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::AuthorizationHeaderMissing => "Authorization header is expected.",
            Self::InvalidHeader { reason } => reason.description(),
            Self::InvalidSignature => "Unable to verify token signature.",
            Self::TokenExpired => "Token expired.",
            Self::InvalidClaims { reason } => reason.description(),
            Self::Unauthorized { .. } => "Permission not found.",
        }
    }
}

/// Reasons an `Authorization` header or token header is rejected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HeaderRejection {
    /// Scheme is not exactly `Bearer`.
    #[error("authorization scheme must be Bearer")]
    WrongScheme,

    /// `Bearer` with no token after it.
    #[error("bearer token not found")]
    MissingToken,

    /// More than two space-separated parts.
    #[error("authorization header has too many parts")]
    TooManyParts,

    /// Token is not a three-part compact JWS or its header cannot be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Header `alg` is missing, forbidden, or not configured.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Header has no `kid`.
    #[error("token header missing 'kid'")]
    MissingKeyId,

    /// Header `kid` fails format checks.
    #[error("invalid key id: {0}")]
    InvalidKeyId(String),

    /// The resolved key declares a different algorithm than the token header.
    #[error("key '{kid}' is bound to {key_algorithm}, token declares {token_algorithm}")]
    AlgorithmMismatch {
        /// Key identifier from the token header.
        kid: String,
        /// Algorithm published with the key.
        key_algorithm: String,
        /// Algorithm declared by the token.
        token_algorithm: String,
    },

    /// The signing key could not be resolved.
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),
}

impl HeaderRejection {
    /// Client-facing description for this rejection.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::WrongScheme => "Authorization header must start with \"Bearer\".",
            Self::MissingToken => "Token not found.",
            Self::TooManyParts => "Authorization header must be bearer token.",
            Self::MalformedToken(_) => "Unable to parse authentication token.",
            Self::UnsupportedAlgorithm(_) => "Token signing algorithm is not accepted.",
            Self::MissingKeyId | Self::InvalidKeyId(_) => "Authorization malformed.",
            Self::AlgorithmMismatch { .. } | Self::KeyResolution(_) => {
                "Unable to find the appropriate key."
            },
        }
    }
}

/// Reasons a verified token's claims are rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClaimsRejection {
    /// `iss` does not equal the trusted issuer.
    #[error("issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch {
        /// Configured trusted issuer.
        expected: String,
        /// Issuer found in the token.
        actual: String,
    },

    /// `aud` does not contain the required audience.
    #[error("audience does not include '{expected}'")]
    AudienceMismatch {
        /// Configured audience.
        expected: String,
    },

    /// `nbf` is in the future.
    #[error("token not yet valid")]
    NotYetValid,

    /// Payload could not be decoded into the expected claim shapes.
    #[error("malformed claims: {0}")]
    Malformed(String),
}

impl ClaimsRejection {
    /// Client-facing description for this rejection.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::IssuerMismatch { .. } | Self::AudienceMismatch { .. } => {
                "Incorrect claims. Please, check the audience and issuer."
            },
            Self::NotYetValid => "Token is not yet valid.",
            Self::Malformed(_) => "Unable to parse token claims.",
        }
    }
}

/// Failures of the key resolver.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum KeyResolutionError {
    /// No key with this identifier in the current key set.
    #[error("Signing key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// Key's published `nbf` is in the future.
    #[error("Signing key not yet valid: {kid}")]
    KeyNotYetValid {
        /// Key ID that is not yet valid.
        kid: String,
    },

    /// Key's published `exp` is in the past.
    #[error("Signing key expired: {kid}")]
    KeyExpired {
        /// Key ID that expired.
        kid: String,
    },

    /// The key set could not be retrieved.
    ///
    /// Shared between all callers that joined the same refresh.
    #[error("Key set unavailable: {0}")]
    Unavailable(#[source] Arc<KeySetError>),
}

impl KeyResolutionError {
    /// Creates a [`KeyResolutionError::KeyNotFound`].
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a [`KeyResolutionError::KeyNotYetValid`].
    #[must_use]
    pub fn key_not_yet_valid(kid: impl Into<String>) -> Self {
        Self::KeyNotYetValid { kid: kid.into() }
    }

    /// Creates a [`KeyResolutionError::KeyExpired`].
    #[must_use]
    pub fn key_expired(kid: impl Into<String>) -> Self {
        Self::KeyExpired { kid: kid.into() }
    }
}

impl From<KeyResolutionError> for AuthError {
    fn from(err: KeyResolutionError) -> Self {
        AuthError::invalid_header(HeaderRejection::KeyResolution(err))
    }
}

/// Failures while fetching or decoding a published key set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeySetError {
    /// Transport-level failure talking to the key set endpoint.
    #[error("Key set request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
        /// Underlying HTTP client error.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The fetch did not complete within the configured bound.
    #[error("Key set fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Endpoint answered with a non-success status.
    #[error("Key set endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code returned.
        status: u16,
    },

    /// Response body is not a JWKS document.
    #[error("Key set document is invalid: {0}")]
    Decode(String),

    /// Any other fault, normalized.
    #[error("Key set internal error: {0}")]
    Internal(String),
}

impl KeySetError {
    /// Creates a [`KeySetError::Decode`].
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a [`KeySetError::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<reqwest::Error> for KeySetError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return KeySetError::Status { status: status.as_u16() };
        }
        KeySetError::Request { message: err.to_string(), source: Some(err) }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::invalid_signature(),
            ErrorKind::ExpiredSignature => AuthError::token_expired(),
            ErrorKind::ImmatureSignature => AuthError::invalid_claims(ClaimsRejection::NotYetValid),
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                AuthError::unsupported_algorithm("algorithm does not match the signing key")
            },
            ErrorKind::Json(e) => AuthError::invalid_claims(ClaimsRejection::Malformed(e.to_string())),
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                AuthError::malformed_token("invalid JWT structure")
            },
            _ => AuthError::malformed_token(format!("JWT error: {err}")),
        }
    }
}

/// Invalid process configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid configuration: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Creates a configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type alias for authorization operations.
pub type Result<T> = std::result::Result<T, AuthError>;
