//! `Authorization` header parsing.
//!
//! The header must be exactly `Bearer <token>`: case-sensitive scheme, one
//! space, a non-empty token, nothing after it.

use crate::error::{AuthError, HeaderRejection};

/// The only accepted authorization scheme.
pub const BEARER_SCHEME: &str = "Bearer";

/// Extracts the bearer token from a raw `Authorization` header value.
///
/// An absent or empty header is reported as
/// [`AuthError::AuthorizationHeaderMissing`]; every other deviation is an
/// [`AuthError::InvalidHeader`] with a [`HeaderRejection`] naming the defect.
///
/// # Errors
///
/// - [`HeaderRejection::WrongScheme`] if the first part is not `Bearer`
/// - [`HeaderRejection::MissingToken`] if the token part is absent or empty
/// - [`HeaderRejection::TooManyParts`] if more than two space-separated parts are present
///
/// # Examples
///
/// ```
/// use casting_authz::bearer::parse_bearer;
///
/// assert_eq!(parse_bearer(Some("Bearer abc.def.ghi")).ok(), Some("abc.def.ghi"));
/// assert_eq!(parse_bearer(None).unwrap_err().code(), "authorization_header_missing");
/// assert_eq!(parse_bearer(Some("bearer abc")).unwrap_err().code(), "invalid_header");
/// ```
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let raw = match header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthError::authorization_header_missing()),
    };

    let mut parts = raw.split(' ');

    if parts.next() != Some(BEARER_SCHEME) {
        return Err(AuthError::invalid_header(HeaderRejection::WrongScheme));
    }

    let Some(token) = parts.next() else {
        return Err(AuthError::invalid_header(HeaderRejection::MissingToken));
    };

    if parts.next().is_some() {
        return Err(AuthError::invalid_header(HeaderRejection::TooManyParts));
    }

    if token.is_empty() {
        return Err(AuthError::invalid_header(HeaderRejection::MissingToken));
    }

    Ok(token)
}
