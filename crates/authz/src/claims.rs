//! Verified token claims.
//!
//! Access tokens minted by the identity provider look like:
//!
//! ```json
//! {
//!   "iss": "https://casting-agency.us.auth0.com/",
//!   "sub": "auth0|5f7c8ec7c33c6c004bbafe82",
//!   "aud": ["casting", "https://casting-agency.us.auth0.com/userinfo"],
//!   "iat": 1700000000,
//!   "exp": 1700086400,
//!   "azp": "kGF3xD0aAmSVgGbVfi1bWTcPcnE1tyY8",
//!   "scope": "openid profile",
//!   "permissions": ["get:actors", "get:movies"]
//! }
//! ```
//!
//! [`VerifiedClaims`] can only be produced by
//! [`TokenVerifier`](crate::verifier::TokenVerifier); there is no public
//! constructor and no `Deserialize` impl.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `aud` claim, which may be a single string or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "casting"`
    Single(String),
    /// `"aud": ["casting", "..."]`
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns true if `audience` is one of the token's audiences.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    /// Iterates over all audiences.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            Self::Single(aud) => std::slice::from_ref(aud),
            Self::Multiple(auds) => auds.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

/// Payload shape decoded after the signature has been checked.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    pub(crate) iss: String,
    pub(crate) aud: Audience,
    pub(crate) exp: u64,
    #[serde(default)]
    pub(crate) sub: Option<String>,
    #[serde(default)]
    pub(crate) iat: Option<u64>,
    #[serde(default)]
    pub(crate) nbf: Option<u64>,
    #[serde(default)]
    pub(crate) azp: Option<String>,
    #[serde(default)]
    pub(crate) scope: Option<String>,
    #[serde(default)]
    pub(crate) permissions: Option<Vec<String>>,
}

/// Claims of a token whose signature, issuer, audience and expiry have all
/// been validated.
///
/// Immutable and scoped to the request that presented the token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    issuer: String,
    audience: Audience,
    expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issued_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    not_before: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorized_party: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permissions: Option<BTreeSet<String>>,
}

impl VerifiedClaims {
    /// Wraps claims that passed every check.
    pub(crate) fn from_validated(raw: RawClaims) -> Self {
        Self {
            issuer: raw.iss,
            audience: raw.aud,
            expires_at: raw.exp,
            subject: raw.sub,
            issued_at: raw.iat,
            not_before: raw.nbf,
            authorized_party: raw.azp,
            scope: raw.scope,
            permissions: raw.permissions.map(|perms| perms.into_iter().collect()),
        }
    }

    /// Token issuer (`iss`).
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Token audience (`aud`).
    #[must_use]
    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// Expiry in seconds since the epoch (`exp`).
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Expiry as a timestamp, if representable.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.expires_at).ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Acting subject (`sub`), e.g. `auth0|5f7c8ec7c33c6c004bbafe82`.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Issued-at in seconds since the epoch (`iat`).
    #[must_use]
    pub fn issued_at(&self) -> Option<u64> {
        self.issued_at
    }

    /// Not-before in seconds since the epoch (`nbf`).
    #[must_use]
    pub fn not_before(&self) -> Option<u64> {
        self.not_before
    }

    /// Client the token was issued to (`azp`).
    #[must_use]
    pub fn authorized_party(&self) -> Option<&str> {
        self.authorized_party.as_deref()
    }

    /// Parse scopes from the space-separated `scope` claim.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.as_deref().map(|s| s.split_whitespace().collect()).unwrap_or_default()
    }

    /// Granted permissions, or `None` when the claim is absent.
    ///
    /// Use [`extract_permissions`](crate::permissions::extract_permissions)
    /// for the absent-means-empty view.
    #[must_use]
    pub fn permissions(&self) -> Option<&BTreeSet<String>> {
        self.permissions.as_ref()
    }
}
