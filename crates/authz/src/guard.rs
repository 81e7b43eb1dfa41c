//! The authorization guard invoked at the top of each protected handler.

use std::sync::Arc;

use crate::{
    bearer::parse_bearer,
    claims::VerifiedClaims,
    config::AuthConfig,
    error::{AuthError, ConfigError},
    permissions::extract_permissions,
    resolver::KeyResolver,
    source::HttpKeySetSource,
    verifier::TokenVerifier,
};

/// Checks that a request carries a valid token granting a permission.
///
/// Holds no per-request state; clone it or share it through an `Arc`.
///
/// # Examples
///
/// ```no_run
/// use casting_authz::{AuthConfig, AuthorizationGuard, permissions::GET_ACTORS};
///
/// # async fn handler(authorization: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthConfig::for_auth0_domain("casting-agency.us.auth0.com", "casting")?;
/// let guard = AuthorizationGuard::from_config(&config)?;
///
/// match guard.authorize(authorization, GET_ACTORS).await {
///     Ok(claims) => println!("hello {:?}", claims.subject()),
///     Err(err) => println!("{} {}", err.status_code(), serde_json::to_string(&err.to_body())?),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    verifier: TokenVerifier,
    issuer: String,
    audience: String,
}

impl AuthorizationGuard {
    /// Creates a guard that accepts tokens from `issuer` for `audience`.
    #[must_use]
    pub fn new(verifier: TokenVerifier, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self { verifier, issuer: issuer.into(), audience: audience.into() }
    }

    /// Wires an HTTP key source, a resolver and a verifier from `config`.
    ///
    /// Starts background key refresh when `refresh_interval` is set, which
    /// requires a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let source = HttpKeySetSource::new(config.jwks_url(), config.fetch_timeout())
            .map_err(|e| ConfigError::new(e.to_string()))?;

        let mut resolver = Arc::new(
            KeyResolver::new(Arc::new(source), config.cache_ttl())
                .with_fetch_timeout(config.fetch_timeout()),
        );
        if let Some(interval) = config.refresh_interval() {
            resolver = resolver.with_refresh_interval(interval);
        }

        let verifier = TokenVerifier::new(resolver)
            .with_algorithms(config.algorithms().to_vec())
            .with_leeway(config.leeway());

        tracing::info!(
            issuer = %config.issuer(),
            audience = %config.audience(),
            jwks_url = %config.jwks_url(),
            "authorization guard configured"
        );

        Ok(Self::new(verifier, config.issuer(), config.audience()))
    }

    /// Authorizes a request from its raw `Authorization` header value.
    ///
    /// Steps, each short-circuiting: parse `Bearer <token>`, verify the token
    /// against the configured issuer and audience, then require
    /// `required_permission` in the token's `permissions` claim.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AuthorizationHeaderMissing`] if the header is absent or empty
    /// - [`AuthError::InvalidHeader`] for a malformed header or token, or an unresolvable key
    /// - [`AuthError::InvalidSignature`], [`AuthError::TokenExpired`] or [`AuthError::InvalidClaims`]
    ///   from verification
    /// - [`AuthError::Unauthorized`] if the permission is not granted
    #[tracing::instrument(skip(self, authorization), fields(permission = %required_permission))]
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        required_permission: &str,
    ) -> Result<VerifiedClaims, AuthError> {
        let result = self.check(authorization, required_permission).await;
        if let Err(err) = &result {
            tracing::debug!(code = err.code(), status = err.status_code(), "authorization denied");
        }
        result
    }

    async fn check(
        &self,
        authorization: Option<&str>,
        required_permission: &str,
    ) -> Result<VerifiedClaims, AuthError> {
        let token = parse_bearer(authorization)?;
        let claims = self.verifier.verify(token, &self.audience, &self.issuer).await?;

        if !extract_permissions(&claims).contains(required_permission) {
            return Err(AuthError::unauthorized(required_permission));
        }

        Ok(claims)
    }

    /// Trusted issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Required audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// The underlying verifier.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Stops background key refresh.
    pub async fn shutdown(&self) {
        self.verifier.resolver().shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{
        assert_auth_error,
        permissions::{DELETE_MOVIES, GET_ACTORS, Role},
        testutil::{TestKey, role_claims, standard_claims, test_guard},
    };

    #[tokio::test]
    async fn test_granted_permission() {
        let token = TestKey::trusted_rsa().sign(&standard_claims(&[GET_ACTORS]));
        let header = format!("Bearer {token}");

        let claims = test_guard().authorize(Some(&header), GET_ACTORS).await.unwrap();
        assert!(claims.permissions().unwrap().contains(GET_ACTORS));
    }

    #[tokio::test]
    async fn test_missing_permission_is_forbidden() {
        let token = TestKey::trusted_rsa().sign(&standard_claims(&[GET_ACTORS]));
        let header = format!("Bearer {token}");

        let err = test_guard().authorize(Some(&header), DELETE_MOVIES).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized { ref permission } if permission == DELETE_MOVIES));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_absent_permissions_claim_is_forbidden() {
        let mut claims = standard_claims(&[]);
        claims.as_object_mut().unwrap().remove("permissions");
        let header = format!("Bearer {}", TestKey::trusted_rsa().sign(&claims));

        let result = test_guard().authorize(Some(&header), GET_ACTORS).await;
        assert_auth_error!(result, Unauthorized);
    }

    #[tokio::test]
    async fn test_header_errors_short_circuit_before_key_lookup() {
        let guard = test_guard();

        assert_auth_error!(guard.authorize(None, GET_ACTORS).await, AuthorizationHeaderMissing);
        assert_auth_error!(guard.authorize(Some("Basic abc"), GET_ACTORS).await, InvalidHeader);
        assert_auth_error!(guard.authorize(Some("Bearer a.b.c d"), GET_ACTORS).await, InvalidHeader);

        assert_eq!(guard.verifier().resolver().metrics().fetch_count, 0);
    }

    #[tokio::test]
    async fn test_roles_map_to_route_access() {
        let guard = test_guard();
        let key = TestKey::trusted_rsa();

        for role in Role::ALL {
            let header = format!("Bearer {}", key.sign(&role_claims(role)));
            for permission in crate::permissions::ALL_PERMISSIONS {
                let result = guard.authorize(Some(&header), permission).await;
                assert_eq!(
                    result.is_ok(),
                    role.grants(permission),
                    "{} / {permission}",
                    role.name()
                );
            }
        }
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"issuer": "", "audience": "casting", "jwks_url": "https://idp.test/jwks.json"}"#,
        )
        .unwrap();
        assert!(AuthorizationGuard::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_from_config_wires_settings() {
        let config = AuthConfig::for_auth0_domain("casting-agency.test", "casting").unwrap();
        let guard = AuthorizationGuard::from_config(&config).unwrap();

        assert_eq!(guard.issuer(), "https://casting-agency.test/");
        assert_eq!(guard.audience(), "casting");
        assert_eq!(guard.verifier().resolver().ttl(), config.cache_ttl());
        assert_eq!(guard.verifier().algorithms(), config.algorithms());
    }
}
