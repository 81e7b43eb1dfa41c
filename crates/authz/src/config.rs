//! Authorization configuration.
//!
//! [`AuthConfig`] carries everything fixed for the process lifetime: the
//! trusted issuer, the API audience, where the issuer publishes its keys, and
//! the cache and verification tuning.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use casting_authz::AuthConfig;
//!
//! let config = AuthConfig::builder()
//!     .issuer("https://casting-agency.us.auth0.com/")
//!     .audience("casting")
//!     .jwks_url("https://casting-agency.us.auth0.com/.well-known/jwks.json")
//!     .cache_ttl(Duration::from_secs(300))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
//! ```
//!
//! Deserialized configurations skip the builder; call
//! [`AuthConfig::validate`] (or use
//! [`AuthorizationGuard::from_config`](crate::AuthorizationGuard::from_config),
//! which does) before use:
//!
//! ```
//! use casting_authz::AuthConfig;
//!
//! let config: AuthConfig = serde_json::from_str(r#"{
//!     "issuer": "https://casting-agency.us.auth0.com/",
//!     "audience": "casting",
//!     "jwks_url": "https://casting-agency.us.auth0.com/.well-known/jwks.json",
//!     "cache_ttl": "5m",
//!     "refresh_interval": "1m"
//! }"#).unwrap();
//!
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use jsonwebtoken::Algorithm;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    resolver::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT},
    validation::{DEFAULT_ALGORITHMS, validate_algorithm_policy},
};

/// Default tolerance for `exp`/`nbf` checks (none).
pub const DEFAULT_LEEWAY: Duration = Duration::ZERO;

/// Configuration for an [`AuthorizationGuard`](crate::AuthorizationGuard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    issuer: String,

    audience: String,

    jwks_url: String,

    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    cache_ttl: Duration,

    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    fetch_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_leeway")]
    leeway: Duration,

    #[serde(default = "default_algorithms")]
    algorithms: Vec<Algorithm>,

    #[serde(with = "humantime_serde", default)]
    refresh_interval: Option<Duration>,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_leeway() -> Duration {
    DEFAULT_LEEWAY
}

fn default_algorithms() -> Vec<Algorithm> {
    DEFAULT_ALGORITHMS.to_vec()
}

#[bon::bon]
impl AuthConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any field fails [`validate`](Self::validate).
    #[builder]
    pub fn new(
        #[builder(into)] issuer: String,
        #[builder(into)] audience: String,
        #[builder(into)] jwks_url: String,
        #[builder(default = DEFAULT_CACHE_TTL)] cache_ttl: Duration,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] fetch_timeout: Duration,
        #[builder(default = DEFAULT_LEEWAY)] leeway: Duration,
        #[builder(default = DEFAULT_ALGORITHMS.to_vec(), into)] algorithms: Vec<Algorithm>,
        refresh_interval: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            issuer,
            audience,
            jwks_url,
            cache_ttl,
            fetch_timeout,
            leeway,
            algorithms,
            refresh_interval,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AuthConfig {
    /// Configuration for an Auth0 tenant: issuer `https://{domain}/`, keys at
    /// `https://{domain}/.well-known/jwks.json`, other settings default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `domain` or `audience` is empty, or `domain`
    /// does not form a valid URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use casting_authz::AuthConfig;
    ///
    /// let config = AuthConfig::for_auth0_domain("casting-agency.us.auth0.com", "casting").unwrap();
    /// assert_eq!(config.issuer(), "https://casting-agency.us.auth0.com/");
    /// assert_eq!(config.jwks_url(), "https://casting-agency.us.auth0.com/.well-known/jwks.json");
    /// ```
    pub fn for_auth0_domain(domain: &str, audience: &str) -> Result<Self, ConfigError> {
        let domain = domain.trim_end_matches('/');
        if domain.is_empty() {
            return Err(ConfigError::new("auth domain cannot be empty"));
        }

        Self::builder()
            .issuer(format!("https://{domain}/"))
            .audience(audience)
            .jwks_url(format!("https://{domain}/.well-known/jwks.json"))
            .build()
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `issuer` or `audience` is empty
    /// - `jwks_url` is not an absolute `http`/`https` URL with a host
    /// - `algorithms` is empty or names a non-asymmetric algorithm
    /// - `cache_ttl`, `fetch_timeout` or `refresh_interval` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::new("issuer cannot be empty"));
        }

        if self.audience.trim().is_empty() {
            return Err(ConfigError::new("audience cannot be empty"));
        }

        let url = Url::parse(&self.jwks_url)
            .map_err(|e| ConfigError::new(format!("jwks_url is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::new(format!(
                "jwks_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::new("jwks_url must include a host"));
        }

        validate_algorithm_policy(&self.algorithms)?;

        if self.cache_ttl.is_zero() {
            return Err(ConfigError::new("cache_ttl must be greater than zero"));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::new("fetch_timeout must be greater than zero"));
        }

        if self.refresh_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::new("refresh_interval must be greater than zero"));
        }

        Ok(())
    }

    /// Trusted token issuer (`iss`), compared exactly.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audience every accepted token must include.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Where the issuer publishes its JWKS.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Lifetime of a fetched key set.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Bound on a single key set fetch.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Clock tolerance for `exp`/`nbf`.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Accepted signing algorithms.
    #[must_use]
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Background refresh period, if enabled.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }
}
