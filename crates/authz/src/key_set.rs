//! Published signing keys (JWKS).
//!
//! A [`SigningKeySet`] is an immutable snapshot of the issuer's key set,
//! indexed by `kid`. Entries that cannot be used to verify token signatures
//! are dropped while parsing, with a warning, so one bad entry never poisons
//! the whole set.

use std::{collections::HashMap, fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, EllipticCurve, Jwk},
};
use serde_json::Value;

use crate::{
    error::{KeyResolutionError, KeySetError},
    validation::{ASYMMETRIC_ALGORITHMS, validate_algorithm},
};

/// One verification key from the issuer's key set.
#[derive(Clone)]
pub struct SigningKeyRecord {
    kid: String,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
    not_before: Option<u64>,
    expires_at: Option<u64>,
}

impl SigningKeyRecord {
    /// Creates a record with no declared algorithm and no validity window.
    #[must_use]
    pub fn new(kid: impl Into<String>, key: DecodingKey) -> Self {
        Self { kid: kid.into(), algorithm: None, key, not_before: None, expires_at: None }
    }

    /// Binds the key to a single algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Restricts use of the key to `[not_before, expires_at)`, in seconds
    /// since the epoch.
    #[must_use]
    pub fn with_validity(mut self, not_before: Option<u64>, expires_at: Option<u64>) -> Self {
        self.not_before = not_before;
        self.expires_at = expires_at;
        self
    }

    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm the issuer declared for this key, if any.
    #[must_use]
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for signature verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Published `nbf`, if any.
    #[must_use]
    pub fn not_before(&self) -> Option<u64> {
        self.not_before
    }

    /// Published `exp`, if any.
    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Checks the key's own validity window at `now` (seconds since the epoch).
    ///
    /// # Errors
    ///
    /// Returns [`KeyResolutionError::KeyNotYetValid`] before `nbf` and
    /// [`KeyResolutionError::KeyExpired`] at or after `exp`.
    pub fn check_validity(&self, now: u64) -> Result<(), KeyResolutionError> {
        if let Some(nbf) = self.not_before
            && now < nbf
        {
            return Err(KeyResolutionError::key_not_yet_valid(&self.kid));
        }

        if let Some(exp) = self.expires_at
            && now >= exp
        {
            return Err(KeyResolutionError::key_expired(&self.kid));
        }

        Ok(())
    }
}

impl fmt::Debug for SigningKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyRecord")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("not_before", &self.not_before)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the issuer's signing keys, indexed by `kid`.
#[derive(Clone, Debug, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, Arc<SigningKeyRecord>>,
}

impl SigningKeySet {
    /// Builds a set from already-constructed records. The first record for a
    /// given `kid` wins.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = SigningKeyRecord>) -> Self {
        let mut keys = HashMap::new();
        for record in records {
            if keys.contains_key(record.kid()) {
                tracing::warn!(kid = %record.kid(), "duplicate kid in key set, keeping first");
                continue;
            }
            keys.insert(record.kid.clone(), Arc::new(record));
        }
        Self { keys }
    }

    /// Parses a JWKS document body.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::Decode`] if the body is not JSON or has no
    /// `keys` array. Individual unusable entries are skipped, not errors.
    pub fn from_jwks_json(body: &[u8]) -> Result<Self, KeySetError> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|e| KeySetError::decode(format!("invalid JSON: {e}")))?;
        Self::from_jwks(&document)
    }

    /// Builds a set from a parsed JWKS document.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::Decode`] if the document has no `keys` array.
    pub fn from_jwks(document: &Value) -> Result<Self, KeySetError> {
        let entries = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| KeySetError::decode("document has no 'keys' array"))?;

        let records = entries.iter().enumerate().filter_map(|(index, entry)| {
            match parse_entry(entry) {
                Ok(record) => Some(record),
                Err(reason) => {
                    tracing::warn!(index, reason = %reason, "skipping unusable key set entry");
                    None
                },
            }
        });

        let set = Self::from_records(records);
        tracing::debug!(keys = set.len(), entries = entries.len(), "parsed key set");
        Ok(set)
    }

    /// Looks up a key by identifier.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKeyRecord>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no usable keys were published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Identifiers of all usable keys, sorted.
    #[must_use]
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

/// Converts one JWKS entry, or says why it was rejected.
fn parse_entry(entry: &Value) -> Result<SigningKeyRecord, String> {
    let kid = entry
        .get("kid")
        .and_then(Value::as_str)
        .filter(|kid| !kid.is_empty())
        .ok_or("missing 'kid'")?;

    match entry.get("kty").and_then(Value::as_str) {
        Some("oct") => return Err(format!("{kid}: symmetric keys are not accepted")),
        None => return Err(format!("{kid}: missing 'kty'")),
        Some(_) => {},
    }

    if let Some(key_use) = entry.get("use").and_then(Value::as_str)
        && key_use != "sig"
    {
        return Err(format!("{kid}: key use '{key_use}' is not 'sig'"));
    }

    let algorithm = match entry.get("alg").and_then(Value::as_str) {
        Some(alg) => Some(
            validate_algorithm(alg, ASYMMETRIC_ALGORITHMS)
                .map_err(|_| format!("{kid}: algorithm '{alg}' is not a signing algorithm"))?,
        ),
        None => None,
    };

    let jwk: Jwk = serde_json::from_value(entry.clone())
        .map_err(|e| format!("{kid}: not a valid JWK: {e}"))?;

    if let AlgorithmParameters::OctetKeyPair(params) = &jwk.algorithm {
        if params.curve != EllipticCurve::Ed25519 {
            return Err(format!("{kid}: unsupported OKP curve"));
        }
        check_ed25519_point(&params.x).map_err(|e| format!("{kid}: {e}"))?;
    }

    let key = DecodingKey::from_jwk(&jwk).map_err(|e| format!("{kid}: {e}"))?;

    let not_before = entry.get("nbf").and_then(Value::as_u64);
    let expires_at = entry.get("exp").and_then(Value::as_u64);

    let mut record = SigningKeyRecord::new(kid, key).with_validity(not_before, expires_at);
    record.algorithm = algorithm;
    Ok(record)
}

/// Rejects `x` values that are not a valid Ed25519 public key.
fn check_ed25519_point(x: &str) -> Result<(), String> {
    let bytes = URL_SAFE_NO_PAD.decode(x).map_err(|e| format!("base64 decode: {e}"))?;

    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected {PUBLIC_KEY_LENGTH} bytes, got {}", bytes.len()))?;

    VerifyingKey::from_bytes(&bytes).map_err(|e| format!("invalid Ed25519 key: {e}"))?;
    Ok(())
}

/// Current time in seconds since the epoch, the unit of `exp`/`nbf`.
pub(crate) fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
