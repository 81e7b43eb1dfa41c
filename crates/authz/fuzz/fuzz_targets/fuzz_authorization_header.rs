//! Fuzz target for `Authorization` header and token header parsing.
//!
//! Feeds arbitrary strings through the synchronous front half of the guard:
//! bearer extraction, header decoding, algorithm policy and `kid` checks.
//! Every input must produce `Ok(...)` or `Err(AuthError)`, never a panic.

#![no_main]

use casting_authz::{
    bearer::parse_bearer,
    validation::{DEFAULT_ALGORITHMS, validate_algorithm, validate_kid},
    verifier::decode_token_header,
};
use jsonwebtoken::Algorithm;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    // Treat the input both as a full header value and as a bare token.
    let token = match parse_bearer(Some(raw)) {
        Ok(token) => token,
        Err(err) => {
            assert_eq!(err.status_code(), 401);
            raw
        },
    };

    let Ok(header) = decode_token_header(token) else {
        return;
    };

    if let Ok(alg) = validate_algorithm(&header.alg, DEFAULT_ALGORITHMS) {
        assert_eq!(alg, Algorithm::RS256);
    }
    let everything = [Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA, Algorithm::HS256];
    if let Ok(alg) = validate_algorithm(&header.alg, &everything) {
        assert_ne!(alg, Algorithm::HS256, "symmetric algorithm accepted");
    }

    if let Some(kid) = header.kid.as_deref() {
        let _ = validate_kid(kid);
    }
});
