//! Fuzz target for JWKS document parsing.
//!
//! The key set endpoint is remote input; arbitrary bodies must either parse
//! into a set of usable keys or fail with a decode error.

#![no_main]

use casting_authz::key_set::SigningKeySet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(set) = SigningKeySet::from_jwks_json(data) else {
        return;
    };

    for kid in set.kids() {
        let record = set.get(kid).expect("listed kid must resolve");
        assert_eq!(record.kid(), kid);
    }
});
