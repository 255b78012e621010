//! Fuzz target for raw assertion parsing.
//!
//! Every input must produce `Ok(...)` or `Err(AuthError)`, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

use keyrelay_authn::{decode_unverified, validation::peek_algorithm};

fuzz_target!(|data: &[u8]| {
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    let _ = peek_algorithm(token);
    if let Ok(unverified) = decode_unverified(token) {
        let _ = keyrelay_authn::validate_algorithm(unverified.algorithm());
        let _ = keyrelay_keydir::Identity::parse(unverified.issuer());
    }
});
