//! Fuzz target for the COQL validation pipeline.
//!
//! Run with: cargo +nightly fuzz run fuzz_query_validator
//!
//! Arbitrary UTF-8 must never panic any pass, and a valid result always
//! carries the normalized query.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(query) = std::str::from_utf8(data) else {
        return;
    };
    let result = crmpilot_core::validate_query(query);
    if result.valid {
        assert!(result.formatted_query.is_some());
        assert!(result.errors.is_empty());
    }
});
