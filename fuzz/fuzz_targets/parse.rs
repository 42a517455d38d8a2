#![no_main]

use libfuzzer_sys::fuzz_target;
use sectoolbox_checks::cookies::{missing_flags, parse_set_cookie, split_set_cookie_block};
use sectoolbox_checks::headers::parse_header_block;
use sectoolbox_core::{InputKind, coerce};

fuzz_target!(|data: &[u8]| {
    // Convert bytes to UTF-8 string (ignore invalid UTF-8)
    if let Ok(s) = std::str::from_utf8(data) {
        // Pasted header blocks
        for value in split_set_cookie_block(s) {
            let cookie = parse_set_cookie(&value);
            let _ = missing_flags(&cookie);
        }
        let _ = parse_header_block(s);

        // Input coercion
        for kind in [InputKind::String, InputKind::Number, InputKind::Boolean, InputKind::Secret] {
            if let Ok(value) = coerce(kind, s) {
                assert_eq!(value.kind(), kind);
            }
        }
    }
});
