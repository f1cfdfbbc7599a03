#![no_main]

use libfuzzer_sys::fuzz_target;
use packscope::query::parse_query;

fuzz_target!(|data: &str| {
    // Parsing must never panic, and `consumed` must land on a char boundary
    for terminators in [&[][..], &[',', ']'][..]] {
        if let Ok(parsed) = parse_query(data, terminators) {
            assert!(data.is_char_boundary(parsed.consumed));
            let _ = parsed.matcher.to_string();
        }
    }
});
