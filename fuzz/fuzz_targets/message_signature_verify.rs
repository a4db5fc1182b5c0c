#![no_main]

use genwallet_core::verify_message_signature;
use libfuzzer_sys::fuzz_target;

const ADDRESS: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let (message, signature) = text.split_once('\n').unwrap_or((text, ""));
    let _ = verify_message_signature(ADDRESS, message, signature);
    let _ = verify_message_signature(signature, message, signature);
});
