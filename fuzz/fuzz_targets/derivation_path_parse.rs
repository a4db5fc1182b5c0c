#![no_main]

use genwallet_core::{derive_seed, parse_path, KeyNode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };

    // Path parsing returns Ok or InvalidPath, never panics
    if parse_path(path).is_ok() {
        if let Ok(root) = KeyNode::from_seed(&derive_seed(b"fuzz")) {
            let _ = root.derive_path(path);
        }
    }
});
