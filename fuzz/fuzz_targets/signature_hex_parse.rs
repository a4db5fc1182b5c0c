#![no_main]

use genwallet_core::{derive_seed, derive_seed_from_hex, KeyNode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Wallet-supplied signature text must never panic the decoder
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(seed) = derive_seed_from_hex(text) {
            let _ = KeyNode::from_seed(&seed);
        }
    }

    // Any byte string hashes to a seed that yields a root node
    let seed = derive_seed(data);
    let _ = KeyNode::from_seed(&seed);
});
