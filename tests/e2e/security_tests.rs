//! Secret-handling checks across the public surface.
//!
//! Run with: cargo test --test security_tests

use bitcoin::Network;
use genwallet_core::{derive_seed, derive_taproot, Bip84SegwitSigner, KeyNode, SegwitSigner};
use genwallet_identity::test_utils::LocalEthSigner;
use genwallet_identity::{
    to_personal_sign_hex, ExternalSigner, IdentityConfig, IdentityDeriver, TAPROOT_MESSAGE,
};

#[test]
fn test_identity_json_has_no_key_material() {
    let signer = LocalEthSigner::from_seed_byte(0x41);
    let account = signer.account().to_string();
    let identity = IdentityDeriver::new(&signer, IdentityConfig::default())
        .unwrap()
        .generate_bitcoin_key(&account, "nonce")
        .unwrap();

    let first = signer
        .personal_sign(&to_personal_sign_hex(TAPROOT_MESSAGE), &account)
        .unwrap();
    let raw = hex::decode(first.trim_start_matches("0x")).unwrap();
    let seed = derive_seed(&raw);
    let root = KeyNode::from_seed(&seed).unwrap();
    let taproot = derive_taproot(&root, Network::Bitcoin).unwrap();
    let segwit = Bip84SegwitSigner::default().sign_segwit_root(&root, "nonce").unwrap();

    let json = serde_json::to_string(&identity).unwrap();
    assert!(!json.contains(&hex::encode(&raw)));
    assert!(!json.contains(&hex::encode(seed.as_bytes())));
    assert!(!json.contains(&hex::encode(root.secret_key().secret_bytes())));
    assert!(!json.contains(&hex::encode(taproot.node.secret_key().secret_bytes())));
    assert!(!json.contains(segwit.private_key.as_str()));
    assert!(!json.contains("events"));
}

#[test]
fn test_debug_output_is_redacted() {
    let seed = derive_seed(b"debug output");
    let root = KeyNode::from_seed(&seed).unwrap();
    let segwit = Bip84SegwitSigner::default().sign_segwit_root(&root, "m").unwrap();

    let secret = hex::encode(root.secret_key().secret_bytes());
    assert!(!format!("{:?}", seed).contains(&hex::encode(seed.as_bytes())));
    assert!(!format!("{:?}", root).contains(&secret));
    assert!(!format!("{:?}", segwit).contains(segwit.private_key.as_str()));
}
