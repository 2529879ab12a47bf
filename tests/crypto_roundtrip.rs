use zish::crypto::{derive_from_password, Vault, KEY_LEN, SALT_LEN};

#[test]
fn seal_then_open_blob_recovers_plaintext() {
    let vault = Vault::from_key([7u8; KEY_LEN]);
    let aad = b"history-record-1";
    let blob = vault.seal(b"echo hello world", aad);
    let plaintext = vault.open_blob(&blob, aad).expect("open_blob");
    assert_eq!(plaintext, b"echo hello world");
}

#[test]
fn open_blob_fails_with_wrong_aad() {
    let vault = Vault::from_key([9u8; KEY_LEN]);
    let blob = vault.seal(b"payload", b"aad-a");
    assert!(vault.open_blob(&blob, b"aad-b").is_err());
}

#[test]
fn open_blob_fails_with_wrong_key() {
    let sealed_with = Vault::from_key([1u8; KEY_LEN]);
    let opened_with = Vault::from_key([2u8; KEY_LEN]);
    let blob = sealed_with.seal(b"payload", b"aad");
    assert!(opened_with.open_blob(&blob, b"aad").is_err());
}

#[test]
fn open_blob_rejects_truncated_blob() {
    let vault = Vault::from_key([3u8; KEY_LEN]);
    let blob = vault.seal(b"payload", b"aad");
    let truncated = &blob[..blob.len() - 1];
    assert!(vault.open_blob(truncated, b"aad").is_err());
}

#[test]
fn each_seal_uses_a_fresh_nonce() {
    let vault = Vault::from_key([4u8; KEY_LEN]);
    let a = vault.seal(b"same plaintext", b"aad");
    let b = vault.seal(b"same plaintext", b"aad");
    assert_ne!(a, b, "reusing a nonce for XChaCha20-Poly1305 would be catastrophic");
}

#[test]
fn password_derivation_is_deterministic_for_the_same_salt() {
    let salt = [5u8; SALT_LEN];
    let key_a = derive_from_password(b"hunter2", &salt).expect("derive");
    let key_b = derive_from_password(b"hunter2", &salt).expect("derive");
    assert_eq!(key_a, key_b);
}

#[test]
fn password_derivation_differs_across_salts() {
    let key_a = derive_from_password(b"hunter2", &[1u8; SALT_LEN]).expect("derive");
    let key_b = derive_from_password(b"hunter2", &[2u8; SALT_LEN]).expect("derive");
    assert_ne!(key_a, key_b);
}

#[test]
fn a_vault_derived_from_a_password_can_open_its_own_seals() {
    let salt = [6u8; SALT_LEN];
    let key = derive_from_password(b"correct horse battery staple", &salt).expect("derive");
    let vault = Vault::from_key(key);
    let blob = vault.seal(b"ls -la", b"record");
    assert_eq!(vault.open_blob(&blob, b"record").expect("open"), b"ls -la");
}
