//! The Crypto Vault: key lifecycle, Argon2id password derivation, and
//! XChaCha20-Poly1305 seal/open of opaque byte blobs.
//!
//! Follows the same "small focused module, free functions plus one owning
//! struct" shape used in `job_control.rs`; `chacha20poly1305` and `zeroize`
//! are the AEAD/KDF crates pulled in for this kind of secret-handling code.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{ZishError, ZishResult};

pub const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

const ARGON2_MEM_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_LANES: u32 = 4;

/// Filesystem locations under `$HOME/.config/zish/`.
#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub key_file: PathBuf,
    pub salt_file: PathBuf,
    pub password_mode_file: PathBuf,
    pub history_dir: PathBuf,
    pub current_log: PathBuf,
}

impl VaultPaths {
    pub fn under(config_dir: &Path) -> Self {
        let history_dir = config_dir.join("history.d");
        VaultPaths {
            key_file: config_dir.join("key"),
            salt_file: config_dir.join("salt"),
            password_mode_file: config_dir.join("password_mode"),
            current_log: history_dir.join("current.log.enc"),
            history_dir,
        }
    }
}

/// Default config dir: `$HOME/.config/zish/`.
pub fn default_config_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok()?;
    Some(PathBuf::from(home).join(".config").join("zish"))
}

/// Policy controlling whether the password-prompt flow runs at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultPolicy {
    /// `ZISH_BYPASS_PASSWORD` — skip the prompt even when password mode is on.
    pub bypass_password: bool,
}

impl VaultPolicy {
    pub fn from_env() -> Self {
        VaultPolicy {
            bypass_password: std::env::var_os("ZISH_BYPASS_PASSWORD").is_some(),
        }
    }
}

/// Holds the live 32-byte AEAD key. Zeroized when dropped.
pub struct Vault {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl Vault {
    /// Open the vault: derive or load the key, and verify it against the
    /// first on-disk record if one already exists.
    ///
    /// `first_record` is `Some((aad, blob))` for the first sealed record
    /// already on disk (if any) — the caller (the history log owner) reads
    /// it without decoding it, since the vault itself has no opinion on
    /// header layout, only on the AEAD check.
    pub fn open(
        policy: &VaultPolicy,
        paths: &VaultPaths,
        first_record: Option<(Vec<u8>, Vec<u8>)>,
    ) -> ZishResult<Self> {
        fs::create_dir_all(&paths.history_dir)?;

        let password_mode = paths.password_mode_file.exists();
        let stdin_is_tty = crossterm::tty::IsTty::is_tty(&io::stdin());

        if password_mode && !policy.bypass_password && stdin_is_tty {
            return Self::open_with_password(paths, first_record);
        }

        Self::open_with_key_file(paths)
    }

    fn open_with_key_file(paths: &VaultPaths) -> ZishResult<Self> {
        if let Ok(bytes) = fs::read(&paths.key_file) {
            if bytes.len() == KEY_LEN {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                return Ok(Vault { key: Zeroizing::new(key) });
            }
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        write_secret_file(&paths.key_file, &key)?;
        Ok(Vault { key: Zeroizing::new(key) })
    }

    fn open_with_password(
        paths: &VaultPaths,
        first_record: Option<(Vec<u8>, Vec<u8>)>,
    ) -> ZishResult<Self> {
        let salt = load_or_create_salt(&paths.salt_file)?;

        for attempt in 1..=3 {
            let password = prompt_password(&format!(
                "zish: password (attempt {attempt}/3): "
            ))?;
            let key = derive_from_password(password.as_bytes(), &salt)?;

            let valid = match &first_record {
                Some((aad, blob)) => try_unlock(&key, aad, blob),
                None => true, // nothing on disk yet — any password establishes the vault
            };

            if valid {
                return Ok(Vault { key: Zeroizing::new(key) });
            }
            log::warn!("zish: password attempt {attempt} failed validation");
        }

        log::warn!("zish: three failed password attempts, offering reset");
        reset_after_failed_attempts(paths)?;
        let fresh_key = {
            let mut key = [0u8; KEY_LEN];
            rand::thread_rng().fill_bytes(&mut key);
            key
        };
        Ok(Vault { key: Zeroizing::new(fresh_key) })
    }

    /// Seal `plaintext` under `aad`, returning `nonce‖ct‖tag`.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new((&*self.key).into());
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        // Only fails on payload sizes far beyond anything a shell history
        // entry or config blob can reach; an error here would be a logic bug.
        let ct = cipher
            .encrypt(
                &nonce,
                chacha20poly1305::aead::Payload { msg: plaintext, aad },
            )
            .expect("AEAD seal of a bounded plaintext cannot fail");

        let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ct);
        out
    }

    /// Open a blob sealed by [`Vault::seal`] with the same `aad`.
    pub fn open_blob(&self, blob: &[u8], aad: &[u8]) -> ZishResult<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(ZishError::AuthenticationFailed);
        }
        let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new((&*self.key).into());
        cipher
            .decrypt(nonce, chacha20poly1305::aead::Payload { msg: ct, aad })
            .map_err(|_| ZishError::AuthenticationFailed)
    }

    /// Zero the key before dropping the vault. `Zeroizing` already does this
    /// on `Drop`; this method exists so callers can make the moment explicit
    /// (e.g. before a rekey swaps in a new `Vault`).
    pub fn close(self) {
        drop(self);
    }

    /// Build a vault directly from an already-derived key, for callers (the
    /// `chpw` builtin) that need a second `Vault` to rekey into without
    /// going through the tty-prompting `open` flow again.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Vault { key: Zeroizing::new(key) }
    }
}

fn try_unlock(key: &[u8; KEY_LEN], aad: &[u8], blob: &[u8]) -> bool {
    if blob.len() < NONCE_LEN {
        return false;
    }
    let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(nonce, chacha20poly1305::aead::Payload { msg: ct, aad })
        .is_ok()
}

/// Argon2id key derivation with a persistent 16-byte salt; 3 iterations,
/// 64 MiB, 4 lanes.
pub fn derive_from_password(password: &[u8], salt: &[u8; SALT_LEN]) -> ZishResult<[u8; KEY_LEN]> {
    let params = argon2::Params::new(ARGON2_MEM_KIB, ARGON2_ITERATIONS, ARGON2_LANES, Some(KEY_LEN))
        .map_err(|e| ZishError::Other(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| ZishError::Other(format!("argon2: {e}")))?;
    Ok(out)
}

pub(crate) fn load_or_create_salt(path: &Path) -> ZishResult<[u8; SALT_LEN]> {
    if let Ok(bytes) = fs::read(path) {
        if bytes.len() == SALT_LEN {
            let mut salt = [0u8; SALT_LEN];
            salt.copy_from_slice(&bytes);
            return Ok(salt);
        }
    }
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    write_secret_file(path, &salt)?;
    Ok(salt)
}

/// Rename the current log aside with a timestamp suffix and clear the
/// password-mode marker, so a forgotten password starts a fresh history
/// rather than leaving the user locked out.
fn reset_after_failed_attempts(paths: &VaultPaths) -> ZishResult<()> {
    if paths.current_log.exists() {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let corrupted = paths.history_dir.join(format!("corrupted_{ts}.log.enc"));
        fs::rename(&paths.current_log, corrupted)?;
    }
    let _ = fs::remove_file(&paths.password_mode_file);
    Ok(())
}

#[cfg(unix)]
pub(crate) fn write_secret_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(bytes)
}

#[cfg(not(unix))]
pub(crate) fn write_secret_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}

/// Read a password from the tty with echo disabled. Raw mode already turns
/// off local echo, so this is just `enter_raw_mode` + a byte-at-a-time read
/// until Enter, mirroring the `event::read()` key loop in `editor.rs` but
/// discarding every byte instead of echoing it.
pub(crate) fn prompt_password(prompt: &str) -> ZishResult<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind};

    print!("{prompt}");
    io::stdout().flush()?;

    if !crossterm::tty::IsTty::is_tty(&io::stdin()) {
        // Non-interactive (tests, pipes): read one line from stdin directly.
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        return Ok(line.trim_end_matches(['\n', '\r']).to_string());
    }

    let _guard = crate::terminal::RawModeGuard::enter()?;
    let mut password = String::new();
    loop {
        let ev = event::read()?;
        let Event::Key(key) = ev else { continue };
        if key.kind != KeyEventKind::Press && key.kind != KeyEventKind::Repeat {
            continue;
        }
        match key.code {
            KeyCode::Enter => {
                println!();
                break;
            }
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char(c) => password.push(c),
            _ => {}
        }
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = [7u8; KEY_LEN];
        let vault = Vault { key: Zeroizing::new(key) };
        let aad = b"header-bytes";
        let blob = vault.seal(b"hello history", aad);
        let opened = vault.open_blob(&blob, aad).unwrap();
        assert_eq!(opened, b"hello history");
    }

    #[test]
    fn open_fails_with_wrong_aad() {
        let key = [9u8; KEY_LEN];
        let vault = Vault { key: Zeroizing::new(key) };
        let blob = vault.seal(b"data", b"aad-a");
        let err = vault.open_blob(&blob, b"aad-b").unwrap_err();
        assert!(matches!(err, ZishError::AuthenticationFailed));
    }

    #[test]
    fn open_fails_with_wrong_key() {
        let vault_a = Vault { key: Zeroizing::new([1u8; KEY_LEN]) };
        let vault_b = Vault { key: Zeroizing::new([2u8; KEY_LEN]) };
        let blob = vault_a.seal(b"data", b"aad");
        assert!(vault_b.open_blob(&blob, b"aad").is_err());
    }

    #[test]
    fn derive_from_password_is_deterministic() {
        let salt = [3u8; SALT_LEN];
        let k1 = derive_from_password(b"hunter2", &salt).unwrap();
        let k2 = derive_from_password(b"hunter2", &salt).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn derive_from_password_differs_by_password() {
        let salt = [4u8; SALT_LEN];
        let k1 = derive_from_password(b"hunter2", &salt).unwrap();
        let k2 = derive_from_password(b"hunter3", &salt).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn try_unlock_detects_wrong_key() {
        let key_a = [5u8; KEY_LEN];
        let key_b = [6u8; KEY_LEN];
        let vault = Vault { key: Zeroizing::new(key_a) };
        let blob = vault.seal(b"payload", b"aad");
        assert!(try_unlock(&key_a, b"aad", &blob));
        assert!(!try_unlock(&key_b, b"aad", &blob));
    }
}
