//! Streaming backup-file encryption envelope.
//!
//! ```text
//! MAGIC (8 bytes = "BRBKENC1")
//! VERSION (1 byte = 0x01)
//! SALT (16 bytes, random)
//! IV (16 bytes, random)
//! ITERATIONS (4 bytes, big-endian unsigned)
//! CIPHERTEXT (streaming, length = file_size - header_len - 32)
//! HMAC (32 bytes over the entire ciphertext)
//! ```
//!
//! Key derivation is PBKDF2-HMAC-SHA256 over the salt and iteration count,
//! producing 64 bytes: the first 32 become the AES-256-CTR key, the last
//! 32 become the HMAC-SHA256 key.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{BackupError, Result};

const MAGIC: &[u8; 8] = b"BRBKENC1";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const HMAC_LEN: usize = 32;
const HEADER_LEN: usize = 8 + 1 + SALT_LEN + IV_LEN + 4;
pub const DEFAULT_ITERATIONS: u32 = 200_000;
const CHUNK_SIZE: usize = 1024 * 1024;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

fn derive_keys(password: &str, salt: &[u8], iterations: u32) -> ([u8; 32], [u8; 32]) {
    let mut out = [0u8; 64];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    enc_key.copy_from_slice(&out[..32]);
    mac_key.copy_from_slice(&out[32..]);
    (enc_key, mac_key)
}

/// Sniff whether a file begins with the encryption envelope's magic bytes.
pub fn is_encrypted_backup_file(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8];
    match file.read_exact(&mut buf) {
        Ok(()) => Ok(&buf == MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(BackupError::Io(e)),
    }
}

/// Encrypt `input_path` into `output_path` under `password`.
///
/// On any failure the partially-written output file is removed.
pub fn encrypt_file(input_path: &Path, output_path: &Path, password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(BackupError::Crypto("encryption password must not be empty".into()));
    }
    match encrypt_file_inner(input_path, output_path, password) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(output_path);
            Err(e)
        }
    }
}

fn encrypt_file_inner(input_path: &Path, output_path: &Path, password: &str) -> Result<()> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let (enc_key, mac_key) = derive_keys(password, &salt, DEFAULT_ITERATIONS);
    let mut cipher = Aes256Ctr::new(&enc_key.into(), &iv.into());
    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| BackupError::Crypto(format!("invalid hmac key length: {e}")))?;

    let mut input = File::open(input_path)?;
    let mut output = File::create(output_path)?;

    output.write_all(MAGIC)?;
    output.write_all(&[VERSION])?;
    output.write_all(&salt)?;
    output.write_all(&iv)?;
    output.write_all(&DEFAULT_ITERATIONS.to_be_bytes())?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &mut buf[..n];
        cipher.apply_keystream(chunk);
        mac.update(chunk);
        output.write_all(chunk)?;
    }

    let tag = mac.finalize().into_bytes();
    output.write_all(&tag)?;
    output.flush()?;
    Ok(())
}

/// Decrypt `input_path` into `output_path` under `password`.
///
/// Writes to a `.tmp` sibling of `output_path` and atomically renames it
/// into place only once the HMAC tag has verified.
pub fn decrypt_file(input_path: &Path, output_path: &Path, password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(BackupError::Crypto("encryption password must not be empty".into()));
    }
    let tmp_path = output_path.with_extension(
        output_path
            .extension()
            .map(|e| format!("{}.tmp", e.to_string_lossy()))
            .unwrap_or_else(|| "tmp".to_string()),
    );
    match decrypt_file_inner(input_path, &tmp_path, password) {
        Ok(()) => {
            fs::rename(&tmp_path, output_path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn decrypt_file_inner(input_path: &Path, tmp_path: &Path, password: &str) -> Result<()> {
    let total_size = fs::metadata(input_path)?.len() as usize;
    if total_size < HEADER_LEN + HMAC_LEN {
        return Err(BackupError::Crypto("truncated encrypted file".into()));
    }

    let mut input = File::open(input_path)?;
    let mut header = [0u8; HEADER_LEN];
    input.read_exact(&mut header)?;

    if &header[0..8] != MAGIC {
        return Err(BackupError::Crypto("not a recognized encrypted backup".into()));
    }
    let version = header[8];
    if version != VERSION {
        return Err(BackupError::Crypto(format!(
            "unsupported envelope version: {version}"
        )));
    }
    let salt = &header[9..9 + SALT_LEN];
    let iv = &header[9 + SALT_LEN..9 + SALT_LEN + IV_LEN];
    let iterations = u32::from_be_bytes(
        header[9 + SALT_LEN + IV_LEN..HEADER_LEN]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );

    let (enc_key, mac_key) = derive_keys(password, salt, iterations);
    let mut cipher = Aes256Ctr::new(&enc_key.into(), iv.into());
    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| BackupError::Crypto(format!("invalid hmac key length: {e}")))?;

    let ciphertext_len = total_size - HEADER_LEN - HMAC_LEN;
    let mut output = File::create(tmp_path)?;
    let mut remaining = ciphertext_len;
    let mut buf = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE);
        input.read_exact(&mut buf[..want])?;
        mac.update(&buf[..want]);
        let chunk = &mut buf[..want];
        cipher.apply_keystream(chunk);
        output.write_all(chunk)?;
        remaining -= want;
    }
    output.flush()?;

    let mut tag = [0u8; HMAC_LEN];
    input.read_exact(&mut tag)?;
    mac.verify_slice(&tag)
        .map_err(|_| BackupError::Crypto("invalid encryption password or corrupted backup".into()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_small_file() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.sql");
        let enc = dir.path().join("plain.sql.enc");
        let out = dir.path().join("restored.sql");
        fs::write(&plain, b"CREATE TABLE t (id int);\nINSERT INTO t VALUES (1);").unwrap();

        encrypt_file(&plain, &enc, "hunter2").unwrap();
        let header = fs::read(&enc).unwrap();
        assert_eq!(&header[0..8], MAGIC);
        assert_eq!(header[8], VERSION);

        decrypt_file(&enc, &out, "hunter2").unwrap();
        assert_eq!(fs::read(&out).unwrap(), fs::read(&plain).unwrap());
    }

    #[test]
    fn wrong_password_fails_and_cleans_up() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.sql");
        let enc = dir.path().join("plain.sql.enc");
        let out = dir.path().join("restored.sql");
        fs::write(&plain, b"hello world").unwrap();

        encrypt_file(&plain, &enc, "right").unwrap();
        let err = decrypt_file(&enc, &out, "wrong").unwrap_err();
        assert!(matches!(err, BackupError::Crypto(_)));
        assert!(!out.exists());
        assert!(!out.with_extension("sql.tmp").exists());
    }

    #[test]
    fn empty_password_rejected_before_any_io() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.sql");
        let enc = dir.path().join("plain.sql.enc");
        fs::write(&plain, b"hello").unwrap();
        let err = encrypt_file(&plain, &enc, "").unwrap_err();
        assert!(matches!(err, BackupError::Crypto(_)));
        assert!(!enc.exists());
    }

    #[test]
    fn sniffs_magic_bytes() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.sql");
        let enc = dir.path().join("plain.sql.enc");
        fs::write(&plain, b"hello").unwrap();
        assert!(!is_encrypted_backup_file(&plain).unwrap());
        encrypt_file(&plain, &enc, "pw").unwrap();
        assert!(is_encrypted_backup_file(&enc).unwrap());
    }
}
