use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

const SECRET_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("webhook secret key required")]
    SecretKeyRequired,
    #[error("invalid webhook secret key")]
    InvalidSecretKey,
    #[error("ciphertext malformed")]
    Malformed,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed")]
    DecryptFailed,
}

/// Parse the configured encryption key. Accepts base64 or hex; either way
/// it must decode to exactly 32 bytes.
pub fn load_secret_key(raw: &str) -> Result<[u8; 32], CryptoError> {
    if raw.is_empty() {
        return Err(CryptoError::SecretKeyRequired);
    }
    if let Ok(bytes) = BASE64.decode(raw) {
        if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return Ok(key);
        }
    }
    if let Ok(bytes) = hex::decode(raw) {
        if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return Ok(key);
        }
    }
    Err(CryptoError::InvalidSecretKey)
}

/// Encrypt a webhook secret for storage.
///
/// Layout: `"enc:" || base64(nonce || ciphertext_and_tag)` with a fresh
/// random nonce per call. The empty secret stays empty.
pub fn encrypt_secret(plain: &str, key: &[u8; 32]) -> Result<String, CryptoError> {
    if plain.is_empty() {
        return Ok(String::new());
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plain.as_bytes())
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(format!("{SECRET_PREFIX}{}", BASE64.encode(out)))
}

/// Decrypt a stored webhook secret. Values without the `enc:` prefix are
/// legacy plaintext and are returned verbatim.
pub fn decrypt_secret(stored: &str, key: &[u8; 32]) -> Result<String, CryptoError> {
    if stored.is_empty() {
        return Ok(String::new());
    }
    let Some(encoded) = stored.strip_prefix(SECRET_PREFIX) else {
        return Ok(stored.to_string());
    };
    let raw = BASE64.decode(encoded).map_err(|_| CryptoError::Malformed)?;
    if raw.len() < NONCE_LEN {
        return Err(CryptoError::Malformed);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)?;
    String::from_utf8(plain).map_err(|_| CryptoError::Malformed)
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signature of a webhook payload, hex-encoded. Sent as
/// `X-Signature` when the binding carries a secret.
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature verification.
#[allow(dead_code)]
pub fn verify_signature(payload: &str, secret: &str, signature: &str) -> bool {
    let expected = sign_payload(payload, secret);
    use subtle::ConstantTimeEq;
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Hash an API key the way it is stored: lowercase hex SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)
}

/// Generate a fresh API key. Returns `(plaintext, digest)`; the plaintext
/// is shown exactly once and only the digest is persisted.
pub fn generate_api_key() -> (String, String) {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let plain = hex::encode(raw);
    let hash = hash_api_key(&plain);
    (plain, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key();
        let enc = encrypt_secret("hunter2", &key).unwrap();
        assert!(enc.starts_with("enc:"));
        assert_eq!(decrypt_secret(&enc, &key).unwrap(), "hunter2");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let key = test_key();
        let a = encrypt_secret("same", &key).unwrap();
        let b = encrypt_secret("same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_secret_stays_empty() {
        let key = test_key();
        assert_eq!(encrypt_secret("", &key).unwrap(), "");
        assert_eq!(decrypt_secret("", &key).unwrap(), "");
    }

    #[test]
    fn legacy_plaintext_passthrough() {
        let key = test_key();
        assert_eq!(decrypt_secret("plain-old-secret", &key).unwrap(), "plain-old-secret");
    }

    #[test]
    fn wrong_key_fails() {
        let enc = encrypt_secret("secret", &test_key()).unwrap();
        let other = [9u8; 32];
        assert!(decrypt_secret(&enc, &other).is_err());
    }

    #[test]
    fn key_parsing_accepts_base64_and_hex() {
        let key = test_key();
        let b64 = BASE64.encode(key);
        let hexed = hex::encode(key);
        assert_eq!(load_secret_key(&b64).unwrap(), key);
        assert_eq!(load_secret_key(&hexed).unwrap(), key);
        assert!(matches!(load_secret_key(""), Err(CryptoError::SecretKeyRequired)));
        assert!(matches!(load_secret_key("too-short"), Err(CryptoError::InvalidSecretKey)));
    }

    #[test]
    fn hmac_sign_and_verify() {
        let payload = r#"{"token":"abc1234567","hit_count":1}"#;
        let sig = sign_payload(payload, "k");
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(payload, "k", &sig));
        assert!(!verify_signature(payload, "wrong", &sig));
        assert!(!verify_signature("tampered", "k", &sig));
    }

    #[test]
    fn api_key_digest_shape() {
        let (plain, hash) = generate_api_key();
        assert_eq!(plain.len(), 64);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, hash_api_key(&plain));
    }
}
