use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ENVELOPE_VERSION: u32 = 1;
const VERIFIER_CONTEXT: &[u8] = b"stratus vault key verifier";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const MAX_M_COST_KIB: u32 = 1024 * 1024;
const MAX_T_COST: u32 = 16;
const MAX_P_COST: u32 = 16;

/// Argon2id cost parameters. Stored alongside the ciphertext so a vault
/// stays readable if the defaults change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    /// Reject costs no vault written by this program would carry.
    fn check_bounds(&self) -> Result<(), CoreError> {
        if self.m_cost > MAX_M_COST_KIB || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST {
            return Err(CoreError::CorruptStore(format!(
                "kdf parameters out of range (m={} t={} p={})",
                self.m_cost, self.t_cost, self.p_cost
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct KdfSection {
    algorithm: String,
    salt: String,
    #[serde(flatten)]
    params: KdfParams,
}

/// On-disk vault format. Every field except the KDF parameters is either
/// random or derived; no context data appears outside `ciphertext`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(super) struct Envelope {
    version: u32,
    kdf: KdfSection,
    verifier: String,
    nonce: String,
    ciphertext: String,
}

/// Key material derived from the password for one vault file.
#[derive(Clone)]
pub(super) struct SealingKey {
    key: [u8; 32],
    salt: [u8; SALT_LEN],
    params: KdfParams,
}

impl SealingKey {
    /// Derive a key under a fresh random salt.
    pub(super) fn generate(password: &str, params: KdfParams) -> Result<Self, CoreError> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        let key = derive_key(password, &salt, params)?;
        Ok(Self { key, salt, params })
    }

    fn verifier(&self) -> String {
        hex::encode(blake3::keyed_hash(&self.key, VERIFIER_CONTEXT).as_bytes())
    }

    /// Encrypt `plaintext` under a fresh nonce.
    pub(super) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CoreError::Io("encrypt vault".to_string()))?;
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            kdf: KdfSection {
                algorithm: "argon2id".to_string(),
                salt: hex::encode(self.salt),
                params: self.params,
            },
            verifier: self.verifier(),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        };
        serde_json::to_vec_pretty(&envelope)
            .map_err(|e| CoreError::Io(format!("serialize vault envelope: {}", e)))
    }
}

/// Parse and decrypt a stored envelope.
///
/// A key that does not match the stored verifier is `BadPassword`; anything
/// else that prevents recovering the plaintext is `CorruptStore`.
pub(super) fn unseal(bytes: &[u8], password: &str) -> Result<(SealingKey, Vec<u8>), CoreError> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| CoreError::CorruptStore(format!("unreadable envelope: {}", e)))?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(CoreError::CorruptStore(format!(
            "unsupported vault version {}",
            envelope.version
        )));
    }
    if envelope.kdf.algorithm != "argon2id" {
        return Err(CoreError::CorruptStore(format!(
            "unsupported kdf {}",
            envelope.kdf.algorithm
        )));
    }
    envelope.kdf.params.check_bounds()?;
    let salt: [u8; SALT_LEN] = decode_fixed(&envelope.kdf.salt, "salt")?;
    let nonce: [u8; NONCE_LEN] = decode_fixed(&envelope.nonce, "nonce")?;
    let ciphertext = hex::decode(&envelope.ciphertext)
        .map_err(|_| CoreError::CorruptStore("ciphertext is not hex".to_string()))?;

    let key = SealingKey {
        key: derive_key(password, &salt, envelope.kdf.params)?,
        salt,
        params: envelope.kdf.params,
    };
    if key.verifier() != envelope.verifier {
        return Err(CoreError::BadPassword);
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| CoreError::CorruptStore("ciphertext failed authentication".to_string()))?;
    Ok((key, plaintext))
}

fn derive_key(password: &str, salt: &[u8], params: KdfParams) -> Result<[u8; 32], CoreError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| CoreError::CorruptStore(format!("invalid kdf parameters: {}", e)))?;
    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CoreError::CorruptStore(format!("argon2: {}", e)))?;
    Ok(key)
}

fn decode_fixed<const N: usize>(text: &str, what: &str) -> Result<[u8; N], CoreError> {
    let bytes =
        hex::decode(text).map_err(|_| CoreError::CorruptStore(format!("{} is not hex", what)))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::CorruptStore(format!("{} has the wrong length", what)))
}

fn fill_random(buf: &mut [u8]) -> Result<(), CoreError> {
    getrandom::getrandom(buf).map_err(|e| CoreError::Io(format!("os random source: {}", e)))
}
