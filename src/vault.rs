//! Encrypted, password-unlocked store of named contexts.
//!
//! The whole mapping is sealed into one file on every change. Nothing is
//! deferred, so the on-disk vault is always the last successfully persisted
//! mapping.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::Context;
use crate::store::write_atomic;

mod envelope;
mod import;

use self::envelope::SealingKey;
pub use self::envelope::KdfParams;
pub use self::import::{
    CredentialSource, EnvCredentials, ImportCandidate, ImportReport, JsonCredentialsFile,
    ProbedCandidate, probe_candidates,
};

#[derive(Serialize, Deserialize)]
struct Plaintext {
    contexts: Vec<Context>,
}

pub struct Vault {
    path: PathBuf,
    key: SealingKey,
    contexts: BTreeMap<String, Context>,
}

impl Vault {
    /// Unlock the vault at `path`. A missing file starts a new, empty vault
    /// that will be sealed with `password` on first persist.
    pub fn open(path: &Path, password: &str) -> Result<Self, CoreError> {
        Self::open_with_params(path, password, KdfParams::default())
    }

    /// Like [`Vault::open`], with explicit KDF costs for newly created vaults.
    pub fn open_with_params(
        path: &Path,
        password: &str,
        params: KdfParams,
    ) -> Result<Self, CoreError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "creating new vault");
                return Ok(Self {
                    path: path.to_path_buf(),
                    key: SealingKey::generate(password, params)?,
                    contexts: BTreeMap::new(),
                });
            }
            Err(err) => return Err(CoreError::Io(format!("read vault: {}", err))),
        };

        let (key, plaintext) = envelope::unseal(&bytes, password)?;
        let parsed: Plaintext = serde_json::from_slice(&plaintext)
            .map_err(|e| CoreError::CorruptStore(format!("vault contents: {}", e)))?;
        let contexts: BTreeMap<String, Context> = parsed
            .contexts
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        info!(contexts = contexts.len(), "vault unlocked");
        Ok(Self {
            path: path.to_path_buf(),
            key,
            contexts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Copy of the full mapping.
    pub fn snapshot(&self) -> BTreeMap<String, Context> {
        self.contexts.clone()
    }

    /// Insert or overwrite by name, then persist. On a failed write the
    /// in-memory mapping is rolled back and the file is untouched.
    pub fn put(&mut self, context: Context) -> Result<(), CoreError> {
        let name = context.name.clone();
        let previous = self.contexts.insert(name.clone(), context);
        if let Err(err) = self.persist() {
            match previous {
                Some(p) => self.contexts.insert(name, p),
                None => self.contexts.remove(&name),
            };
            return Err(err);
        }
        Ok(())
    }

    /// Remove a context and persist. Returns false if it did not exist.
    pub fn delete(&mut self, name: &str) -> Result<bool, CoreError> {
        let Some(previous) = self.contexts.remove(name) else {
            return Ok(false);
        };
        if let Err(err) = self.persist() {
            self.contexts.insert(name.to_string(), previous);
            return Err(err);
        }
        Ok(true)
    }

    /// Re-encrypt the full mapping and atomically replace the vault file.
    pub fn persist(&self) -> Result<(), CoreError> {
        let plaintext = serde_json::to_vec(&Plaintext {
            contexts: self.contexts.values().cloned().collect(),
        })
        .map_err(|e| CoreError::Io(format!("serialize contexts: {}", e)))?;
        let sealed = self.key.seal(&plaintext)?;
        write_atomic(&self.path, &sealed)?;
        debug!(contexts = self.contexts.len(), "vault persisted");
        Ok(())
    }

    /// Apply several changes as one persist. Rolls all of them back on failure.
    fn put_all(&mut self, batch: Vec<Context>) -> Result<(), CoreError> {
        let before = self.contexts.clone();
        for ctx in batch {
            self.contexts.insert(ctx.name.clone(), ctx);
        }
        if let Err(err) = self.persist() {
            self.contexts = before;
            return Err(err);
        }
        Ok(())
    }
}
