//! SSH private keys offered by the key picker.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// `~/.ssh`, if a home directory can be found.
pub fn default_ssh_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".ssh"))
}

/// `id_*` without an extension, or `*.pem`.
pub fn is_private_key_name(name: &str) -> bool {
    (name.starts_with("id_") && name.len() > 3 && !name.contains('.')) || name.ends_with(".pem")
}

/// Private key file names in `dir`, sorted. A missing directory lists nothing.
pub fn list_ssh_keys(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "ssh key directory unreadable");
            return Vec::new();
        }
    };
    let mut keys: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| is_private_key_name(n))
        .collect();
    keys.sort();
    keys
}

/// A public half sits next to the key as `<key>.pub`.
pub fn has_public_key(dir: &Path, key: &str) -> bool {
    dir.join(format!("{}.pub", key)).is_file()
}
