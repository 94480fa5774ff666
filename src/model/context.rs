use std::fmt;

use serde::{Deserialize, Serialize};

/// Access credential material. Opaque to the engine; only the remote
/// collaborators read it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

// Secrets never reach logs or panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    Manual,
    Imported,
}

/// One named credential set plus its defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub name: String,
    pub credentials: Credentials,

    #[serde(default)]
    pub default_region: Option<String>,

    #[serde(default)]
    pub ssh_key: Option<String>,

    /// Resolved by the identity probe when the context is admitted.
    #[serde(default)]
    pub account_id: Option<String>,

    pub origin: ContextOrigin,
}

impl Context {
    pub fn manual(name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            credentials,
            default_region: None,
            ssh_key: None,
            account_id: None,
            origin: ContextOrigin::Manual,
        }
    }

    pub fn account_label(&self) -> &str {
        self.account_id.as_deref().unwrap_or("-")
    }
}
