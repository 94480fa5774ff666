//! External collaborators: resource clients, identity probe and client factory.
//!
//! All calls are blocking and may be slow; the engine only ever issues them
//! from background workers.

use std::sync::Arc;

use thiserror::Error;

use crate::model::{Credentials, KindId, Payload};

mod http_client;
pub use self::http_client::{GatewayClient, GatewayFactory, GatewayProbe};

/// Service a resource kind is served by, e.g. `"compute"`.
pub type ServiceKind = &'static str;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Timeouts, throttling, unavailable backends. Safe to retry.
    #[error("{0}")]
    Transient(String),

    #[error("not found")]
    NotFound,

    /// The remote rejected or failed the call; retrying will not help.
    #[error("{0}")]
    Failed(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

pub trait ResourceClient: Send + Sync {
    fn list(&self, kind: KindId, region: &str) -> Result<Vec<Payload>, RemoteError>;

    fn describe(&self, kind: KindId, region: &str, id: &str) -> Result<Payload, RemoteError>;

    fn act(
        &self,
        kind: KindId,
        region: &str,
        action: &str,
        id: &str,
        params: &Payload,
    ) -> Result<Payload, RemoteError>;
}

/// Resolves the account a credential set belongs to. Used only on import.
pub trait IdentityProbe: Send + Sync {
    fn probe(&self, credentials: &Credentials) -> Result<String, RemoteError>;
}

/// Builds per-service clients for one session.
pub trait ClientFactory: Send + Sync {
    fn connect(
        &self,
        service: ServiceKind,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Arc<dyn ResourceClient>, RemoteError>;
}
