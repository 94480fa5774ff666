//! The one active session: an unlocked context, a region and lazily built
//! service clients.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{Context, Defaults};
use crate::remote::{ClientFactory, ResourceClient, ServiceKind};
use crate::store::ConfigStore;
use crate::vault::Vault;

/// Identity of one activation. Cache keys carry this instead of credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

pub struct Session {
    id: SessionId,
    context: Context,
    region: String,
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<ServiceKind, Arc<dyn ResourceClient>>>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn context_name(&self) -> &str {
        &self.context.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Client for `service`, constructed on first use.
    pub fn client(&self, service: ServiceKind) -> Result<Arc<dyn ResourceClient>, CoreError> {
        let mut clients = self.clients.lock();
        if let Some(c) = clients.get(service) {
            return Ok(c.clone());
        }
        let client = self
            .factory
            .connect(service, &self.context.credentials, &self.region)
            .map_err(|e| CoreError::TransientRemoteFailure(format!("connect {}: {}", service, e)))?;
        debug!(session = %self.id, service, "service client created");
        clients.insert(service, client.clone());
        Ok(client)
    }

    fn teardown(&self) {
        let dropped = {
            let mut clients = self.clients.lock();
            let n = clients.len();
            clients.clear();
            n
        };
        info!(session = %self.id, context = %self.context.name, clients = dropped, "session closed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("context", &self.context.name)
            .field("region", &self.region)
            .finish()
    }
}

/// Owns the vault, the defaults and the active session.
pub struct SessionManager {
    vault: Vault,
    defaults: Defaults,
    store: Option<ConfigStore>,
    factory: Arc<dyn ClientFactory>,
    fallback_region: String,
    startup_context: Option<String>,
    startup_region: Option<String>,
    active: Option<Arc<Session>>,
    next_id: u64,
}

impl SessionManager {
    pub fn new(
        vault: Vault,
        defaults: Defaults,
        store: Option<ConfigStore>,
        factory: Arc<dyn ClientFactory>,
        fallback_region: impl Into<String>,
    ) -> Self {
        Self {
            vault,
            defaults,
            store,
            factory,
            fallback_region: fallback_region.into(),
            startup_context: None,
            startup_region: None,
            active: None,
            next_id: 1,
        }
    }

    /// Context and region to open at startup instead of the stored
    /// defaults. Never written to `defaults.json`.
    pub fn with_startup(mut self, context: Option<String>, region: Option<String>) -> Self {
        self.startup_context = context;
        self.startup_region = region;
        self
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut Vault {
        &mut self.vault
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Make `context` in `region` the active session. The previous session's
    /// clients are dropped first.
    pub fn activate(&mut self, context: &str, region: &str) -> Result<Arc<Session>, CoreError> {
        let ctx = self
            .vault
            .get(context)
            .cloned()
            .ok_or_else(|| CoreError::not_found("context", context))?;
        self.deactivate();

        let id = SessionId(self.next_id);
        self.next_id += 1;
        let session = Arc::new(Session {
            id,
            context: ctx,
            region: region.to_string(),
            factory: self.factory.clone(),
            clients: Mutex::new(HashMap::new()),
        });
        info!(session = %id, context, region, "session activated");
        self.active = Some(session.clone());
        Ok(session)
    }

    pub fn deactivate(&mut self) {
        if let Some(old) = self.active.take() {
            old.teardown();
        }
    }

    pub fn current(&self) -> Result<Arc<Session>, CoreError> {
        self.active.clone().ok_or(CoreError::NoActiveSession)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Activate the startup or default context if one is configured and
    /// still present. Returns whether a session was started.
    pub fn apply_defaults(&mut self) -> bool {
        let Some(name) = self
            .startup_context
            .clone()
            .or_else(|| self.defaults.context.clone())
        else {
            return false;
        };
        if !self.vault.contains(&name) {
            warn!(context = %name, "default context no longer exists; skipping");
            return false;
        }
        let region = self
            .startup_region
            .clone()
            .unwrap_or_else(|| self.region_for(&name));
        match self.activate(&name, &region) {
            Ok(_) => true,
            Err(err) => {
                warn!(context = %name, error = %err, "could not activate default context");
                false
            }
        }
    }

    /// Region a context should open in: process default, then the context's
    /// own default, then the configured fallback.
    pub fn region_for(&self, context: &str) -> String {
        self.defaults
            .region
            .clone()
            .or_else(|| self.vault.get(context).and_then(|c| c.default_region.clone()))
            .unwrap_or_else(|| self.fallback_region.clone())
    }

    /// Re-activate the current context in another region.
    pub fn switch_region(&mut self, region: &str) -> Result<Arc<Session>, CoreError> {
        let current = self.current()?;
        let name = current.context_name().to_string();
        self.activate(&name, region)
    }

    pub fn add_context(&mut self, context: Context) -> Result<(), CoreError> {
        self.vault.put(context)
    }

    /// Delete a context. Deactivates it if active and clears it as default.
    pub fn delete_context(&mut self, name: &str) -> Result<bool, CoreError> {
        if !self.vault.delete(name)? {
            return Ok(false);
        }
        if self
            .active
            .as_ref()
            .is_some_and(|s| s.context_name() == name)
        {
            self.deactivate();
        }
        if self.defaults.context.as_deref() == Some(name) {
            self.update_defaults(|d| d.context = None)?;
        }
        Ok(true)
    }

    pub fn set_default_context(&mut self, name: &str) -> Result<(), CoreError> {
        if !self.vault.contains(name) {
            return Err(CoreError::not_found("context", name));
        }
        let name = name.to_string();
        self.update_defaults(|d| d.context = Some(name))
    }

    pub fn set_default_region(&mut self, region: &str) -> Result<(), CoreError> {
        let region = region.to_string();
        self.update_defaults(|d| d.region = Some(region))
    }

    pub fn set_default_ssh_key(&mut self, key: Option<&str>) -> Result<(), CoreError> {
        let key = key.map(|k| k.to_string());
        self.update_defaults(|d| d.ssh_key = key)
    }

    pub fn set_ssh_username(&mut self, key: &str, user: &str) -> Result<(), CoreError> {
        let (key, user) = (key.to_string(), user.to_string());
        self.update_defaults(|d| {
            d.ssh_usernames.insert(key, user);
        })
    }

    pub fn clear_ssh_username(&mut self, key: &str) -> Result<(), CoreError> {
        self.update_defaults(|d| {
            d.ssh_usernames.remove(key);
        })
    }

    /// Login name to suggest when connecting with `key`.
    pub fn ssh_username_for(&self, key: &str) -> Option<&str> {
        self.defaults.ssh_usernames.get(key).map(|s| s.as_str())
    }

    fn update_defaults(&mut self, f: impl FnOnce(&mut Defaults)) -> Result<(), CoreError> {
        let mut next = self.defaults.clone();
        f(&mut next);
        if let Some(store) = &self.store {
            store.write_defaults(&next)?;
        }
        self.defaults = next;
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.deactivate();
    }
}
