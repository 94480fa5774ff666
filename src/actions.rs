//! Operator-triggered actions against the active session.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cache::{CacheEngine, CacheKey};
use crate::error::CoreError;
use crate::model::{KindId, ResourceRecord};
use crate::registry::{ActionDef, ActionParams, ResourceTypeDescriptor};
use crate::remote::RemoteError;
use crate::session::Session;

#[derive(Clone, Debug, PartialEq)]
pub struct ActionRequest {
    pub kind: KindId,
    pub action: String,
    pub ids: Vec<String>,
    pub params: Value,
}

impl ActionRequest {
    pub fn new(kind: KindId, action: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            ids,
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// What a completed action reports back.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub kind: KindId,
    pub action: &'static str,
    pub ids: Vec<String>,
    pub result: Result<String, CoreError>,
}

/// An action that passed its local checks and is ready to call out.
#[derive(Debug)]
pub struct PreparedAction {
    session: Arc<Session>,
    desc: &'static ResourceTypeDescriptor,
    def: &'static ActionDef,
    ids: Vec<String>,
    params: Value,
}

impl PreparedAction {
    pub fn label(&self) -> &'static str {
        self.def.label
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Make the remote calls. Blocking; run on a worker. Steps run in order
    /// per target and the first failure ends the action.
    pub fn run(self, cache: &CacheEngine) -> ActionOutcome {
        let key = CacheKey::for_session(&self.session, self.desc.kind);
        let result = self.call_steps();
        // Partial success may still have changed remote state.
        cache.invalidate(&key);
        match &result {
            Ok(msg) => info!(kind = self.desc.kind, action = self.def.name, targets = self.ids.len(), "{}", msg),
            Err(err) => warn!(kind = self.desc.kind, action = self.def.name, error = %err, "action failed"),
        }
        ActionOutcome {
            kind: self.desc.kind,
            action: self.def.name,
            ids: self.ids,
            result,
        }
    }

    fn call_steps(&self) -> Result<String, CoreError> {
        let client = self.session.client(self.desc.service)?;
        for id in &self.ids {
            for step in self.def.steps {
                client
                    .act(self.desc.kind, self.session.region(), step, id, &self.params)
                    .map_err(|e| {
                        let reason = match e {
                            RemoteError::NotFound => format!("{} {}: not found", step, id),
                            RemoteError::Transient(m) | RemoteError::Failed(m) => {
                                if self.def.best_effort {
                                    format!("{}: {}", step, m)
                                } else {
                                    m
                                }
                            }
                        };
                        CoreError::action_failed(self.def.name, reason)
                    })?;
            }
        }
        Ok(format!("{} requested for {}", self.def.label, self.ids.join(", ")))
    }
}

/// Check session, action and preconditions. No remote call is made here.
pub fn prepare(
    session: Option<Arc<Session>>,
    cache: &CacheEngine,
    req: ActionRequest,
) -> Result<PreparedAction, CoreError> {
    let session = session.ok_or(CoreError::NoActiveSession)?;
    let desc = cache
        .registry()
        .get(req.kind)
        .ok_or_else(|| CoreError::not_found("resource kind", req.kind))?;
    let def = desc
        .action(&req.action)
        .ok_or_else(|| CoreError::not_found(format!("{} action", desc.kind), &req.action))?;
    if req.ids.is_empty() {
        return Err(CoreError::precondition(def.name, "no resource selected"));
    }

    let key = CacheKey::for_session(&session, desc.kind);
    for id in &req.ids {
        let record = cache
            .record(&key, id)
            .ok_or_else(|| CoreError::not_found(desc.kind, id))?;
        for pre in def.preconditions {
            pre.check(&record)
                .map_err(|reason| CoreError::precondition(def.name, format!("{}: {}", id, reason)))?;
        }
        check_params(def, &record, &req.params)?;
    }

    Ok(PreparedAction {
        session,
        desc,
        def,
        ids: req.ids,
        params: req.params,
    })
}

fn check_params(def: &ActionDef, record: &ResourceRecord, params: &Value) -> Result<(), CoreError> {
    match def.params {
        ActionParams::None => Ok(()),
        ActionParams::SshUser => {
            let user = params.get("user").and_then(|u| u.as_str()).unwrap_or("");
            if user.trim().is_empty() {
                return Err(CoreError::precondition(def.name, "a login name is required"));
            }
            Ok(())
        }
        ActionParams::DesiredCapacity => {
            let desired = params
                .get("desired")
                .and_then(|d| d.as_i64())
                .ok_or_else(|| CoreError::precondition(def.name, "desired capacity must be a number"))?;
            if desired < 0 {
                return Err(CoreError::precondition(def.name, "desired capacity cannot be negative"));
            }
            let adjust = params
                .get("adjust_limits")
                .and_then(|a| a.as_bool())
                .unwrap_or(false);
            if adjust {
                return Ok(());
            }
            let (min, max) = (
                record.attr_i64("min").unwrap_or(i64::MIN),
                record.attr_i64("max").unwrap_or(i64::MAX),
            );
            if desired < min || desired > max {
                return Err(CoreError::precondition(
                    def.name,
                    format!("desired {} is outside {}..{}", desired, min, max),
                ));
            }
            Ok(())
        }
    }
}

/// Parameters for a scale request.
pub fn scale_params(desired: i64, adjust_limits: bool) -> Value {
    json!({ "desired": desired, "adjust_limits": adjust_limits })
}

/// Parameters for a connect request.
pub fn connect_params(user: &str, key: Option<&str>) -> Value {
    json!({ "user": user, "key": key })
}

/// Prepare in the foreground, run on a worker, and hand the outcome to
/// `done`. Local check failures are reported through `done` as well.
pub fn invoke(
    session: Option<Arc<Session>>,
    cache: &CacheEngine,
    req: ActionRequest,
    done: impl FnOnce(ActionOutcome) + Send + 'static,
) {
    let kind = req.kind;
    let ids = req.ids.clone();
    let action_name = req.action.clone();
    match prepare(session, cache, req) {
        Ok(prepared) => {
            info!(kind, action = prepared.def.name, targets = prepared.ids.len(), "invoking action");
            let spawner = cache.spawner().clone();
            let cache = cache.clone();
            spawner.spawn(move || done(prepared.run(&cache)));
        }
        Err(err) => {
            let action = cache
                .registry()
                .get(kind)
                .and_then(|d| d.action(&action_name))
                .map(|a| a.name)
                .unwrap_or("action");
            done(ActionOutcome {
                kind,
                action,
                ids,
                result: Err(err),
            })
        }
    }
}
