//! Static catalog of resource kinds.
//!
//! Each kind lives in its own file under `kinds/` as one immutable
//! descriptor. The registry is assembled once at startup.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CoreError;
use crate::model::{KindId, Payload, ResourceRecord, ResourceRef};
use crate::remote::ServiceKind;

pub mod kinds;
pub mod path;

/// A list column: attribute name, payload path it is read from, display width.
#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub path: &'static str,
    pub width: u16,
}

/// Derives ids of another kind from one describe payload.
#[derive(Debug)]
pub struct Relation {
    pub target: KindId,
    pub label: &'static str,
    pub path: &'static str,
}

impl Relation {
    pub fn extract(&self, payload: &Payload) -> Vec<String> {
        let mut seen = BTreeSet::new();
        path::strings(payload, self.path)
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

/// Operator input an action needs before it can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionParams {
    None,
    /// `{"desired": n, "adjust_limits": bool}`
    DesiredCapacity,
    /// `{"user": name}`
    SshUser,
}

/// Checked against the cached record before an action's remote call.
#[derive(Debug)]
pub enum Precondition {
    /// `attr` must hold one of `allowed`.
    StateIs {
        attr: &'static str,
        allowed: &'static [&'static str],
    },
    /// `attr` must not hold any of `denied`.
    StateIsNot {
        attr: &'static str,
        denied: &'static [&'static str],
    },
    /// `attr` may be unknown (the action proceeds optimistically) but must not
    /// be known-empty.
    Optional { attr: &'static str },
    Check(fn(&ResourceRecord) -> Result<(), String>),
}

impl Precondition {
    pub fn check(&self, record: &ResourceRecord) -> Result<(), String> {
        match self {
            Precondition::StateIs { attr, allowed } => {
                let value = record.attr_text(attr);
                if allowed.iter().any(|a| *a == value) {
                    Ok(())
                } else {
                    Err(format!(
                        "{} is {} (needs {})",
                        attr,
                        display_value(&value),
                        allowed.join(" or ")
                    ))
                }
            }
            Precondition::StateIsNot { attr, denied } => {
                let value = record.attr_text(attr);
                if denied.iter().any(|d| *d == value) {
                    Err(format!("{} is already {}", attr, value))
                } else {
                    Ok(())
                }
            }
            Precondition::Optional { attr } => match record.attributes.get(*attr) {
                Some(Value::String(s)) if s.trim().is_empty() => {
                    Err(format!("{} is empty", attr))
                }
                _ => Ok(()),
            },
            Precondition::Check(f) => f(record),
        }
    }
}

fn display_value(v: &str) -> &str {
    if v.is_empty() { "unknown" } else { v }
}

#[derive(Debug)]
pub struct ActionDef {
    pub name: &'static str,
    pub label: &'static str,
    pub hotkey: char,
    /// Destructive actions ask before running.
    pub confirm: bool,
    pub params: ActionParams,
    pub preconditions: &'static [Precondition],
    /// Remote calls made in order; the first failure aborts the rest.
    pub steps: &'static [&'static str],
    /// Preconditions may be unverifiable, so a failure names the step it
    /// came from.
    pub best_effort: bool,
}

#[derive(Debug)]
pub struct ResourceTypeDescriptor {
    pub kind: KindId,
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub service: ServiceKind,
    pub id_path: &'static str,
    pub columns: &'static [Column],
    pub relations: &'static [Relation],
    pub actions: &'static [ActionDef],
}

impl ResourceTypeDescriptor {
    /// Canonical name lowercased with spaces removed, the form the palette matches.
    pub fn command_name(&self) -> String {
        self.canonical.replace(' ', "").to_lowercase()
    }

    pub fn action(&self, name: &str) -> Option<&'static ActionDef> {
        self.actions.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn action_for_key(&self, key: char) -> Option<&'static ActionDef> {
        self.actions.iter().find(|a| a.hotkey == key)
    }

    /// Build a record from a list or describe payload. Payloads without an id
    /// are dropped.
    pub fn record_from(&self, payload: &Payload) -> Option<ResourceRecord> {
        let id = path::strings(payload, self.id_path).into_iter().next()?;
        let mut record = ResourceRecord::new(id);
        for col in self.columns {
            let v = path::first(payload, col.path).unwrap_or(Value::Null);
            record.attributes.insert(col.name.to_string(), v);
        }
        Some(record)
    }

    /// Relation targets named by a describe payload.
    pub fn relation_refs(&self, payload: &Payload) -> BTreeSet<ResourceRef> {
        self.relations
            .iter()
            .flat_map(|r| {
                r.extract(payload)
                    .into_iter()
                    .map(move |id| ResourceRef::new(r.target, id))
            })
            .collect()
    }
}

pub struct Registry {
    kinds: Vec<&'static ResourceTypeDescriptor>,
}

impl Registry {
    pub fn new(kinds: Vec<&'static ResourceTypeDescriptor>) -> Self {
        Self { kinds }
    }

    /// Every built-in kind.
    pub fn builtin() -> Arc<Self> {
        Arc::new(Self::new(kinds::all()))
    }

    pub fn kinds(&self) -> &[&'static ResourceTypeDescriptor] {
        &self.kinds
    }

    pub fn get(&self, kind: &str) -> Option<&'static ResourceTypeDescriptor> {
        self.kinds.iter().copied().find(|d| d.kind == kind)
    }

    /// Resolve a palette token. Order: exact alias or kind id, exact
    /// canonical name (spaces removed), then the shortest canonical name the
    /// token is a prefix of.
    pub fn resolve(&self, token: &str) -> Result<&'static ResourceTypeDescriptor, CoreError> {
        let t = token.trim().to_lowercase();
        if t.is_empty() {
            return Err(CoreError::not_found("command", token));
        }
        if let Some(d) = self.kinds.iter().copied().find(|d| {
            d.kind.eq_ignore_ascii_case(&t) || d.aliases.iter().any(|a| a.eq_ignore_ascii_case(&t))
        }) {
            return Ok(d);
        }
        if let Some(d) = self.kinds.iter().copied().find(|d| d.command_name() == t) {
            return Ok(d);
        }
        self.kinds
            .iter()
            .copied()
            .filter(|d| d.command_name().starts_with(&t))
            .min_by(|a, b| {
                let (an, bn) = (a.command_name(), b.command_name());
                an.len().cmp(&bn.len()).then_with(|| an.cmp(&bn))
            })
            .ok_or_else(|| CoreError::not_found("command", token))
    }

    pub fn relations_from(&self, kind: &str) -> &'static [Relation] {
        self.get(kind).map(|d| d.relations).unwrap_or(&[])
    }
}
